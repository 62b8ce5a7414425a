//! Bottom-up AABB refit without a barrier per tree level.
//!
//! One walk starts at every leaf and climbs through its parents. Each inner node has an arrival counter: the
//! first walk to arrive increments it and stops, the second one unions the two child boxes, writes the node's
//! box and keeps climbing. Every inner node is written exactly once, after both of its children are final.

use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{
    lbvh::{atomic::AtomicAabb, node::LbvhNode},
    INVALID,
};

/// Walks up from `leaf`, writing the box of every inner node this walk arrives at second.
/// Returns how many boxes it wrote.
///
/// The AcqRel increment carries the ordering: the first walk's store of its child box happens before its
/// increment (release), and the second walk's increment reads that value (acquire) before loading both children.
#[inline]
pub fn refit_from_leaf(
    leaf: usize,
    nodes: &[LbvhNode],
    aabbs: &[AtomicAabb],
    arrival_counters: &[AtomicU32],
    prim_count: usize,
) -> usize {
    let mut written = 0;
    let mut current = nodes[leaf].parent;
    while current != INVALID {
        let node_id = current as usize;
        let previous = arrival_counters[node_id - prim_count].fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            // The sibling subtree isn't finished yet, its walk will continue from here.
            break;
        }
        debug_assert_eq!(previous, 1, "inner node {node_id} reached by a third walk");

        let node = &nodes[node_id];
        let aabb = aabbs[node.left as usize]
            .load()
            .union(&aabbs[node.right as usize].load());
        aabbs[node_id].store(&aabb);
        written += 1;

        current = node.parent;
    }
    written
}

/// Refits every inner node from the leaves `0..prim_count`. Leaf boxes must already be set and every arrival
/// counter must be zero. Returns the number of inner node boxes written, which is P - 1 for a well formed tree.
pub fn refit(
    nodes: &[LbvhNode],
    aabbs: &[AtomicAabb],
    arrival_counters: &[AtomicU32],
    prim_count: usize,
    parallel: bool,
) -> usize {
    crate::scope!("refit");
    debug_assert_eq!(nodes.len(), aabbs.len());
    debug_assert_eq!(arrival_counters.len(), prim_count.saturating_sub(1));

    let walk = |leaf: usize| refit_from_leaf(leaf, nodes, aabbs, arrival_counters, prim_count);

    #[cfg(feature = "parallel")]
    if parallel {
        return (0..prim_count).into_par_iter().map(walk).sum();
    }
    let _ = parallel;
    (0..prim_count).map(walk).sum()
}
