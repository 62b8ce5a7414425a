// Binary radix tree construction from "Maximizing Parallelism in the Construction of BVHs, Octrees, and k-d Trees",
// T. Karras, HPG 2012.
// https://research.nvidia.com/sites/default/files/pubs/2012-06_Maximizing-Parallelism-in/karras2012hpg_paper.pdf
// https://developer.nvidia.com/blog/thinking-parallel-part-iii-tree-construction-gpu/

use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "parallel")]
use rayon::iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};

use crate::lbvh::node::LbvhNode;

/// Length of the longest common prefix of the sorted keys at positions `i` and `j`, or -1 if `j` is outside the
/// key sequence. Equal codes are made distinct by appending their position, so the result is always defined and
/// two different positions never compare as identical.
#[inline(always)]
pub fn delta(codes: &[u32], i: i64, j: i64) -> i32 {
    if j < 0 || j >= codes.len() as i64 {
        return -1;
    }
    let (ki, kj) = (codes[i as usize], codes[j as usize]);
    if ki == kj {
        32 + (i as u32 ^ j as u32).leading_zeros() as i32
    } else {
        (ki ^ kj).leading_zeros() as i32
    }
}

/// The contiguous range of sorted leaves `[first, last]` covered by inner node `i`.
pub fn determine_range(codes: &[u32], i: usize) -> (usize, usize) {
    let i = i as i64;

    // Grow towards the neighbour sharing the longer prefix
    let d: i64 = if delta(codes, i, i + 1) > delta(codes, i, i - 1) {
        1
    } else {
        -1
    };

    // Everything in the range shares more than this with key i
    let delta_min = delta(codes, i, i - d);

    let mut l_max: i64 = 2;
    while delta(codes, i, i + l_max * d) > delta_min {
        l_max *= 2;
    }

    let mut l = 0;
    let mut t = l_max / 2;
    while t >= 1 {
        if delta(codes, i, i + (l + t) * d) > delta_min {
            l += t;
        }
        t /= 2;
    }

    let j = i + l * d;
    (i.min(j) as usize, i.max(j) as usize)
}

/// Last position of the left half of `[first, last]`: the highest position whose prefix shared with `first` is
/// longer than the prefix shared by the whole range. Always in `first..last`.
pub fn find_split(codes: &[u32], first: usize, last: usize) -> usize {
    debug_assert!(first < last);
    let (first_i, last_i) = (first as i64, last as i64);
    let common_prefix = delta(codes, first_i, last_i);

    let mut split = first_i;
    let mut step = last_i - first_i;
    loop {
        step = (step + 1) >> 1;
        let new_split = split + step;
        if new_split < last_i && delta(codes, first_i, new_split) > common_prefix {
            split = new_split;
        }
        if step <= 1 {
            break;
        }
    }
    split as usize
}

/// Child slots of inner node `i`: a leaf when its sub-range holds a single key, the inner node with the same
/// position otherwise.
#[inline(always)]
pub fn link_children(codes: &[u32], i: usize) -> [u32; 2] {
    let prim_count = codes.len();
    let (first, last) = determine_range(codes, i);
    let split = find_split(codes, first, last);

    let left = if first == split {
        split
    } else {
        prim_count + split
    };
    let right = if last == split + 1 {
        split + 1
    } else {
        prim_count + split + 1
    };
    [left as u32, right as u32]
}

/// Wires every inner node to its two children and records the parent of every child in `parents`.
/// `inner_nodes` are the P - 1 inner nodes, `parents` has an entry for all 2P - 1 nodes.
/// Every node is the child of exactly one inner node, so each `parents` slot is written by a single thread.
pub fn split_nodes(
    codes: &[u32],
    inner_nodes: &mut [LbvhNode],
    parents: &[AtomicU32],
    parallel: bool,
) {
    crate::scope!("split_nodes");
    let prim_count = codes.len();
    debug_assert_eq!(inner_nodes.len(), prim_count.saturating_sub(1));
    debug_assert_eq!(parents.len(), prim_count + inner_nodes.len());

    let split = |(i, node): (usize, &mut LbvhNode)| {
        let [left, right] = link_children(codes, i);
        node.left = left;
        node.right = right;
        let parent = (prim_count + i) as u32;
        parents[left as usize].store(parent, Ordering::Relaxed);
        parents[right as usize].store(parent, Ordering::Relaxed);
    };

    #[cfg(feature = "parallel")]
    if parallel {
        inner_nodes.par_iter_mut().enumerate().for_each(split);
        return;
    }
    let _ = parallel;
    inner_nodes.iter_mut().enumerate().for_each(split);
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::INVALID;

    fn build(codes: &[u32], parallel: bool) -> (Vec<LbvhNode>, Vec<u32>) {
        let p = codes.len();
        let mut inner = vec![LbvhNode::new_inner(); p - 1];
        let parents: Vec<AtomicU32> = (0..2 * p - 1).map(|_| AtomicU32::new(INVALID)).collect();
        split_nodes(codes, &mut inner, &parents, parallel);
        (
            inner,
            parents.into_iter().map(AtomicU32::into_inner).collect(),
        )
    }

    fn check_links(codes: &[u32], inner: &[LbvhNode], parents: &[u32]) {
        let p = codes.len();
        let mut children = HashSet::new();
        for (i, node) in inner.iter().enumerate() {
            assert!(children.insert(node.left), "node {} has two parents", node.left);
            assert!(children.insert(node.right), "node {} has two parents", node.right);
            assert_eq!(parents[node.left as usize], (p + i) as u32);
            assert_eq!(parents[node.right as usize], (p + i) as u32);
        }
        // Every node but the root (inner node 0) is somebody's child
        assert_eq!(children.len(), 2 * p - 2);
        assert!(!children.contains(&(p as u32)));
        assert_eq!(parents[p], INVALID);
    }

    #[test]
    fn delta_prefixes() {
        let codes = [0b0001, 0b0010, 0b0010, 0b1000];
        assert_eq!(delta(&codes, 0, -1), -1);
        assert_eq!(delta(&codes, 0, 4), -1);
        assert_eq!(delta(&codes, 0, 1), 30);
        assert_eq!(delta(&codes, 0, 3), 28);
        // Equal codes fall back to the positions: 32 + clz(1 ^ 2)
        assert_eq!(delta(&codes, 1, 2), 32 + 30);
    }

    #[test]
    fn karras_paper_example() {
        // Figure 3 of the paper
        let codes = [
            0b00001, 0b00010, 0b00100, 0b00101, 0b10011, 0b11000, 0b11001, 0b11110,
        ];
        let ranges: Vec<_> = (0..7).map(|i| determine_range(&codes, i)).collect();
        assert_eq!(
            ranges,
            [(0, 7), (0, 1), (2, 3), (0, 3), (4, 7), (5, 7), (5, 6)]
        );
        let splits: Vec<_> = ranges
            .iter()
            .map(|&(first, last)| find_split(&codes, first, last))
            .collect();
        assert_eq!(splits, [3, 0, 2, 1, 4, 6, 5]);

        let (inner, parents) = build(&codes, false);
        let p = 8;
        assert_eq!([inner[0].left, inner[0].right], [p + 3, p + 4]);
        assert_eq!([inner[1].left, inner[1].right], [0, 1]);
        assert_eq!([inner[2].left, inner[2].right], [2, 3]);
        assert_eq!([inner[3].left, inner[3].right], [p + 1, p + 2]);
        assert_eq!([inner[4].left, inner[4].right], [4, p + 5]);
        assert_eq!([inner[5].left, inner[5].right], [p + 6, 7]);
        assert_eq!([inner[6].left, inner[6].right], [5, 6]);
        check_links(&codes, &inner, &parents);
    }

    #[test]
    fn two_keys() {
        let (inner, parents) = build(&[7, 9], false);
        assert_eq!([inner[0].left, inner[0].right], [0, 1]);
        check_links(&[7, 9], &inner, &parents);
    }

    #[test]
    fn all_duplicate_keys() {
        for count in [2, 3, 5, 16, 33, 100] {
            let codes = vec![42; count];
            let (inner, parents) = build(&codes, false);
            check_links(&codes, &inner, &parents);
            for i in 0..count - 1 {
                let (first, last) = determine_range(&codes, i);
                let split = find_split(&codes, first, last);
                assert!(first <= split && split < last);
            }
        }
    }

    #[test]
    fn mixed_duplicates_parallel_matches_sequential() {
        let codes: Vec<u32> = (0..5000u32).map(|i| (i / 7) * 3 + (i % 3)).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        let sequential = build(&sorted, false);
        let parallel = build(&sorted, true);
        assert_eq!(sequential, parallel);
        check_links(&sorted, &sequential.0, &sequential.1);
    }
}
