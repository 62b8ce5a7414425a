//! A linear BVH (LBVH) built in fully data-parallel stages.
//!
//! Stages, each of which finishes before the next one starts:
//! 1. Scene bounds: every primitive widens a shared accumulator with atomic min/max.
//! 2. Morton codes: 30 bit code of each primitive's centroid inside the scene bounds.
//! 3. Sort: keys are sorted through a [`sort::KeySorter`], ties broken by primitive index.
//! 4. Nodes: 2P - 1 nodes. The first P are leaves in sorted order, the rest are inner nodes.
//! 5. Split: each inner node finds its leaf range and split position from the sorted codes (Karras 2012)
//!    and links its children. Children record their parent.
//! 6. Refit: walks from every leaf towards the root. The second walk to arrive at an inner node writes its box.

pub mod atomic;
pub mod builder;
pub mod closest_point;
pub mod karras;
pub mod morton;
pub mod node;
pub mod refit;
pub mod sort;

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use glam::Vec3;

use crate::{aabb::Aabb, lbvh::node::LbvhNode, triangle::IndexedMesh, INVALID};

/// A binary BVH over P primitives with one primitive per leaf.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Lbvh {
    /// Leaves at `0..P` in Morton order, inner node `i` at `P + i`.
    pub nodes: Vec<LbvhNode>,
    /// Bounds of every node, indexed like `nodes`.
    pub aabbs: Vec<Aabb>,
    /// Original primitive id of each leaf, indexed by leaf position. A permutation of `0..P`.
    pub primitive_indices: Vec<u32>,
    /// Sorted Morton code of each leaf, indexed by leaf position.
    pub morton_codes: Vec<u32>,
    /// Bounds of all primitives, as accumulated by the first stage.
    pub scene_aabb: Aabb,
}

impl Lbvh {
    #[inline(always)]
    pub fn prim_count(&self) -> usize {
        self.primitive_indices.len()
    }

    /// Index of the root node. The first inner node, or the only leaf for a single primitive.
    #[inline(always)]
    pub fn root(&self) -> usize {
        if self.nodes.len() > 1 {
            self.prim_count()
        } else {
            0
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node bounds as `(min, max)` corner pairs, ready to upload as a buffer of 2(2P - 1) float3.
    pub fn aabbs_flat(&self) -> Vec<Vec3> {
        self.aabbs.iter().flat_map(Aabb::corners).collect()
    }

    /// Raw node bytes, 16 per node.
    pub fn nodes_as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }

    /// First and last leaf position covered by `node_index`.
    pub fn leaf_range(&self, node_index: usize) -> (u32, u32) {
        let mut first = node_index as u32;
        while let Some([left, _]) = self.nodes[first as usize].children() {
            first = left;
        }
        let mut last = node_index as u32;
        while let Some([_, right]) = self.nodes[last as usize].children() {
            last = right;
        }
        (first, last)
    }

    /// Maximum depth of the tree. A single leaf has depth 1.
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        self.subtree_depth(self.root())
    }

    fn subtree_depth(&self, node_index: usize) -> usize {
        match self.nodes[node_index].children() {
            None => 1,
            Some([left, right]) => {
                1 + self
                    .subtree_depth(left as usize)
                    .max(self.subtree_depth(right as usize))
            }
        }
    }

    /// Checks every structural invariant of the tree against the mesh it was built from. Panics on the first
    /// broken one.
    pub fn validate(&self, mesh: &IndexedMesh) -> LbvhValidationResult {
        let prim_count = self.prim_count();
        assert_eq!(prim_count, mesh.len());
        assert_eq!(self.nodes.len(), 2 * prim_count - 1);
        assert_eq!(self.aabbs.len(), self.nodes.len());
        assert_eq!(self.morton_codes.len(), prim_count);

        let mut seen = vec![false; prim_count];
        for (leaf, &primitive_id) in self.primitive_indices.iter().enumerate() {
            assert!(
                !std::mem::replace(&mut seen[primitive_id as usize], true),
                "Primitive {primitive_id} appears twice"
            );
            let node = &self.nodes[leaf];
            assert!(node.is_leaf(), "Node {leaf} should be a leaf");
            assert_eq!(node.primitive, primitive_id);
            assert_eq!(
                self.aabbs[leaf],
                mesh.triangle(primitive_id as usize).aabb(),
                "Leaf {leaf} does not bound primitive {primitive_id}"
            );
        }
        for pair in 1..prim_count {
            let (a, b) = (pair - 1, pair);
            assert!(
                (self.morton_codes[a], self.primitive_indices[a])
                    < (self.morton_codes[b], self.primitive_indices[b]),
                "Leaves {a} and {b} are out of order"
            );
        }

        let roots = self.nodes.iter().filter(|n| n.is_root()).count();
        assert_eq!(roots, 1, "Expected a single node without a parent");
        assert!(self.nodes[self.root()].is_root());

        let mut result = LbvhValidationResult::default();
        let range = self.validate_impl(&mut result, self.root() as u32, 1);
        assert_eq!(range, (0, prim_count as u32 - 1));
        assert_eq!(result.discovered_nodes.len(), self.nodes.len());
        assert_eq!(result.node_count, self.nodes.len());
        assert_eq!(result.leaf_count, prim_count);
        result
    }

    /// Returns the leaf range of `node_index`.
    fn validate_impl(
        &self,
        result: &mut LbvhValidationResult,
        node_index: u32,
        current_depth: u32,
    ) -> (u32, u32) {
        result.max_depth = result.max_depth.max(current_depth);
        assert!(
            result.discovered_nodes.insert(node_index),
            "Node {node_index} reached twice"
        );
        result.node_count += 1;
        *result.nodes_at_depth.entry(current_depth).or_default() += 1;

        let node = &self.nodes[node_index as usize];
        let Some([left, right]) = node.children() else {
            assert!(
                node.left == INVALID && node.right == INVALID,
                "Leaf {node_index} has children"
            );
            result.leaf_count += 1;
            *result.leaves_at_depth.entry(current_depth).or_default() += 1;
            return (node_index, node_index);
        };

        assert!(
            node_index as usize >= self.prim_count(),
            "Inner node {node_index} stored among the leaves"
        );
        for child in [left, right] {
            assert_eq!(
                self.nodes[child as usize].parent, node_index,
                "Child {child} does not point back to parent {node_index}"
            );
        }
        assert_eq!(
            self.aabbs[left as usize].union(&self.aabbs[right as usize]),
            self.aabbs[node_index as usize],
            "Children {left} & {right} do not fit in tightly in parent {node_index}",
        );

        let (first, left_last) = self.validate_impl(result, left, current_depth + 1);
        let (right_first, last) = self.validate_impl(result, right, current_depth + 1);
        assert_eq!(
            left_last + 1,
            right_first,
            "Leaf ranges of {left} & {right} are not adjacent"
        );
        (first, last)
    }

    /// Basic debug print illustrating the bvh layout
    pub fn print_lbvh(&self, node_index: usize, depth: usize) {
        let node = &self.nodes[node_index];
        match node.children() {
            None => println!(
                "{}{} leaf > {}",
                " ".repeat(depth),
                node_index,
                node.primitive
            ),
            Some([left, right]) => {
                println!("{}{} inner > {}, {}", " ".repeat(depth), node_index, left, right);
                self.print_lbvh(left as usize, depth + 1);
                self.print_lbvh(right as usize, depth + 1);
            }
        }
    }
}

/// Node table: the four node fields followed by the node's box, one line per node.
impl fmt::Display for Lbvh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = |value: u32| {
            if value == INVALID {
                -1
            } else {
                value as i64
            }
        };
        for (node, aabb) in self.nodes.iter().zip(&self.aabbs) {
            writeln!(
                f,
                "{:>4} {:>4} {:>4} {:>4}\taabb ({} {} {}), ({} {} {})",
                field(node.left),
                field(node.right),
                field(node.parent),
                field(node.primitive),
                aabb.min.x,
                aabb.min.y,
                aabb.min.z,
                aabb.max.x,
                aabb.max.y,
                aabb.max.z,
            )?;
        }
        Ok(())
    }
}

/// Result of `Lbvh::validate`.
#[derive(Default)]
pub struct LbvhValidationResult {
    /// Set of nodes discovered though validation traversal.
    pub discovered_nodes: HashSet<u32>,
    /// Total number of nodes discovered though validation traversal.
    pub node_count: usize,
    /// Total number of leafs discovered though validation traversal.
    pub leaf_count: usize,
    /// Maximum depth discovered though validation traversal, the root is at depth 1.
    pub max_depth: u32,
    /// Quantity of nodes found at each depth though validation traversal.
    pub nodes_at_depth: HashMap<u32, u32>,
    /// Quantity of leaves found at each depth though validation traversal.
    pub leaves_at_depth: HashMap<u32, u32>,
}

impl fmt::Display for LbvhValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "\
node_count: {}
leaf_count: {}
max_depth:  {}",
            self.node_count, self.leaf_count, self.max_depth
        )?;

        writeln!(f, "Node & Leaf counts for each depth")?;
        for i in 1..=self.max_depth {
            writeln!(
                f,
                "{:<3} {:<10} {:<10}",
                i,
                self.nodes_at_depth.get(&i).unwrap_or(&0),
                self.leaves_at_depth.get(&i).unwrap_or(&0)
            )?;
        }

        Ok(())
    }
}
