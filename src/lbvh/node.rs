use bytemuck::{Pod, Zeroable};

use crate::INVALID;

/// A node in the Lbvh, can be an inner node or leaf. Sixteen bytes, the layout of an `int4` in a device buffer.
///
/// Nodes reference each other by index into `Lbvh::nodes`. The first P nodes are the leaves in Morton order,
/// the following P - 1 are the inner nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct LbvhNode {
    /// Index of the left child, `INVALID` for leaves.
    pub left: u32,
    /// Index of the right child, `INVALID` for leaves.
    pub right: u32,
    /// Index of the parent, `INVALID` for the root.
    pub parent: u32,
    /// For leaves, the original index of the primitive (triangle) this leaf holds. `INVALID` for inner nodes.
    pub primitive: u32,
}

impl Default for LbvhNode {
    fn default() -> Self {
        Self {
            left: INVALID,
            right: INVALID,
            parent: INVALID,
            primitive: INVALID,
        }
    }
}

impl LbvhNode {
    #[inline(always)]
    pub fn new_leaf(primitive: u32) -> Self {
        Self {
            primitive,
            ..Default::default()
        }
    }

    #[inline(always)]
    pub fn new_inner() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        self.primitive != INVALID
    }

    #[inline(always)]
    pub fn is_root(&self) -> bool {
        self.parent == INVALID
    }

    #[inline(always)]
    pub fn children(&self) -> Option<[u32; 2]> {
        (!self.is_leaf()).then_some([self.left, self.right])
    }
}
