//! Errors that abort an LBVH build. A build either produces a complete tree or one of these, never a partial tree.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The tree shape is undefined for zero primitives.
    #[error("cannot build an LBVH over an empty mesh")]
    EmptyMesh,

    /// A triangle references a vertex past the end of the position buffer.
    #[error("triangle {triangle} references vertex {vertex}, but only {vertex_count} vertices were given")]
    IndexOutOfRange {
        triangle: usize,
        vertex: u32,
        vertex_count: usize,
    },

    /// A NaN or infinite coordinate would poison the scene bounds and every Morton key.
    #[error("vertex {vertex} has a non-finite coordinate")]
    NonFiniteVertex { vertex: usize },

    /// 2P - 1 node indices plus the `INVALID` sentinel must fit in a u32.
    #[error("{0} primitives exceed the addressable node count")]
    TooManyPrimitives(usize),

    /// The key sort capability failed.
    #[error("key sort failed: {0}")]
    Sort(String),

    /// The key sort capability returned without error but left the keys out of order.
    #[error("key sort left keys out of order at position {position}")]
    UnsortedKeys { position: usize },
}
