//! # Parallel Linear BVH Construction
//!
//! - [LBVH](https://research.nvidia.com/sites/default/files/pubs/2012-06_Maximizing-Parallelism-in/karras2012hpg_paper.pdf)
//!   builder over indexed triangle meshes: per-primitive bounds, 30 bit Morton keys, a radix sort by key, Karras'
//!   radix tree split/link and a lock-free bottom-up AABB refit.
//! - Every stage is a single data-parallel pass. With the `parallel` feature (on by default) the passes run on
//!   [rayon](https://github.com/rayon-rs/rayon); the end of each pass is the barrier before the next one.
//! - Closest-point-on-mesh and signed distance queries over the finished tree.
//!
//! ## Example
//!
//! ```
//! use glam::*;
//! use swbvh::{
//!     lbvh::builder::build_lbvh,
//!     test_util::geometry::icosphere,
//!     triangle::IndexedMesh,
//!     LbvhBuildConfig,
//! };
//!
//! // Positions and triangle indices are owned by the caller and only borrowed for the build.
//! let (positions, indices) = icosphere(1);
//! let mesh = IndexedMesh::new(&positions, &indices);
//!
//! let bvh = build_lbvh(&mesh, &LbvhBuildConfig::default()).unwrap();
//!
//! // 2P - 1 nodes, the first P are leaves in Morton order.
//! assert_eq!(bvh.nodes.len(), 2 * indices.len() - 1);
//!
//! // Signed distance from a point to the mesh. The icosphere has a radius of 1.
//! let d = bvh.signed_distance(&mesh, vec3a(0.0, 3.0, 0.0)).unwrap();
//! assert!(d > 1.9 && d < 2.1);
//! ```

use std::time::Duration;

use lbvh::sort::{BackendSorter, SortBackend};

pub mod aabb;
pub mod error;
pub mod lbvh;
pub mod test_util;
pub mod triangle;

/// Sentinel for a missing child, a missing parent, or the primitive slot of an internal node.
pub const INVALID: u32 = u32::MAX;

/// A macro to measure and print the execution time of a block of code.
///
/// # Arguments
/// * `$label` - A string label to identify the code block being timed.
/// * `$($code:tt)*` - The code block whose execution time is to be measured.
///
/// # Usage
/// ```rust
/// use swbvh::timeit;
/// timeit!["example",
///     // code to measure
/// ];
/// ```
///
/// # Note
/// The macro purposefully doesn't include a scope so variables don't need to
/// be passed out of it. This allows it to be trivially added to existing code.
///
/// This macro only measures time when the `timeit` feature is enabled.
#[macro_export]
#[doc(hidden)]
macro_rules! timeit {
    [$label:expr, $($code:tt)*] => {
        #[cfg(feature = "timeit")]
        let timeit_start = std::time::Instant::now();
        $($code)*
        #[cfg(feature = "timeit")]
        println!("{:>8} {}", format!("{}", $crate::PrettyDuration(timeit_start.elapsed())), $label);
    };
}

/// A wrapper struct for `std::time::Duration` to provide pretty-printing of durations.
#[doc(hidden)]
pub struct PrettyDuration(pub Duration);

impl std::fmt::Display for PrettyDuration {
    /// Seconds and milliseconds get two decimal places, anything under a millisecond is printed in whole µs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let duration = self.0;
        if duration.as_secs() > 0 {
            write!(f, "{:.2}s ", duration.as_secs_f64())
        } else if duration.subsec_millis() > 0 {
            write!(f, "{:.2}ms", duration.as_secs_f64() * 1_000.0)
        } else {
            write!(f, "{}µs", duration.as_micros())
        }
    }
}

/// Add profile scope. Nesting the macro allows us to make the profiling crate optional.
#[doc(hidden)]
#[macro_export]
macro_rules! scope {
    [$label:expr] => {
        #[cfg(feature = "profile")]
        profiling::scope!($label);
    };
}

/// Configuration for an LBVH build. The shape of the tree never depends on these settings, only how the work
/// is scheduled and checked.
#[derive(Clone, Copy, Debug)]
pub struct LbvhBuildConfig {
    /// Which built-in key sort to use for the Morton keys.
    pub sort: SortBackend,
    /// Below this many primitives every stage runs on the calling thread. Rayon overhead dominates for small
    /// meshes. Has no effect without the `parallel` feature.
    pub min_parallel: usize,
    /// Run `Lbvh::validate` on the finished tree. Panics if an invariant is broken.
    pub validate: bool,
}

impl Default for LbvhBuildConfig {
    fn default() -> Self {
        LbvhBuildConfig {
            sort: SortBackend::Radix,
            min_parallel: 4096,
            validate: cfg!(debug_assertions),
        }
    }
}

impl LbvhBuildConfig {
    /// Every stage goes through rayon regardless of the primitive count.
    pub const fn always_parallel() -> Self {
        LbvhBuildConfig {
            sort: SortBackend::Radix,
            min_parallel: 0,
            validate: true,
        }
    }

    /// Single threaded stages, including the key sort, with a comparison sort. Mostly useful as a reference.
    pub const fn sequential() -> Self {
        LbvhBuildConfig {
            sort: SortBackend::Comparison,
            min_parallel: usize::MAX,
            validate: true,
        }
    }

    #[inline(always)]
    pub(crate) fn use_parallel(&self, count: usize) -> bool {
        cfg!(feature = "parallel") && count >= self.min_parallel
    }

    /// The configured sort backend, on the calling thread when `count` is below `min_parallel`.
    #[inline(always)]
    pub fn sorter(&self, count: usize) -> BackendSorter {
        self.sort.with_parallel(self.use_parallel(count))
    }
}
