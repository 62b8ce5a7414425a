//! An Axis-Aligned Bounding Box (AABB) represented by its minimum and maximum points.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec3A};

/// An Axis-Aligned Bounding Box (AABB) represented by its minimum and maximum points.
#[derive(Default, Clone, Copy, Debug, PartialEq, Zeroable)]
#[repr(C)]
pub struct Aabb {
    pub min: Vec3A,
    pub max: Vec3A,
}

unsafe impl Pod for Aabb {}

impl Aabb {
    /// An invalid (empty) AABB with min set to the maximum possible value
    /// and max set to the minimum possible value.
    pub const INVALID: Self = Self {
        min: Vec3A::splat(f32::MAX),
        max: Vec3A::splat(f32::MIN),
    };

    /// The seed of a min/max accumulator: min at positive infinity, max at negative infinity.
    /// Any union with a finite box yields that box.
    pub const INFINITELY_EMPTY: Self = Self {
        min: Vec3A::splat(f32::INFINITY),
        max: Vec3A::splat(f32::NEG_INFINITY),
    };

    /// Creates a new AABB with the given minimum and maximum points.
    #[inline(always)]
    pub fn new(min: Vec3A, max: Vec3A) -> Self {
        Self { min, max }
    }

    /// Creates a new AABB with both min and max set to the given point.
    #[inline(always)]
    pub fn from_point(point: Vec3A) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Returns the union of this AABB and another AABB.
    #[inline(always)]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Returns the diagonal vector of the AABB.
    #[inline(always)]
    pub fn diagonal(&self) -> Vec3A {
        self.max - self.min
    }

    /// Checks if the AABB is valid (i.e., min <= max on all axes).
    pub fn valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Both corners are finite. A box that was never widened from `INFINITELY_EMPTY` is not.
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Squared distance from `point` to the closest point of the box. Zero inside.
    #[inline(always)]
    pub fn distance_squared_to_point(&self, point: Vec3A) -> f32 {
        let d = (self.min - point).max(point - self.max).max(Vec3A::ZERO);
        d.length_squared()
    }

    /// The two corners as unaligned vectors, the layout of a `float3` min/max pair in a device buffer.
    #[inline(always)]
    pub fn corners(&self) -> [Vec3; 2] {
        [self.min.into(), self.max.into()]
    }
}
