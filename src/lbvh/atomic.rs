//! Atomic AABB storage shared between the threads of a single build stage.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3A;

use crate::aabb::Aabb;

/// Maps f32 bits to a u32 whose unsigned order matches the float order (for every non-NaN value).
/// Negative floats have all bits flipped, positive ones only the sign bit.
#[inline(always)]
pub fn f32_to_ordered(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// Inverse of `f32_to_ordered`.
#[inline(always)]
pub fn ordered_to_f32(ordered: u32) -> f32 {
    if ordered & 0x8000_0000 != 0 {
        f32::from_bits(ordered & 0x7fff_ffff)
    } else {
        f32::from_bits(!ordered)
    }
}

/// The global scene bounds accumulator. Every primitive widens it with atomic min/max per axis, so the result
/// doesn't depend on the order the primitives arrive in.
pub struct SceneBoundsAccumulator {
    min: [AtomicU32; 3],
    max: [AtomicU32; 3],
}

impl Default for SceneBoundsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneBoundsAccumulator {
    /// A fresh accumulator seeded to (+inf, +inf, +inf) / (-inf, -inf, -inf).
    pub fn new() -> Self {
        let min = f32_to_ordered(f32::INFINITY);
        let max = f32_to_ordered(f32::NEG_INFINITY);
        SceneBoundsAccumulator {
            min: std::array::from_fn(|_| AtomicU32::new(min)),
            max: std::array::from_fn(|_| AtomicU32::new(max)),
        }
    }

    /// Re-seed for the next build.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Widen the accumulator to include `aabb`.
    #[inline]
    pub fn widen(&self, aabb: &Aabb) {
        for axis in 0..3 {
            // Relaxed: the end of the stage is the barrier that publishes the final value.
            self.min[axis].fetch_min(f32_to_ordered(aabb.min[axis]), Ordering::Relaxed);
            self.max[axis].fetch_max(f32_to_ordered(aabb.max[axis]), Ordering::Relaxed);
        }
    }

    /// Current value of the accumulator. Only meaningful once every widening thread has been joined.
    pub fn aabb(&self) -> Aabb {
        let load = |a: &[AtomicU32; 3]| {
            Vec3A::from_array(std::array::from_fn(|axis| {
                ordered_to_f32(a[axis].load(Ordering::Relaxed))
            }))
        };
        Aabb::new(load(&self.min), load(&self.max))
    }
}

/// An AABB that can be written by one thread and read by another. The six floats are stored as raw bits.
/// Loads and stores are relaxed, ordering has to come from somewhere else (the arrival counters in refit).
pub struct AtomicAabb([AtomicU32; 6]);

impl Default for AtomicAabb {
    fn default() -> Self {
        AtomicAabb::new(Aabb::INVALID)
    }
}

impl AtomicAabb {
    pub fn new(aabb: Aabb) -> Self {
        let bits = Self::to_bits(&aabb);
        AtomicAabb(std::array::from_fn(|i| AtomicU32::new(bits[i])))
    }

    #[inline(always)]
    fn to_bits(aabb: &Aabb) -> [u32; 6] {
        [
            aabb.min.x.to_bits(),
            aabb.min.y.to_bits(),
            aabb.min.z.to_bits(),
            aabb.max.x.to_bits(),
            aabb.max.y.to_bits(),
            aabb.max.z.to_bits(),
        ]
    }

    #[inline(always)]
    pub fn load(&self) -> Aabb {
        let f = |i: usize| f32::from_bits(self.0[i].load(Ordering::Relaxed));
        Aabb::new(Vec3A::new(f(0), f(1), f(2)), Vec3A::new(f(3), f(4), f(5)))
    }

    #[inline(always)]
    pub fn store(&self, aabb: &Aabb) {
        for (slot, bits) in self.0.iter().zip(Self::to_bits(aabb)) {
            slot.store(bits, Ordering::Relaxed);
        }
    }

    /// Non-atomic write through an exclusive reference.
    #[inline(always)]
    pub fn set(&mut self, aabb: &Aabb) {
        for (slot, bits) in self.0.iter_mut().zip(Self::to_bits(aabb)) {
            *slot.get_mut() = bits;
        }
    }
}
