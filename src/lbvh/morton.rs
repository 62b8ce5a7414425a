// http://www.graphics.stanford.edu/~seander/bithacks.html#InterleaveBMN

//---------------------------------------------------
// --- 10 bit resolution per channel morton curve ---
//---------------------------------------------------

use glam::Vec3A;

use crate::aabb::Aabb;

/// Bits of quantization per axis. Three axes interleave into the low 30 bits of a u32.
pub const MORTON_BITS_PER_AXIS: u32 = 10;

const MORTON_AXIS_MAX: u32 = (1 << MORTON_BITS_PER_AXIS) - 1;

#[inline]
pub fn split_by_3_u32(a: u16) -> u32 {
    let mut x = a as u32 & 0x3ff; // we only look at the first 10 bits
    x = (x | x << 16) & 0x30000ff;
    x = (x | x << 8) & 0x300f00f;
    x = (x | x << 4) & 0x30c30c3;
    x = (x | x << 2) & 0x9249249;
    x
}

#[inline]
/// Encode x,y,z position into a u32 morton value. x lands in the lowest bit of every triple, z in the highest.
/// Input should be 0..2u16.pow(10)
pub fn morton_encode_u32(x: u16, y: u16, z: u16) -> u32 {
    split_by_3_u32(x) | split_by_3_u32(y) << 1 | split_by_3_u32(z) << 2
}

#[inline]
/// Encode a Vec3A position into a u32 morton value.
/// Input should be 0.0..=1.0, anything outside (or NaN) is clamped into range.
pub fn morton_encode_u32_unorm(p: Vec3A) -> u32 {
    let q = (p * (1 << MORTON_BITS_PER_AXIS) as f32)
        .clamp(Vec3A::ZERO, Vec3A::splat(MORTON_AXIS_MAX as f32));
    // `as` saturates and maps NaN to 0
    morton_encode_u32(q.x as u16, q.y as u16, q.z as u16)
}

/// Maps `point` into the unit cube spanned by `scene`. Axes where the scene has no extent map to 0.
#[inline]
pub fn normalize_in_scene(point: Vec3A, scene: &Aabb) -> Vec3A {
    let extent = scene.diagonal();
    let offset = point - scene.min;
    Vec3A::select(
        extent.cmpgt(Vec3A::ZERO),
        offset / extent,
        Vec3A::ZERO,
    )
}

/// Morton key of a primitive with the given centroid inside the scene bounds.
#[inline]
pub fn morton_code_for_centroid(centroid: Vec3A, scene: &Aabb) -> u32 {
    morton_encode_u32_unorm(normalize_in_scene(centroid, scene))
}
