//! Meshes, generators, sampling functions, etc.. for basic testing & examples.

pub mod sampling {
    use std::f32::consts::TAU;

    use glam::*;

    #[inline(always)]
    pub fn uhash(x: u32) -> u32 {
        // from https://nullprogram.com/blog/2018/07/31/
        let mut x = x ^ (x >> 16);
        x = x.overflowing_mul(0x7feb352d).0;
        x = x ^ (x >> 15);
        x = x.overflowing_mul(0x846ca68b).0;
        x = x ^ (x >> 16);
        x
    }

    #[inline(always)]
    pub fn uhash2(a: u32, b: u32) -> u32 {
        uhash((a.overflowing_mul(1597334673).0) ^ (b.overflowing_mul(3812015801).0))
    }

    #[inline(always)]
    pub fn unormf(n: u32) -> f32 {
        n as f32 * (1.0 / 0xffffffffu32 as f32)
    }

    #[inline(always)]
    pub fn hash_noise(coord: UVec2, frame: u32) -> f32 {
        let urnd = uhash2(coord.x, (coord.y << 11) + frame);
        unormf(urnd)
    }

    /// Point in `[-extent, extent]^3` for sample `i`.
    #[inline(always)]
    pub fn hash_point(i: u32, seed: u32, extent: f32) -> Vec3A {
        vec3a(
            hash_noise(uvec2(i, 0), seed),
            hash_noise(uvec2(i, 1), seed),
            hash_noise(uvec2(i, 2), seed),
        ) * (2.0 * extent)
            - extent
    }

    #[inline(always)]
    pub fn uniform_sample_sphere(urand: Vec2) -> Vec3A {
        let z = 1.0 - 2.0 * urand.x;
        let r = (1.0 - z * z).sqrt();
        let theta = urand.y * TAU;
        vec3a(r * theta.cos(), r * theta.sin(), z)
    }

    #[inline(always)]
    fn cubic(v0: f32, v1: f32, v2: f32, v3: f32, x: f32) -> f32 {
        let p = (v3 - v2) - (v0 - v1);
        let q = (v0 - v1) - p;
        let r = v2 - v0;
        let s = v1;
        p * x.powi(3) + q * x.powi(2) + r * x + s
    }

    #[inline(always)]
    pub fn bicubic_noise(coord: Vec2, seed: u32) -> f32 {
        let ix = coord.x.floor() as u32;
        let iy = coord.y.floor() as u32;
        let fx = coord.x - ix as f32;
        let fy = coord.y - iy as f32;
        fn cubic_col(ix: u32, iy: u32, j: u32, seed: u32, fx: f32) -> f32 {
            cubic(
                hash_noise(uvec2(ix, iy + j), seed),
                hash_noise(uvec2(ix + 1, iy + j), seed),
                hash_noise(uvec2(ix + 2, iy + j), seed),
                hash_noise(uvec2(ix + 3, iy + j), seed),
                fx,
            )
        }
        cubic(
            cubic_col(ix, iy, 0, seed, fx),
            cubic_col(ix, iy, 1, seed, fx),
            cubic_col(ix, iy, 2, seed, fx),
            cubic_col(ix, iy, 3, seed, fx),
            fy,
        )
    }
}

/// Every generator returns `(positions, indices)`, ready for `IndexedMesh::new`. Closed meshes wind their
/// triangles counter clockwise seen from outside.
pub mod geometry {
    use std::collections::HashMap;

    use crate::test_util::sampling::{bicubic_noise, hash_point};
    use glam::*;

    /// Cube with side length of 2 centered at 0,0,0. Vertex `i` is at `(±1, ±1, ±1)` with the sign of each axis
    /// taken from bits 0, 1 and 2 of `i`.
    pub fn cube() -> (Vec<Vec3>, Vec<UVec3>) {
        let positions = (0..8u32)
            .map(|i| {
                let bit = |b: u32| if i & (1 << b) != 0 { 1.0 } else { -1.0 };
                vec3(bit(0), bit(1), bit(2))
            })
            .collect();
        #[rustfmt::skip]
        let indices = vec![
            uvec3(2, 7, 3), uvec3(7, 4, 5), uvec3(6, 0, 4), uvec3(1, 4, 0),
            uvec3(3, 5, 1), uvec3(2, 1, 0), uvec3(2, 6, 7), uvec3(7, 6, 4),
            uvec3(6, 2, 0), uvec3(1, 5, 4), uvec3(3, 7, 5), uvec3(2, 3, 1),
        ];
        (positions, indices)
    }

    /// Regular tetrahedron centered at 0,0,0 with vertices on alternating corners of the `[-1, 1]` cube. Every
    /// pair of faces meets at a sharp edge.
    pub fn tetrahedron() -> (Vec<Vec3>, Vec<UVec3>) {
        let positions = vec![
            vec3(1.0, 1.0, 1.0),
            vec3(1.0, -1.0, -1.0),
            vec3(-1.0, 1.0, -1.0),
            vec3(-1.0, -1.0, 1.0),
        ];
        let indices = vec![uvec3(1, 3, 2), uvec3(0, 2, 3), uvec3(0, 3, 1), uvec3(0, 1, 2)];
        (positions, indices)
    }

    /// Icosphere with radius of 1, vertices shared between triangles.
    pub fn icosphere(subdivisions: u32) -> (Vec<Vec3>, Vec<UVec3>) {
        let phi = (1.0 + 5.0_f32.sqrt()) / 2.0; // golden ratio
        let (a, b, c, d, e) = (1.0, -1.0, 0.0, phi, -phi);

        #[rustfmt::skip]
        let mut positions = [vec3(b,d,c),vec3(a,d,c),vec3(b,e,c),vec3(a,e,c),vec3(c,b,d),vec3(c,a,d),vec3(c,b,e),vec3(c,a,e),vec3(d,c,b),vec3(d,c,a),vec3(e,c,b),vec3(e,c,a)]
            .map(Vec3::normalize)
            .to_vec();

        #[rustfmt::skip]
        let mut indices = vec![
            uvec3(0, 11, 5), uvec3(0, 5, 1), uvec3(0, 1, 7), uvec3(0, 7, 10), uvec3(0, 10, 11),
            uvec3(1, 5, 9), uvec3(5, 11, 4), uvec3(11, 10, 2), uvec3(10, 7, 6), uvec3(7, 1, 8),
            uvec3(3, 9, 4), uvec3(3, 4, 2), uvec3(3, 2, 6), uvec3(3, 6, 8), uvec3(3, 8, 9),
            uvec3(4, 9, 5), uvec3(2, 4, 11), uvec3(6, 2, 10), uvec3(8, 6, 7), uvec3(9, 8, 1),
        ];

        for _ in 0..subdivisions {
            let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
            let mut midpoint = |i: u32, j: u32| -> u32 {
                *midpoints.entry((i.min(j), i.max(j))).or_insert_with(|| {
                    let mid = ((positions[i as usize] + positions[j as usize]) * 0.5).normalize();
                    positions.push(mid);
                    positions.len() as u32 - 1
                })
            };
            let subdivided: Vec<UVec3> = indices
                .iter()
                .flat_map(|t| {
                    let (m01, m12, m20) = (midpoint(t.x, t.y), midpoint(t.y, t.z), midpoint(t.z, t.x));
                    [
                        uvec3(t.x, m01, m20),
                        uvec3(t.y, m12, m01),
                        uvec3(t.z, m20, m12),
                        uvec3(m01, m12, m20),
                    ]
                })
                .collect();
            indices = subdivided;
        }

        (positions, indices)
    }

    /// Height field over `[-1, 1]` on x and z with `resolution * resolution` cells, two triangles per cell,
    /// facing up.
    pub fn height_grid(resolution: u32, seed: u32) -> (Vec<Vec3>, Vec<UVec3>) {
        let row = resolution + 1;
        let mut positions = Vec::with_capacity((row * row) as usize);
        for z in 0..row {
            for x in 0..row {
                let coord = uvec2(x, z).as_vec2() / resolution as f32;
                let height = bicubic_noise(coord * 4.0, seed) - 0.5;
                positions.push(vec3(coord.x * 2.0 - 1.0, height, coord.y * 2.0 - 1.0));
            }
        }

        let mut indices = Vec::with_capacity((2 * resolution * resolution) as usize);
        for z in 0..resolution {
            for x in 0..resolution {
                let v00 = z * row + x;
                let v10 = v00 + 1;
                let v01 = v00 + row;
                let v11 = v01 + 1;
                indices.push(uvec3(v00, v01, v10));
                indices.push(uvec3(v10, v01, v11));
            }
        }

        (positions, indices)
    }

    /// Eight zero-area triangles, one collapsed onto each corner of the unit cube. Position `i` is the corner
    /// `(i & 1, (i >> 1) & 1, (i >> 2) & 1)`, primitive `i` sits on corner `7 - i`.
    pub fn corner_points() -> (Vec<Vec3>, Vec<UVec3>) {
        let positions = (0..8u32)
            .map(|i| uvec3(i & 1, (i >> 1) & 1, (i >> 2) & 1).as_vec3())
            .collect();
        let indices = (0..8u32).rev().map(UVec3::splat).collect();
        (positions, indices)
    }

    /// `count` copies of the same triangle. Every primitive gets the same Morton code.
    pub fn coincident_soup(count: u32) -> (Vec<Vec3>, Vec<UVec3>) {
        let positions = vec![vec3(0.25, 0.5, 0.0), vec3(0.75, 0.5, 0.0), vec3(0.5, 1.0, 0.5)];
        let indices = vec![uvec3(0, 1, 2); count as usize];
        (positions, indices)
    }

    /// `count` small unconnected triangles scattered through `[-1, 1]^3`.
    pub fn triangle_soup(count: u32, seed: u32) -> (Vec<Vec3>, Vec<UVec3>) {
        let mut positions = Vec::with_capacity(3 * count as usize);
        for i in 0..count {
            let center = hash_point(i, seed, 1.0);
            for corner in 0..3 {
                let offset = hash_point(i * 3 + corner, seed + 1, 0.05);
                positions.push((center + offset).into());
            }
        }
        let indices = (0..count).map(|i| uvec3(3 * i, 3 * i + 1, 3 * i + 2)).collect();
        (positions, indices)
    }
}
