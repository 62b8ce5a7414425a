//! Triangle representation in 3D space, and the indexed triangle mesh the LBVH is built over.

use glam::{UVec3, Vec3, Vec3A};

use crate::{aabb::Aabb, error::BuildError};

#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct Triangle {
    pub v0: Vec3A,
    pub v1: Vec3A,
    pub v2: Vec3A,
}

impl Triangle {
    #[inline(always)]
    pub fn new(v0: Vec3A, v1: Vec3A, v2: Vec3A) -> Self {
        Triangle { v0, v1, v2 }
    }

    /// Compute the normal of the triangle geometry. Zero for degenerate triangles.
    #[inline(always)]
    pub fn compute_normal(&self) -> Vec3A {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(e2).normalize_or_zero()
    }

    /// Compute the bounding box of the triangle.
    #[inline(always)]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_point(self.v0)
            .union(&Aabb::from_point(self.v1))
            .union(&Aabb::from_point(self.v2))
    }

    /// Mean of the three vertices.
    #[inline(always)]
    pub fn centroid(&self) -> Vec3A {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    /// Vertices in winding order, indexed like `TriangleFeature`.
    #[inline(always)]
    pub fn corners(&self) -> [Vec3A; 3] {
        [self.v0, self.v1, self.v2]
    }

    /// Interior angle at `corner`. Zero when an adjacent edge has zero length.
    #[inline(always)]
    pub fn corner_angle(&self, corner: usize) -> f32 {
        let c = self.corners();
        let e1 = c[(corner + 1) % 3] - c[corner];
        let e2 = c[(corner + 2) % 3] - c[corner];
        if e1.length_squared() == 0.0 || e2.length_squared() == 0.0 {
            return 0.0;
        }
        e1.angle_between(e2)
    }

    /// Closest point on the triangle to `p`.
    #[inline(always)]
    pub fn closest_point(&self, p: Vec3A) -> Vec3A {
        self.closest_point_feature(p).0
    }

    /// Closest point on the triangle to `p` and the feature it lies on, found by classifying `p` against the
    /// Voronoi regions of the vertices, edges and face (Ericson, Real-Time Collision Detection 5.1.5).
    /// Zero-area triangles fall back to the closest point on their edges.
    pub fn closest_point_feature(&self, p: Vec3A) -> (Vec3A, TriangleFeature) {
        let (a, b, c) = (self.v0, self.v1, self.v2);
        let ab = b - a;
        let ac = c - a;

        let ap = p - a;
        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return (a, TriangleFeature::Vertex(0));
        }

        let bp = p - b;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            return (b, TriangleFeature::Vertex(1));
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return (a + ab * v, TriangleFeature::Edge(0, 1));
        }

        let cp = p - c;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= 0.0 && d5 <= d6 {
            return (c, TriangleFeature::Vertex(2));
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return (a + ac * w, TriangleFeature::Edge(0, 2));
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return (b + (c - b) * w, TriangleFeature::Edge(1, 2));
        }

        let sum = va + vb + vc;
        if sum <= 0.0 {
            return self.closest_point_on_edges(p);
        }
        let denom = 1.0 / sum;
        let v = vb * denom;
        let w = vc * denom;
        (a + ab * v + ac * w, TriangleFeature::Face)
    }

    fn closest_point_on_edges(&self, p: Vec3A) -> (Vec3A, TriangleFeature) {
        [
            (closest_point_on_segment(self.v0, self.v1, p), TriangleFeature::Edge(0, 1)),
            (closest_point_on_segment(self.v1, self.v2, p), TriangleFeature::Edge(1, 2)),
            (closest_point_on_segment(self.v0, self.v2, p), TriangleFeature::Edge(0, 2)),
        ]
        .into_iter()
        .min_by(|x, y| x.0.distance_squared(p).total_cmp(&y.0.distance_squared(p)))
        .unwrap_or((self.v0, TriangleFeature::Vertex(0)))
    }
}

/// The part of a triangle a closest point lies on. Corners are numbered 0, 1, 2 for `v0`, `v1`, `v2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriangleFeature {
    Vertex(usize),
    /// Edge between two corners, lower corner first.
    Edge(usize, usize),
    Face,
}

#[inline(always)]
fn closest_point_on_segment(a: Vec3A, b: Vec3A, p: Vec3A) -> Vec3A {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= 0.0 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// A triangle soup given as a position buffer and a buffer of three vertex indices per triangle.
/// Both buffers stay owned by the caller; the LBVH only borrows them.
#[derive(Clone, Copy, Debug)]
pub struct IndexedMesh<'a> {
    pub positions: &'a [Vec3],
    pub indices: &'a [UVec3],
}

impl<'a> IndexedMesh<'a> {
    pub fn new(positions: &'a [Vec3], indices: &'a [UVec3]) -> Self {
        IndexedMesh { positions, indices }
    }

    /// Number of triangles (primitives).
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The triangle for `primitive_id`. Indices must have been checked with `validate`.
    #[inline(always)]
    pub fn triangle(&self, primitive_id: usize) -> Triangle {
        let tri = self.indices[primitive_id];
        Triangle {
            v0: self.positions[tri.x as usize].into(),
            v1: self.positions[tri.y as usize].into(),
            v2: self.positions[tri.z as usize].into(),
        }
    }

    /// Checks the preconditions of a build: at least one triangle, every index in range and every referenced
    /// vertex finite. Degenerate triangles are allowed.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.is_empty() {
            return Err(BuildError::EmptyMesh);
        }
        let vertex_count = self.positions.len();
        for (triangle, tri) in self.indices.iter().enumerate() {
            for vertex in tri.to_array() {
                let position = self.positions.get(vertex as usize).ok_or(
                    BuildError::IndexOutOfRange {
                        triangle,
                        vertex,
                        vertex_count,
                    },
                )?;
                if !position.is_finite() {
                    return Err(BuildError::NonFiniteVertex {
                        vertex: vertex as usize,
                    });
                }
            }
        }
        Ok(())
    }
}
