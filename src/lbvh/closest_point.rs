//! Closest point on the mesh, the query the tree is built for: a signed distance field sampled at arbitrary points.

use glam::Vec3A;

use crate::{
    lbvh::Lbvh,
    triangle::{IndexedMesh, Triangle, TriangleFeature},
};

/// The point of the mesh closest to a query point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClosestPoint {
    /// Original index of the triangle the point lies on.
    pub primitive_id: u32,
    pub point: Vec3A,
    pub distance_squared: f32,
    /// Whether `point` is inside the triangle, on one of its edges or on a vertex.
    pub feature: TriangleFeature,
}

impl Lbvh {
    /// Closest point of the mesh to `p`. Nodes farther than the best point so far are skipped, the nearer child
    /// is visited first. `None` for an empty tree.
    /// `mesh` must be the mesh the tree was built from.
    pub fn closest_point(&self, mesh: &IndexedMesh, p: Vec3A) -> Option<ClosestPoint> {
        crate::scope!("closest_point");
        if self.nodes.is_empty() {
            return None;
        }

        let mut best: Option<ClosestPoint> = None;
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root() as u32);

        while let Some(node_index) = stack.pop() {
            let best_distance = best.map_or(f32::INFINITY, |b| b.distance_squared);
            if self.aabbs[node_index as usize].distance_squared_to_point(p) >= best_distance {
                continue;
            }

            let node = &self.nodes[node_index as usize];
            let Some([left, right]) = node.children() else {
                let (point, feature) =
                    mesh.triangle(node.primitive as usize).closest_point_feature(p);
                let distance_squared = point.distance_squared(p);
                if distance_squared < best_distance {
                    best = Some(ClosestPoint {
                        primitive_id: node.primitive,
                        point,
                        distance_squared,
                        feature,
                    });
                }
                continue;
            };

            let left_distance = self.aabbs[left as usize].distance_squared_to_point(p);
            let right_distance = self.aabbs[right as usize].distance_squared_to_point(p);
            // Last pushed is visited first
            if left_distance < right_distance {
                stack.push(right);
                stack.push(left);
            } else {
                stack.push(left);
                stack.push(right);
            }
        }

        best
    }

    /// Distance from `p` to the mesh, negative inside. The sign is taken against the angle weighted pseudonormal
    /// of the closest feature (Bærentsen and Aanæs).
    /// Assumes a closed mesh with outward facing (counter clockwise) triangles.
    pub fn signed_distance(&self, mesh: &IndexedMesh, p: Vec3A) -> Option<f32> {
        let closest = self.closest_point(mesh, p)?;
        let distance = closest.distance_squared.sqrt();
        if (p - closest.point).dot(self.pseudonormal(mesh, &closest)) < 0.0 {
            Some(-distance)
        } else {
            Some(distance)
        }
    }

    /// Angle weighted pseudonormal of the feature `closest` lies on: the face normal inside the triangle, the
    /// sum of the normals of the triangles sharing an edge, and the sum of the normals of the triangles around
    /// a vertex weighted by their angle at it. Normalized, zero where the normals cancel out.
    /// Triangles are connected by vertex position, so meshes with duplicated vertices work too.
    pub fn pseudonormal(&self, mesh: &IndexedMesh, closest: &ClosestPoint) -> Vec3A {
        let triangle = mesh.triangle(closest.primitive_id as usize);
        let corners = triangle.corners();
        let mut sum = Vec3A::ZERO;
        match closest.feature {
            TriangleFeature::Face => return triangle.compute_normal(),
            TriangleFeature::Edge(a, b) => {
                let other = corners[b];
                self.for_each_triangle_at(mesh, corners[a], |t| {
                    if t.corners().contains(&other) {
                        sum += t.compute_normal();
                    }
                });
            }
            TriangleFeature::Vertex(a) => {
                let vertex = corners[a];
                self.for_each_triangle_at(mesh, vertex, |t| {
                    if let Some(corner) = t.corners().iter().position(|&c| c == vertex) {
                        sum += t.compute_normal() * t.corner_angle(corner);
                    }
                });
            }
        }
        sum.normalize_or_zero()
    }

    /// Calls `f` for every triangle with a corner exactly at `vertex`. Only boxes containing `vertex` are
    /// visited.
    fn for_each_triangle_at(&self, mesh: &IndexedMesh, vertex: Vec3A, mut f: impl FnMut(Triangle)) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root() as u32);
        while let Some(node_index) = stack.pop() {
            if self.aabbs[node_index as usize].distance_squared_to_point(vertex) > 0.0 {
                continue;
            }
            let node = &self.nodes[node_index as usize];
            match node.children() {
                Some([left, right]) => {
                    stack.push(left);
                    stack.push(right);
                }
                None => {
                    let triangle = mesh.triangle(node.primitive as usize);
                    if triangle.corners().contains(&vertex) {
                        f(triangle);
                    }
                }
            }
        }
    }
}
