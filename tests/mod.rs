#[cfg(test)]
mod tests {

    use glam::*;
    use swbvh::{
        aabb::Aabb,
        error::BuildError,
        lbvh::{
            builder::{build_lbvh, build_lbvh_with_sorter, LbvhBuilder},
            morton::morton_encode_u32,
            node::LbvhNode,
            sort::{KeySorter, MortonKey, SortBackend},
            Lbvh,
        },
        test_util::{
            geometry::{coincident_soup, corner_points, cube, height_grid, icosphere, triangle_soup},
            sampling::hash_point,
        },
        triangle::IndexedMesh,
        LbvhBuildConfig, INVALID,
    };

    const SIZES: [u32; 9] = [1, 2, 3, 5, 8, 17, 100, 1000, 5000];

    /// Leaf range and box of `node_index`, computed by a plain recursive walk over the mesh.
    fn reference_walk(
        bvh: &Lbvh,
        mesh: &IndexedMesh,
        node_index: usize,
        boxes: &mut [Aabb],
    ) -> (u32, u32) {
        let node = bvh.nodes[node_index];
        match node.children() {
            None => {
                boxes[node_index] = mesh.triangle(node.primitive as usize).aabb();
                (node_index as u32, node_index as u32)
            }
            Some([left, right]) => {
                let (first, left_last) = reference_walk(bvh, mesh, left as usize, boxes);
                let (right_first, last) = reference_walk(bvh, mesh, right as usize, boxes);
                assert_eq!(left_last + 1, right_first, "node {node_index}");
                boxes[node_index] = boxes[left as usize].union(&boxes[right as usize]);
                (first, last)
            }
        }
    }

    #[test]
    pub fn tree_shape() {
        for p in SIZES {
            let (positions, indices) = triangle_soup(p, p);
            let mesh = IndexedMesh::new(&positions, &indices);
            let bvh = build_lbvh(&mesh, &LbvhBuildConfig::default()).unwrap();
            let p = p as usize;

            assert_eq!(bvh.nodes.len(), 2 * p - 1);
            assert_eq!(bvh.nodes.iter().filter(|n| n.is_leaf()).count(), p);
            assert!(bvh.nodes[..p].iter().all(LbvhNode::is_leaf));
            assert!(bvh.nodes[p..].iter().all(|n| !n.is_leaf()));
            assert_eq!(bvh.nodes.iter().filter(|n| n.is_root()).count(), 1);
            assert!(bvh.nodes[bvh.root()].is_root());
            assert_eq!(bvh.leaf_range(bvh.root()), (0, p as u32 - 1));

            let mut primitives = bvh.primitive_indices.clone();
            primitives.sort_unstable();
            assert!(primitives.iter().enumerate().all(|(i, &id)| i as u32 == id));

            bvh.validate(&mesh);
        }
    }

    #[test]
    pub fn range_correctness() {
        let (positions, indices) = height_grid(40, 3);
        let mesh = IndexedMesh::new(&positions, &indices);
        let bvh = build_lbvh(&mesh, &LbvhBuildConfig::default()).unwrap();
        let p = bvh.prim_count();

        let mut boxes = vec![Aabb::INVALID; bvh.nodes.len()];
        assert_eq!(
            reference_walk(&bvh, &mesh, bvh.root(), &mut boxes),
            (0, p as u32 - 1)
        );
        for node_index in p..bvh.nodes.len() {
            let [left, right] = bvh.nodes[node_index].children().unwrap();
            let (first, left_last) = bvh.leaf_range(left as usize);
            let (right_first, last) = bvh.leaf_range(right as usize);
            assert!(first <= left_last && left_last < right_first && right_first <= last);
            assert_eq!(left_last + 1, right_first);
            assert_eq!(bvh.leaf_range(node_index), (first, last));
        }
    }

    #[test]
    pub fn aabbs_match_sequential_walk() {
        for (positions, indices) in [icosphere(3), height_grid(32, 9), triangle_soup(3000, 1)] {
            let mesh = IndexedMesh::new(&positions, &indices);
            let bvh = build_lbvh(&mesh, &LbvhBuildConfig::always_parallel()).unwrap();

            let mut boxes = vec![Aabb::INVALID; bvh.nodes.len()];
            reference_walk(&bvh, &mesh, bvh.root(), &mut boxes);
            assert_eq!(boxes, bvh.aabbs);

            let all = (0..mesh.len())
                .map(|i| mesh.triangle(i).aabb())
                .fold(Aabb::INVALID, |a, b| a.union(&b));
            assert_eq!(bvh.aabbs[bvh.root()], all);
            assert_eq!(bvh.scene_aabb, all);
        }
    }

    #[test]
    pub fn determinism() {
        let (positions, indices) = triangle_soup(30_000, 5);
        let mesh = IndexedMesh::new(&positions, &indices);

        let reference = build_lbvh(&mesh, &LbvhBuildConfig::sequential()).unwrap();
        for config in [
            LbvhBuildConfig::default(),
            LbvhBuildConfig::always_parallel(),
            LbvhBuildConfig::sequential(),
            LbvhBuildConfig {
                sort: SortBackend::Comparison,
                ..LbvhBuildConfig::always_parallel()
            },
        ] {
            let bvh = build_lbvh(&mesh, &config).unwrap();
            assert_eq!(bvh.morton_codes, reference.morton_codes, "{config:?}");
            assert_eq!(bvh.primitive_indices, reference.primitive_indices, "{config:?}");
            assert_eq!(bvh.nodes, reference.nodes, "{config:?}");
            let bits = |b: &Lbvh| bytemuck::cast_slice::<Vec3, u32>(&b.aabbs_flat()).to_vec();
            assert_eq!(bits(&bvh), bits(&reference), "{config:?}");
        }
    }

    #[test]
    pub fn duplicate_codes_are_deterministic() {
        let (positions, indices) = coincident_soup(5000);
        let mesh = IndexedMesh::new(&positions, &indices);
        let a = build_lbvh(&mesh, &LbvhBuildConfig::always_parallel()).unwrap();
        let b = build_lbvh(&mesh, &LbvhBuildConfig::sequential()).unwrap();
        assert_eq!(a, b);
        // Ties are broken by primitive index
        assert!(a.morton_codes.iter().all(|&c| c == a.morton_codes[0]));
        assert!(a.primitive_indices.iter().enumerate().all(|(i, &id)| i as u32 == id));
        // Position tie-breaking keeps the tree balanced
        assert_eq!(a.depth(), 14);
    }

    #[test]
    pub fn single_primitive() {
        let positions = [vec3(1.0, 2.0, 3.0), vec3(2.0, 2.0, 3.0), vec3(1.0, 4.0, 5.0)];
        let indices = [uvec3(0, 1, 2)];
        let mesh = IndexedMesh::new(&positions, &indices);
        let (bvh, stats) = LbvhBuilder::new()
            .build_with_stats(&mesh, &LbvhBuildConfig::always_parallel())
            .unwrap();
        assert_eq!(bvh.nodes.len(), 1);
        assert_eq!(bvh.nodes[0], LbvhNode::new_leaf(0));
        assert_eq!(bvh.nodes[0].parent, INVALID);
        assert_eq!(
            bvh.aabbs[0],
            Aabb::new(vec3a(1.0, 2.0, 3.0), vec3a(2.0, 4.0, 5.0))
        );
        assert_eq!(stats.unions_written, 0);
        assert_eq!(stats.max_depth, 1);
    }

    #[test]
    pub fn coincident_vertices() {
        let positions = [vec3(0.5, -0.25, 3.0)];
        for count in [2, 3, 64, 1000] {
            let indices = vec![UVec3::ZERO; count];
            let mesh = IndexedMesh::new(&positions, &indices);
            let bvh = build_lbvh(&mesh, &LbvhBuildConfig::always_parallel()).unwrap();
            assert_eq!(bvh.nodes.len(), 2 * count - 1);
            for aabb in &bvh.aabbs {
                assert!(aabb.is_finite());
                assert!(aabb.valid());
                assert_eq!(*aabb, Aabb::from_point(Vec3A::from(positions[0])));
            }
        }
    }

    #[test]
    pub fn unit_cube_corners() {
        let (positions, indices) = corner_points();
        let mesh = IndexedMesh::new(&positions, &indices);
        let bvh = build_lbvh(&mesh, &LbvhBuildConfig::always_parallel()).unwrap();

        // Z-order: x varies fastest, then y, then z
        let expected_codes: Vec<u32> = (0..8u16)
            .map(|i| {
                let axis = |bit: u16| if i & (1 << bit) != 0 { 1023 } else { 0 };
                morton_encode_u32(axis(0), axis(1), axis(2))
            })
            .collect();
        assert_eq!(bvh.morton_codes, expected_codes);
        assert!(bvh.morton_codes.windows(2).all(|w| w[0] < w[1]));
        // Primitive i sits on corner 7 - i
        assert_eq!(bvh.primitive_indices, [7, 6, 5, 4, 3, 2, 1, 0]);

        assert_eq!(bvh.nodes.len(), 15);
        assert_eq!(bvh.nodes.iter().filter(|n| !n.is_leaf()).count(), 7);
        let result = bvh.validate(&mesh);
        assert_eq!(result.max_depth, 4);
        assert_eq!(result.leaves_at_depth.get(&4), Some(&8));

        assert_eq!(bvh.aabbs[bvh.root()], Aabb::new(Vec3A::ZERO, Vec3A::ONE));
    }

    #[test]
    pub fn refit_writes_each_inner_node_once() {
        let mut builder = LbvhBuilder::with_capacity(5000);
        for p in SIZES {
            let (positions, indices) = triangle_soup(p, 11);
            let mesh = IndexedMesh::new(&positions, &indices);
            for config in [LbvhBuildConfig::always_parallel(), LbvhBuildConfig::sequential()] {
                let (bvh, stats) = builder.build_with_stats(&mesh, &config).unwrap();
                assert_eq!(stats.unions_written, p as usize - 1);
                assert_eq!(stats.max_depth, bvh.depth());
                let counters = builder.arrival_counters();
                assert_eq!(counters.len(), p as usize - 1);
                assert!(counters.iter().all(|&c| c == 2));
            }
        }
        // Degenerate shape: every key equal
        let (positions, indices) = coincident_soup(777);
        let mesh = IndexedMesh::new(&positions, &indices);
        let (_, stats) = builder
            .build_with_stats(&mesh, &LbvhBuildConfig::always_parallel())
            .unwrap();
        assert_eq!(stats.unions_written, 776);
    }

    #[test]
    pub fn invalid_input() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let config = LbvhBuildConfig::default();

        let mesh = IndexedMesh::new(&positions, &[]);
        assert_eq!(build_lbvh(&mesh, &config), Err(BuildError::EmptyMesh));

        let indices = [uvec3(0, 1, 2), uvec3(0, 3, 2)];
        let mesh = IndexedMesh::new(&positions, &indices);
        assert_eq!(
            build_lbvh(&mesh, &config),
            Err(BuildError::IndexOutOfRange {
                triangle: 1,
                vertex: 3,
                vertex_count: 3
            })
        );

        let positions = [Vec3::ZERO, vec3(f32::NAN, 0.0, 0.0), Vec3::Y];
        let indices = [uvec3(0, 1, 2)];
        let mesh = IndexedMesh::new(&positions, &indices);
        assert_eq!(
            build_lbvh(&mesh, &config),
            Err(BuildError::NonFiniteVertex { vertex: 1 })
        );
    }

    struct OutOfMemorySorter;

    impl KeySorter for OutOfMemorySorter {
        fn sort_keys(&self, _keys: &mut [MortonKey]) -> Result<(), BuildError> {
            Err(BuildError::Sort("out of memory".to_string()))
        }
    }

    struct NoopSorter;

    impl KeySorter for NoopSorter {
        fn sort_keys(&self, _keys: &mut [MortonKey]) -> Result<(), BuildError> {
            Ok(())
        }
    }

    #[test]
    pub fn sort_capability_errors() {
        let (positions, indices) = corner_points();
        let mesh = IndexedMesh::new(&positions, &indices);
        let config = LbvhBuildConfig::default();

        let err = build_lbvh_with_sorter(&mesh, &config, &OutOfMemorySorter).unwrap_err();
        assert_eq!(err, BuildError::Sort("out of memory".to_string()));
        assert_eq!(err.to_string(), "key sort failed: out of memory");

        // Primitive 0 is on the last corner, so the unsorted keys break order right away
        assert_eq!(
            build_lbvh_with_sorter(&mesh, &config, &NoopSorter),
            Err(BuildError::UnsortedKeys { position: 1 })
        );
    }

    #[test]
    pub fn cube_signed_distance() {
        let (positions, indices) = cube();
        let mesh = IndexedMesh::new(&positions, &indices);
        let bvh = build_lbvh(&mesh, &LbvhBuildConfig::default()).unwrap();

        for (p, expected) in [
            (Vec3A::ZERO, -1.0),
            (vec3a(3.0, 0.0, 0.0), 2.0),
            (vec3a(0.0, -0.5, 0.25), -0.5),
        ] {
            let d = bvh.signed_distance(&mesh, p).unwrap();
            assert!((d - expected).abs() < 1e-6, "{p}: {d} != {expected}");
        }
        let corner = bvh.closest_point(&mesh, Vec3A::splat(2.0)).unwrap();
        assert_eq!(corner.point, Vec3A::ONE);
        assert_eq!(corner.distance_squared, 3.0);
    }

    #[test]
    pub fn closest_point_matches_brute_force() {
        let (positions, indices) = icosphere(3);
        let mesh = IndexedMesh::new(&positions, &indices);
        let bvh = build_lbvh(&mesh, &LbvhBuildConfig::default()).unwrap();
        for i in 0..300 {
            let p = hash_point(i, 42, 2.0);
            let expected = (0..mesh.len())
                .map(|id| mesh.triangle(id).closest_point(p).distance_squared(p))
                .fold(f32::INFINITY, f32::min);
            let closest = bvh.closest_point(&mesh, p).unwrap();
            assert!(
                (closest.distance_squared - expected).abs() <= 1e-6 * expected.max(1.0),
                "query {i}: {} != {expected}",
                closest.distance_squared
            );
        }
    }
}
