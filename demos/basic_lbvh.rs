use glam::*;
use swbvh::{
    lbvh::builder::LbvhBuilder,
    test_util::{geometry::icosphere, sampling::uniform_sample_sphere},
    triangle::IndexedMesh,
    LbvhBuildConfig,
};
use tracing_subscriber::EnvFilter;

fn main() {
    // Build logs go through tracing, try RUST_LOG=swbvh=trace
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // The mesh is borrowed for the build, the tree only stores node links and primitive ids.
    let (positions, indices) = icosphere(0);
    let mesh = IndexedMesh::new(&positions, &indices);

    // The builder owns the scratch memory of a build and can be reused for the next mesh.
    let mut builder = LbvhBuilder::with_capacity(mesh.len());
    let (bvh, stats) = match builder.build_with_stats(&mesh, &LbvhBuildConfig::default()) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("Build failed: {err}");
            return;
        }
    };

    println!(
        "{} primitives, {} nodes, depth {}, built in {:?}",
        bvh.prim_count(),
        bvh.nodes.len(),
        stats.max_depth,
        stats.build_time
    );

    // left right parent primitive, then the node's box
    print!("{bvh}");
    bvh.print_lbvh(bvh.root(), 0);

    // Sample the signed distance field of the sphere along a few directions
    for i in 0..8u32 {
        let dir = uniform_sample_sphere(vec2(i as f32 / 8.0, (i as f32 * 0.618).fract()));
        for radius in [0.0, 0.5, 2.0] {
            let p = dir * radius;
            if let Some(d) = bvh.signed_distance(&mesh, p) {
                println!("sdf({:>6.3}, {:>6.3}, {:>6.3}) = {:>7.4}", p.x, p.y, p.z, d);
            }
        }
    }
}
