use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use glam::Vec3A;
#[cfg(feature = "parallel")]
use rayon::iter::{
    IndexedParallelIterator, IntoParallelIterator, IntoParallelRefIterator,
    IntoParallelRefMutIterator, ParallelIterator,
};

use crate::{
    aabb::Aabb,
    error::BuildError,
    lbvh::{
        atomic::{AtomicAabb, SceneBoundsAccumulator},
        karras::split_nodes,
        morton::morton_code_for_centroid,
        node::LbvhNode,
        refit::refit,
        sort::{verify_sorted, KeySorter, MortonKey},
        Lbvh,
    },
    timeit,
    triangle::IndexedMesh,
    LbvhBuildConfig, INVALID,
};

/// Build an LBVH over the triangles of `mesh`.
/// Just a helper function, keep an `LbvhBuilder` around instead to reuse its allocations between builds.
pub fn build_lbvh(mesh: &IndexedMesh, config: &LbvhBuildConfig) -> Result<Lbvh, BuildError> {
    LbvhBuilder::with_capacity(mesh.len()).build(mesh, config)
}

/// Build an LBVH over the triangles of `mesh`, sorting the Morton keys with `sorter` instead of the built-in
/// sort selected in `config`.
pub fn build_lbvh_with_sorter(
    mesh: &IndexedMesh,
    config: &LbvhBuildConfig,
    sorter: &dyn KeySorter,
) -> Result<Lbvh, BuildError> {
    LbvhBuilder::with_capacity(mesh.len())
        .build_with_sorter(mesh, config, sorter)
        .map(|(bvh, _)| bvh)
}

/// Primitive count and the sizes derived from it, the only configuration shared by every stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildParams {
    /// P
    pub prim_count: u32,
    /// P - 1
    pub num_inner: u32,
    /// 2P - 1
    pub num_nodes: u32,
}

impl BuildParams {
    pub fn new(prim_count: usize) -> Result<Self, BuildError> {
        if prim_count == 0 {
            return Err(BuildError::EmptyMesh);
        }
        // Every node index must stay below INVALID
        if prim_count > (INVALID / 2) as usize {
            return Err(BuildError::TooManyPrimitives(prim_count));
        }
        let prim_count = prim_count as u32;
        Ok(BuildParams {
            prim_count,
            num_inner: prim_count - 1,
            num_nodes: 2 * prim_count - 1,
        })
    }
}

/// Numbers collected during a build.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuildStats {
    /// Inner node boxes written during refit. Exactly `num_inner` when every node was refit once.
    pub unions_written: usize,
    /// Depth of the finished tree, a single leaf has depth 1.
    pub max_depth: usize,
    /// Scene bounds accumulated in the first stage.
    pub scene_aabb: Aabb,
    /// Wall time from validation of the input to the finished tree.
    pub build_time: Duration,
}

/// Runs the LBVH stages. Owns the scratch memory of a build: the scene bounds accumulator, the Morton keys, and
/// the per node atomics used while linking and refitting. Keep it around to reuse those allocations.
#[derive(Default)]
pub struct LbvhBuilder {
    scene_bounds: SceneBoundsAccumulator,
    keys: Vec<MortonKey>,
    aabbs: Vec<AtomicAabb>,
    parents: Vec<AtomicU32>,
    arrival_counters: Vec<AtomicU32>,
}

impl LbvhBuilder {
    pub fn new() -> Self {
        crate::scope!("preallocate_builder");
        Self::default()
    }

    /// Initialize a builder with pre-allocated capacity for building an LBVH with prim_count primitives.
    pub fn with_capacity(prim_count: usize) -> Self {
        crate::scope!("preallocate_builder");
        let num_nodes = (2 * prim_count).saturating_sub(1);
        LbvhBuilder {
            scene_bounds: SceneBoundsAccumulator::new(),
            keys: Vec::with_capacity(prim_count),
            aabbs: Vec::with_capacity(num_nodes),
            parents: Vec::with_capacity(num_nodes),
            arrival_counters: Vec::with_capacity(prim_count.saturating_sub(1)),
        }
    }

    pub fn build(
        &mut self,
        mesh: &IndexedMesh,
        config: &LbvhBuildConfig,
    ) -> Result<Lbvh, BuildError> {
        self.build_with_stats(mesh, config).map(|(bvh, _)| bvh)
    }

    pub fn build_with_stats(
        &mut self,
        mesh: &IndexedMesh,
        config: &LbvhBuildConfig,
    ) -> Result<(Lbvh, BuildStats), BuildError> {
        self.build_with_sorter(mesh, config, &config.sorter(mesh.len()))
    }

    /// Runs every stage in order. Each stage finishes (all of its threads joined) before the next one starts.
    /// Any error aborts the whole build, nothing built so far is returned.
    #[tracing::instrument(skip_all, fields(prim_count = mesh.len()))]
    pub fn build_with_sorter(
        &mut self,
        mesh: &IndexedMesh,
        config: &LbvhBuildConfig,
        sorter: &dyn KeySorter,
    ) -> Result<(Lbvh, BuildStats), BuildError> {
        crate::scope!("build_lbvh");
        let start_time = Instant::now();

        mesh.validate()?;
        let params = BuildParams::new(mesh.len())?;
        let prim_count = params.prim_count as usize;
        let parallel = config.use_parallel(prim_count);

        timeit!["compute_scene_bounds",
            let scene_aabb = self.compute_scene_bounds(mesh, parallel);
        ];
        tracing::trace!(?scene_aabb, "scene bounds");
        if prim_count > 1 && scene_aabb.diagonal().cmpeq(Vec3A::ZERO).any() {
            tracing::warn!(
                ?scene_aabb,
                "scene bounds are flat on at least one axis, Morton keys ignore that axis"
            );
        }

        timeit!["assign_morton_codes",
            self.assign_morton_codes(mesh, &scene_aabb, parallel);
        ];

        timeit!["sort_keys",
            self.sort_keys(sorter)?;
        ];
        tracing::trace!(
            first_code = self.keys[0].code,
            last_code = self.keys[prim_count - 1].code,
            "sorted morton keys"
        );

        timeit!["make_nodes",
            let (mut nodes, primitive_indices, morton_codes) =
                self.make_nodes(mesh, params, parallel);
        ];

        timeit!["split_nodes",
            self.split_and_link(&morton_codes, &mut nodes, parallel);
        ];
        tracing::trace!(num_nodes = params.num_nodes, "linked nodes");

        timeit!["refit",
            let unions_written =
                refit(&nodes, &self.aabbs, &self.arrival_counters, prim_count, parallel);
        ];
        tracing::trace!(unions_written, "refit");

        let aabbs = self.collect_aabbs(parallel);

        let bvh = Lbvh {
            nodes,
            aabbs,
            primitive_indices,
            morton_codes,
            scene_aabb,
        };

        let stats = BuildStats {
            unions_written,
            max_depth: bvh.depth(),
            scene_aabb,
            build_time: start_time.elapsed(),
        };

        tracing::debug!(
            prim_count,
            node_count = bvh.nodes.len(),
            max_depth = stats.max_depth,
            build_time_us = stats.build_time.as_micros() as u64,
            "built lbvh"
        );

        if config.validate {
            bvh.validate(mesh);
        }

        Ok((bvh, stats))
    }

    /// Stage 1: widen the global scene bounds with every primitive's bounds.
    pub fn compute_scene_bounds(&mut self, mesh: &IndexedMesh, parallel: bool) -> Aabb {
        crate::scope!("compute_scene_bounds");
        self.scene_bounds.reset();
        let bounds = &self.scene_bounds;
        let widen = |primitive_id: usize| bounds.widen(&mesh.triangle(primitive_id).aabb());

        #[cfg(feature = "parallel")]
        if parallel {
            (0..mesh.len()).into_par_iter().for_each(widen);
            return bounds.aabb();
        }
        let _ = parallel;
        (0..mesh.len()).for_each(widen);
        bounds.aabb()
    }

    /// Stage 2: one Morton key per primitive, from its centroid inside the scene bounds.
    pub fn assign_morton_codes(&mut self, mesh: &IndexedMesh, scene_aabb: &Aabb, parallel: bool) {
        crate::scope!("assign_morton_codes");
        self.keys.clear();
        self.keys.resize(mesh.len(), MortonKey::default());

        let gen_key = |(primitive_id, key): (usize, &mut MortonKey)| {
            let code = morton_code_for_centroid(mesh.triangle(primitive_id).centroid(), scene_aabb);
            *key = MortonKey::new(code, primitive_id as u32);
        };

        #[cfg(feature = "parallel")]
        if parallel {
            self.keys.par_iter_mut().enumerate().for_each(gen_key);
            return;
        }
        let _ = parallel;
        self.keys.iter_mut().enumerate().for_each(gen_key);
    }

    /// Stage 3: sort the keys with the external capability, then make sure it actually did.
    pub fn sort_keys(&mut self, sorter: &dyn KeySorter) -> Result<(), BuildError> {
        crate::scope!("sort_keys");
        sorter
            .sort_keys(&mut self.keys)
            .and_then(|_| verify_sorted(&self.keys))
            .inspect_err(|err| tracing::error!(%err, "aborting lbvh build"))
    }

    /// Stage 4: lay out the 2P - 1 nodes. Leaves get their sorted primitive and its bounds, inner nodes an empty
    /// box. Every parent link is cleared and every arrival counter zeroed.
    /// Also splits the sorted keys into the codes and the primitive permutation.
    pub fn make_nodes(
        &mut self,
        mesh: &IndexedMesh,
        params: BuildParams,
        parallel: bool,
    ) -> (Vec<LbvhNode>, Vec<u32>, Vec<u32>) {
        crate::scope!("make_nodes");
        let prim_count = params.prim_count as usize;
        let num_nodes = params.num_nodes as usize;

        let mut nodes = vec![LbvhNode::default(); num_nodes];
        self.aabbs.truncate(num_nodes);
        self.aabbs.resize_with(num_nodes, AtomicAabb::default);
        self.parents.truncate(num_nodes);
        self.parents.resize_with(num_nodes, || AtomicU32::new(INVALID));
        self.arrival_counters.truncate(params.num_inner as usize);
        self.arrival_counters
            .resize_with(params.num_inner as usize, || AtomicU32::new(0));

        let keys = &self.keys;
        type NodeSlots<'a> = ((&'a mut LbvhNode, &'a mut AtomicAabb), &'a mut AtomicU32);
        let init_node = |(node_id, ((node, aabb), parent)): (usize, NodeSlots)| {
            *parent.get_mut() = INVALID;
            if node_id < prim_count {
                let primitive_id = keys[node_id].index;
                *node = LbvhNode::new_leaf(primitive_id);
                aabb.set(&mesh.triangle(primitive_id as usize).aabb());
            } else {
                *node = LbvhNode::new_inner();
                aabb.set(&Aabb::INVALID);
            }
        };
        let reset_counter = |counter: &mut AtomicU32| *counter.get_mut() = 0;

        #[cfg(feature = "parallel")]
        if parallel {
            nodes
                .par_iter_mut()
                .zip(self.aabbs.par_iter_mut())
                .zip(self.parents.par_iter_mut())
                .enumerate()
                .for_each(init_node);
            self.arrival_counters
                .par_iter_mut()
                .for_each(reset_counter);
            let (morton_codes, primitive_indices) =
                keys.par_iter().map(|k| (k.code, k.index)).unzip();
            return (nodes, primitive_indices, morton_codes);
        }
        let _ = parallel;
        nodes
            .iter_mut()
            .zip(self.aabbs.iter_mut())
            .zip(self.parents.iter_mut())
            .enumerate()
            .for_each(init_node);
        self.arrival_counters.iter_mut().for_each(reset_counter);
        let (morton_codes, primitive_indices) = keys.iter().map(|k| (k.code, k.index)).unzip();
        (nodes, primitive_indices, morton_codes)
    }

    /// Stage 5: Karras split of every inner node, then copy the recorded parent links into the nodes.
    pub fn split_and_link(&mut self, morton_codes: &[u32], nodes: &mut [LbvhNode], parallel: bool) {
        crate::scope!("split_and_link");
        let prim_count = morton_codes.len();
        split_nodes(morton_codes, &mut nodes[prim_count..], &self.parents, parallel);

        let parents = &self.parents;
        let link = |(node_id, node): (usize, &mut LbvhNode)| {
            node.parent = parents[node_id].load(Ordering::Relaxed);
        };

        #[cfg(feature = "parallel")]
        if parallel {
            nodes.par_iter_mut().enumerate().for_each(link);
            return;
        }
        let _ = parallel;
        nodes.iter_mut().enumerate().for_each(link);
    }

    fn collect_aabbs(&self, parallel: bool) -> Vec<Aabb> {
        #[cfg(feature = "parallel")]
        if parallel {
            return self.aabbs.par_iter().map(AtomicAabb::load).collect();
        }
        let _ = parallel;
        self.aabbs.iter().map(AtomicAabb::load).collect()
    }

    /// Final arrival counter of every inner node from the last build. Each reads 2 after a complete refit.
    pub fn arrival_counters(&self) -> Vec<u32> {
        self.arrival_counters
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .collect()
    }

    /// Scene bounds accumulated by the last build.
    pub fn scene_bounds(&self) -> Aabb {
        self.scene_bounds.aabb()
    }
}
