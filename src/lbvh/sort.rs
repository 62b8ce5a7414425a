// ----------------------------
// --- SORTING MORTON KEYS ---
// ----------------------------

use bytemuck::{Pod, Zeroable};
use rdst::{RadixKey, RadixSort};

#[cfg(feature = "parallel")]
use rayon::slice::ParallelSliceMut;

use crate::error::BuildError;

/// A Morton code paired with the original index of the primitive it was computed for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MortonKey {
    pub code: u32,
    pub index: u32,
}

impl MortonKey {
    #[inline(always)]
    pub fn new(code: u32, index: u32) -> Self {
        MortonKey { code, index }
    }

    /// Code in the high half, primitive index in the low half. Unique per primitive, so sorting by it breaks
    /// ties between equal codes by primitive index no matter which sort algorithm is used.
    #[inline(always)]
    pub fn composite(&self) -> u64 {
        (self.code as u64) << 32 | self.index as u64
    }
}

impl RadixKey for MortonKey {
    const LEVELS: usize = 8;

    #[inline(always)]
    fn get_level(&self, level: usize) -> u8 {
        self.composite().get_level(level)
    }
}

/// The sort-by-key capability the builder depends on. After `sort_keys` returns `Ok`, keys must be ascending by
/// `MortonKey::composite` and still hold every primitive exactly once. The builder checks this before linking.
pub trait KeySorter: Sync {
    fn sort_keys(&self, keys: &mut [MortonKey]) -> Result<(), BuildError>;
}

/// rdst radix sort, falling back to a comparison sort where radix sorting doesn't pay off.
/// With `parallel` false the sort stays on the calling thread.
#[derive(Clone, Copy, Debug)]
pub struct RadixKeySorter {
    pub parallel: bool,
}

impl Default for RadixKeySorter {
    fn default() -> Self {
        RadixKeySorter { parallel: true }
    }
}

impl KeySorter for RadixKeySorter {
    fn sort_keys(&self, keys: &mut [MortonKey]) -> Result<(), BuildError> {
        crate::scope!("radix_sort_keys");
        #[cfg(feature = "parallel")]
        if self.parallel {
            match keys.len() {
                0..=20_000 => keys.sort_unstable_by_key(MortonKey::composite),
                _ => keys.radix_sort_builder().with_tuner(&KeyTuner {}).sort(),
            };
            return Ok(());
        }

        match keys.len() {
            0..=250_000 => keys.sort_unstable_by_key(MortonKey::composite),
            _ => keys
                .radix_sort_builder()
                .with_single_threaded_tuner()
                .with_parallel(false)
                .sort(),
        };
        Ok(())
    }
}

/// Comparison sort on the composite key. Parallel merge sort with the `parallel` feature, unless `parallel` is
/// false.
#[derive(Clone, Copy, Debug)]
pub struct ComparisonKeySorter {
    pub parallel: bool,
}

impl Default for ComparisonKeySorter {
    fn default() -> Self {
        ComparisonKeySorter { parallel: true }
    }
}

impl KeySorter for ComparisonKeySorter {
    fn sort_keys(&self, keys: &mut [MortonKey]) -> Result<(), BuildError> {
        crate::scope!("comparison_sort_keys");
        #[cfg(feature = "parallel")]
        if self.parallel {
            keys.par_sort_unstable_by_key(MortonKey::composite);
            return Ok(());
        }
        keys.sort_unstable_by_key(MortonKey::composite);
        Ok(())
    }
}

/// The built-in sorters, selectable from `LbvhBuildConfig`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBackend {
    #[default]
    Radix,
    Comparison,
}

impl SortBackend {
    /// This backend, kept on the calling thread when `parallel` is false.
    pub fn with_parallel(self, parallel: bool) -> BackendSorter {
        BackendSorter {
            backend: self,
            parallel,
        }
    }
}

/// Sorts with the built-in backend (parallel when the `parallel` feature is on).
impl KeySorter for SortBackend {
    fn sort_keys(&self, keys: &mut [MortonKey]) -> Result<(), BuildError> {
        self.with_parallel(true).sort_keys(keys)
    }
}

/// A built-in backend bound to whether it may use the rayon pool. The builder makes one per build from
/// `LbvhBuildConfig::use_parallel`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendSorter {
    pub backend: SortBackend,
    pub parallel: bool,
}

impl KeySorter for BackendSorter {
    fn sort_keys(&self, keys: &mut [MortonKey]) -> Result<(), BuildError> {
        let parallel = self.parallel;
        match self.backend {
            SortBackend::Radix => RadixKeySorter { parallel }.sort_keys(keys),
            SortBackend::Comparison => ComparisonKeySorter { parallel }.sort_keys(keys),
        }
    }
}

/// Checks the postcondition of a `KeySorter`: strictly ascending composite keys (every key is unique) and every
/// primitive index in `0..keys.len()` present exactly once.
pub fn verify_sorted(keys: &[MortonKey]) -> Result<(), BuildError> {
    let mut seen = vec![false; keys.len()];
    for (position, key) in keys.iter().enumerate() {
        let index = key.index as usize;
        if index >= keys.len() || seen[index] {
            return Err(BuildError::UnsortedKeys { position });
        }
        seen[index] = true;
        if position > 0 && keys[position - 1].composite() >= key.composite() {
            return Err(BuildError::UnsortedKeys { position });
        }
    }
    Ok(())
}

#[cfg(feature = "parallel")]
use rdst::tuner::{Algorithm, Tuner, TuningParams};

#[cfg(feature = "parallel")]
struct KeyTuner;

#[cfg(feature = "parallel")]
impl Tuner for KeyTuner {
    fn pick_algorithm(&self, p: &TuningParams, _counts: &[usize]) -> Algorithm {
        if p.input_len <= 128 {
            return Algorithm::Comparative;
        }

        match p.input_len {
            0..=20_000 => Algorithm::Ska,
            _ => Algorithm::Regions,
        }
    }
}
