//! Per-shader analysis cache.
//!
//! Analyses are computed lazily through [`Shader::require`] and memoized in a
//! [`MetadataCache`] owned by the shader. Each analysis declares the parts of
//! the shader it depends on as a [`DependencyMask`]; every mutation API of the
//! shader names the parts it changes, and the cache evicts exactly the entries
//! whose masks intersect. A consumer therefore never observes an analysis
//! computed for an older shape of the program.
//!
//! Debug builds additionally store a structural checksum of the depended-on
//! state with each entry and assert on every cache hit that it still matches,
//! which catches a mutation path that forgot to declare what it touched.

use std::{any::Any, fmt, sync::Arc};

use bitflags::bitflags;
use strum::{Display, EnumCount, EnumIter, IntoEnumIterator};

use crate::ir::Shader;

bitflags! {
    /// Parts of a shader an analysis depends on, or a mutation changes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DependencyMask: u8 {
        /// Instruction lists, operands, destinations and instruction flags.
        const INSTRUCTIONS = 1 << 0;
        /// Value shapes and the register allocation table.
        const VARIABLES = 1 << 1;
        /// Block layout, edges and terminators.
        const BLOCKS = 1 << 2;
    }
}

/// Identifies a cached analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter)]
pub enum AnalysisKind {
    /// [`crate::analysis::Dominance`]
    Dominance,
    /// [`crate::analysis::RegisterDefs`]
    RegisterDefs,
}

/// A memoizable analysis of a shader.
pub trait Analysis: Any + Send + Sync + Sized {
    /// Cache slot of this analysis.
    const KIND: AnalysisKind;

    /// Parts of the shader whose change invalidates the result.
    const DEPENDENCIES: DependencyMask;

    /// Computes the analysis.
    ///
    /// The shader is passed mutably only so prerequisite analyses can be
    /// obtained through [`Shader::require`]; computing must not mutate it.
    fn compute(shader: &mut Shader) -> Self;
}

#[derive(Clone)]
struct CacheEntry {
    deps: DependencyMask,
    value: Arc<dyn Any + Send + Sync>,
    checksum: Option<u64>,
}

/// Memoized analyses of one shader, keyed by [`AnalysisKind`].
#[derive(Clone, Default)]
pub struct MetadataCache {
    entries: [Option<CacheEntry>; AnalysisKind::COUNT],
    generation: u64,
    hits: u64,
    misses: u64,
}

impl MetadataCache {
    /// Mutation generation; bumped by every invalidation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `kind` currently has a cached result.
    #[must_use]
    pub fn is_cached(&self, kind: AnalysisKind) -> bool {
        self.entries[kind as usize].is_some()
    }

    /// Number of requests answered from the cache.
    #[must_use]
    pub const fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of requests that had to compute.
    #[must_use]
    pub const fn misses(&self) -> u64 {
        self.misses
    }

    /// Evicts every entry depending on `mask` and starts a new generation.
    pub(crate) fn invalidate(&mut self, mask: DependencyMask) {
        self.generation += 1;
        for slot in &mut self.entries {
            if slot.as_ref().is_some_and(|e| e.deps.intersects(mask)) {
                *slot = None;
            }
        }
    }

    pub(crate) fn lookup(
        &self,
        kind: AnalysisKind,
    ) -> Option<(Arc<dyn Any + Send + Sync>, DependencyMask, Option<u64>)> {
        self.entries[kind as usize]
            .as_ref()
            .map(|e| (Arc::clone(&e.value), e.deps, e.checksum))
    }

    pub(crate) fn store(
        &mut self,
        kind: AnalysisKind,
        deps: DependencyMask,
        value: Arc<dyn Any + Send + Sync>,
        checksum: Option<u64>,
    ) {
        self.misses += 1;
        self.entries[kind as usize] = Some(CacheEntry {
            deps,
            value,
            checksum,
        });
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }
}

impl fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached: Vec<AnalysisKind> = AnalysisKind::iter().filter(|k| self.is_cached(*k)).collect();
        f.debug_struct("MetadataCache")
            .field("generation", &self.generation)
            .field("cached", &cached)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

impl Shader {
    /// Returns analysis `A`, computing it if no valid result is cached.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if a cached result is found whose dependencies
    /// changed without the change being declared to the cache.
    pub fn require<A: Analysis>(&mut self) -> Arc<A> {
        if let Some((value, deps, checksum)) = self.metadata.lookup(A::KIND) {
            if let Some(expected) = checksum {
                let now = self.checksum(deps);
                assert_eq!(
                    expected, now,
                    "{} analysis is stale: the shader changed {:?} without invalidating it",
                    A::KIND, deps
                );
            }
            if let Ok(hit) = value.downcast::<A>() {
                self.metadata.record_hit();
                return hit;
            }
        }

        let generation = self.metadata.generation();
        let result = Arc::new(A::compute(self));
        debug_assert_eq!(
            generation,
            self.metadata.generation(),
            "computing {} mutated the shader",
            A::KIND
        );

        let checksum = cfg!(debug_assertions).then(|| self.checksum(A::DEPENDENCIES));
        self.metadata.store(
            A::KIND,
            A::DEPENDENCIES,
            Arc::clone(&result) as Arc<dyn Any + Send + Sync>,
            checksum,
        );
        result
    }

    /// Cache statistics and state.
    #[must_use]
    pub const fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::ir::{Builder, Cursor, ShaderStage};

    static BLOCK_COUNTS: AtomicUsize = AtomicUsize::new(0);

    struct BlockCount(usize);

    impl Analysis for BlockCount {
        const KIND: AnalysisKind = AnalysisKind::Dominance;
        const DEPENDENCIES: DependencyMask = DependencyMask::BLOCKS;

        fn compute(shader: &mut Shader) -> Self {
            BLOCK_COUNTS.fetch_add(1, Ordering::SeqCst);
            BlockCount(shader.block_ids().count())
        }
    }

    #[test]
    fn test_cache_hit_and_selective_eviction() {
        BLOCK_COUNTS.store(0, Ordering::SeqCst);
        let mut shader = Shader::new("cache", ShaderStage::Fragment);

        assert_eq!(shader.require::<BlockCount>().0, 1);
        assert_eq!(shader.require::<BlockCount>().0, 1);
        assert_eq!(BLOCK_COUNTS.load(Ordering::SeqCst), 1);
        assert_eq!(shader.metadata().hits(), 1);

        // Instruction-only mutation keeps block-level results.
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        b.imm_float(1.0, 32);
        assert!(shader.metadata().is_cached(AnalysisKind::Dominance));
        assert_eq!(shader.require::<BlockCount>().0, 1);
        assert_eq!(BLOCK_COUNTS.load(Ordering::SeqCst), 1);

        shader.create_block();
        assert!(!shader.metadata().is_cached(AnalysisKind::Dominance));
        assert_eq!(shader.require::<BlockCount>().0, 2);
        assert_eq!(BLOCK_COUNTS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_generation_advances_on_every_mutation() {
        let mut shader = Shader::new("gen", ShaderStage::Vertex);
        let before = shader.metadata().generation();
        shader.create_value(32, 1);
        assert!(shader.metadata().generation() > before);
    }
}
