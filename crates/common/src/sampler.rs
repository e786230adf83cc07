//! Fixed-length sampling from a [`ChunkStore`].
//!
//! * **[`FairSampler`]** — window drawn uniformly over the virtual
//!   concatenation of all chunks; draws that would straddle a chunk boundary
//!   are rejected and redrawn, so each chunk is hit in proportion to its size
//!   but no window mixes two documents.
//! * **[`WholeChunkSampler`]** — starts at the beginning of a uniformly chosen
//!   chunk and tops up from the following chunks (wrapping) until the sample
//!   is full. For tasks that must be aligned to a sequence start (QnA).
//!
//! Each sampler owns its generator; the store itself is shared read-only
//! through an [`Arc`] and can back any number of samplers on any threads.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SamplerKind;
use crate::data::ChunkStore;
use crate::error::{DataError, Result};

/// Common interface for samplers that yield fixed-length token sequences.
pub trait ChunkSampler {
    fn sample(&mut self, length: usize) -> Result<Vec<u32>>;
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn infeasible(length: usize, reason: String) -> DataError {
    DataError::SamplingInfeasible { length, reason }
}

// ── FairSampler ─────────────────────────────────────────────────────────────

/// Location of an accepted window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Chunk the window lies in.
    pub chunk: usize,
    /// Start within that chunk.
    pub start: usize,
    /// Start within the virtual concatenation.
    pub offset: usize,
    pub length: usize,
}

impl Window {
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// Boundary-respecting uniform window sampler.
pub struct FairSampler<R = StdRng> {
    store: Arc<ChunkStore>,
    rng: R,
}

impl FairSampler<StdRng> {
    /// Seeded sampler; `None` seeds from OS entropy.
    pub fn new(store: Arc<ChunkStore>, seed: Option<u64>) -> Self {
        Self::with_rng(store, seeded_rng(seed))
    }
}

impl<R: Rng> FairSampler<R> {
    pub fn with_rng(store: Arc<ChunkStore>, rng: R) -> Self {
        Self { store, rng }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Feasibility guard: `length < total_tokens / num_chunks` (integer
    /// division). Conservative: uneven chunk sizes can make a rejected length
    /// feasible, or an accepted one slow to sample.
    pub fn check_length(&self, length: usize) -> Result<()> {
        let n = self.store.num_chunks();
        let total = self.store.total_tokens();
        if n == 0 {
            return Err(infeasible(length, "no chunks loaded".into()));
        }
        let min = total / n;
        if length >= min {
            return Err(infeasible(
                length,
                format!("length must be below {min}: {total} tokens over {n} chunks"),
            ));
        }
        if total - length - 1 == 0 {
            return Err(infeasible(
                length,
                format!("no candidate offsets in {total} tokens"),
            ));
        }
        Ok(())
    }

    /// Draw an accepted window of `length` tokens.
    ///
    /// Candidate offsets are uniform in `[0, total - length - 1)`. A candidate
    /// is kept only if `[offset, offset + length)` ends inside the chunk it
    /// starts in; otherwise it is redrawn. The guard in
    /// [`check_length`](Self::check_length) keeps expected retries small.
    pub fn draw(&mut self, length: usize) -> Result<Window> {
        self.check_length(length)?;
        let upper = self.store.total_tokens() - length - 1;
        let boundaries = self.store.boundaries();
        let mut rejected = 0usize;
        loop {
            let offset = self.rng.gen_range(0..upper);
            let Some(chunk) = self.store.locate(offset) else {
                continue;
            };
            if boundaries[chunk + 1] >= offset + length {
                if rejected > 0 {
                    tracing::trace!(length, rejected, "window accepted after rejections");
                }
                return Ok(Window {
                    chunk,
                    start: offset - boundaries[chunk],
                    offset,
                    length,
                });
            }
            rejected += 1;
        }
    }

    /// Tokens covered by `window`.
    pub fn window(&self, window: &Window) -> &[u32] {
        &self.store.chunk(window.chunk)[window.start..window.end()]
    }

    pub fn sample(&mut self, length: usize) -> Result<Vec<u32>> {
        let window = self.draw(length)?;
        Ok(self.window(&window).to_vec())
    }
}

impl<R: Rng> ChunkSampler for FairSampler<R> {
    fn sample(&mut self, length: usize) -> Result<Vec<u32>> {
        FairSampler::sample(self, length)
    }
}

// ── WholeChunkSampler ───────────────────────────────────────────────────────

/// Samples from the start of a random chunk, right-truncated to `length` and
/// topped up from the next chunks (wrapping around the store) when short.
pub struct WholeChunkSampler<R = StdRng> {
    store: Arc<ChunkStore>,
    rng: R,
}

impl WholeChunkSampler<StdRng> {
    pub fn new(store: Arc<ChunkStore>, seed: Option<u64>) -> Self {
        Self::with_rng(store, seeded_rng(seed))
    }
}

impl<R: Rng> WholeChunkSampler<R> {
    pub fn with_rng(store: Arc<ChunkStore>, rng: R) -> Self {
        Self { store, rng }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// The store must hold at least `length` tokens in total, otherwise the
    /// wrap-around top-up could never finish.
    pub fn check_length(&self, length: usize) -> Result<()> {
        let total = self.store.total_tokens();
        if self.store.is_empty() {
            return Err(infeasible(length, "no chunks loaded".into()));
        }
        if total < length {
            return Err(infeasible(
                length,
                format!("store holds only {total} tokens"),
            ));
        }
        Ok(())
    }

    pub fn sample(&mut self, length: usize) -> Result<Vec<u32>> {
        self.check_length(length)?;
        let index = self.rng.gen_range(0..self.store.num_chunks());
        Ok(self.assemble(index, length))
    }

    /// `chunk[index][..length]`, then `chunk[index + 1][..remaining]`, ... in
    /// wrap-around order until `length` tokens are collected.
    pub fn sample_from(&self, index: usize, length: usize) -> Result<Vec<u32>> {
        self.check_length(length)?;
        let n = self.store.num_chunks();
        if index >= n {
            return Err(infeasible(
                length,
                format!("chunk index {index} out of range for {n} chunks"),
            ));
        }
        Ok(self.assemble(index, length))
    }

    fn assemble(&self, mut index: usize, length: usize) -> Vec<u32> {
        let n = self.store.num_chunks();
        let first = self.store.chunk(index);
        let mut out = Vec::with_capacity(length);
        out.extend_from_slice(&first[..first.len().min(length)]);
        while out.len() < length {
            index = (index + 1) % n;
            let chunk = self.store.chunk(index);
            let need = length - out.len();
            out.extend_from_slice(&chunk[..chunk.len().min(need)]);
        }
        out
    }
}

impl<R: Rng> ChunkSampler for WholeChunkSampler<R> {
    fn sample(&mut self, length: usize) -> Result<Vec<u32>> {
        WholeChunkSampler::sample(self, length)
    }
}

// ── AnySampler ──────────────────────────────────────────────────────────────

/// Either sampler, selected by [`SamplerKind`].
pub enum AnySampler {
    Fair(FairSampler),
    WholeChunk(WholeChunkSampler),
}

impl AnySampler {
    pub fn new(kind: SamplerKind, store: Arc<ChunkStore>, seed: Option<u64>) -> Self {
        match kind {
            SamplerKind::Fair => Self::Fair(FairSampler::new(store, seed)),
            SamplerKind::WholeChunk => Self::WholeChunk(WholeChunkSampler::new(store, seed)),
        }
    }

    pub fn kind(&self) -> SamplerKind {
        match self {
            AnySampler::Fair(_) => SamplerKind::Fair,
            AnySampler::WholeChunk(_) => SamplerKind::WholeChunk,
        }
    }
}

impl ChunkSampler for AnySampler {
    fn sample(&mut self, length: usize) -> Result<Vec<u32>> {
        match self {
            AnySampler::Fair(s) => s.sample(length),
            AnySampler::WholeChunk(s) => s.sample(length),
        }
    }
}
