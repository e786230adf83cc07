//! # tokenfeed-common — Token Datasets for LM Training
//!
//! Loads raw text or pre-encoded archives into a chunk store and samples
//! fixed-length token windows from it:
//!
//! * **[`DatasetConfig`]** — loading / sampling knobs (serialised as JSON).
//! * **[`ChunkStore`]** — token chunks + boundary table; built by
//!   [`load_dataset`] or [`load_qna_dataset`].
//! * **[`FairSampler`]** / **[`WholeChunkSampler`]** — boundary-respecting
//!   window sampling and chunk-aligned sampling.
//! * **[`Encoder`]** — text → ids (`tokenizers::Tokenizer` or [`ByteEncoder`]).
//! * **[`archive`]** — `.npz` and `.tokens` readers/writers.

pub mod archive;
pub mod config;
pub mod data;
pub mod encoder;
pub mod error;
pub mod paths;
pub mod sampler;

pub use archive::{read_npz, read_tokenized_file, write_npz, write_tokenized_file, ArchiveKind};
pub use config::{DatasetConfig, SamplerKind};
pub use data::{
    encode_qna_pair, load_dataset, load_qna_dataset, ChunkStore, QnaDataset, SkippedRecord,
    StoreStats, END_OF_TEXT,
};
pub use encoder::{load_tokenizer, ByteEncoder, Encoder};
pub use error::{DataError, Result};
pub use paths::resolve_paths;
pub use sampler::{AnySampler, ChunkSampler, FairSampler, Window, WholeChunkSampler};
