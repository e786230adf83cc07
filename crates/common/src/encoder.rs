//! Text → token id encoders consumed by the loaders.

use std::path::Path;

use tokenizers::Tokenizer;

use crate::error::{DataError, Result};

/// Anything that turns text into token ids. Must be deterministic.
pub trait Encoder {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
}

impl Encoder for Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        // Special tokens are not injected; `<|endoftext|>` markers already in
        // the text are matched by the tokenizer's own added-token table.
        let enc = std::ops::Deref::deref(self)
            .encode(text, false)
            .map_err(|e| DataError::Encode(format!("tokenize: {e}")))?;
        Ok(enc.get_ids().to_vec())
    }
}

impl<E: Encoder + ?Sized> Encoder for &E {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        (**self).encode(text)
    }
}

/// Byte-level fallback: every UTF-8 byte is its own token id (0..=255).
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteEncoder;

impl Encoder for ByteEncoder {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.bytes().map(u32::from).collect())
    }
}

/// Load a HuggingFace `tokenizer.json`.
pub fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path.as_os_str().to_string_lossy().to_string())
        .map_err(|e| DataError::Encode(format!("load tokenizer {}: {e}", path.display())))
}
