//! Pre-encoded token archives.
//!
//! Two formats are recognised by extension:
//!
//! * **`.npz`** — numpy `savez` container; each 1-D integer array is one chunk,
//!   in stored entry order.
//! * **`.tokens`** — flat binary: magic `"TKN2"`, `num_tokens` as u64 LE, then
//!   `num_tokens` × u32 LE. The whole file is one chunk. Read via `memmap2`.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use memmap2::Mmap;
use npyz::{DType, NpyFile, NpyWriter, TypeChar, WriterBuilder};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{DataError, Result};

/// Magic bytes for the tokenized binary format (version 2).
const TOKENIZED_MAGIC: &[u8; 4] = b"TKN2";
/// Header size: magic (4) + num_tokens (8).
const TOKENIZED_HEADER_LEN: usize = 4 + 8;

/// Pre-encoded archive kinds, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Npz,
    Tokens,
}

impl ArchiveKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "npz" => Some(Self::Npz),
            "tokens" => Some(Self::Tokens),
            _ => None,
        }
    }
}

/// Read every chunk stored in a pre-encoded archive.
pub fn read_archive(path: &Path, kind: ArchiveKind) -> Result<Vec<Vec<u32>>> {
    match kind {
        ArchiveKind::Npz => read_npz(path),
        ArchiveKind::Tokens => Ok(vec![read_tokenized_file(path)?]),
    }
}

// ── npz ─────────────────────────────────────────────────────────────────────

/// Read all `.npy` entries of an `.npz`, preserving stored order.
pub fn read_npz(path: &Path) -> Result<Vec<Vec<u32>>> {
    let file = File::open(path).map_err(|e| DataError::io(path, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| DataError::archive(path, e.to_string()))?;
    let mut chunks = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip
            .by_index(i)
            .map_err(|e| DataError::archive(path, e.to_string()))?;
        let name = entry.name().to_string();
        if !name.ends_with(".npy") {
            continue;
        }
        let npy = NpyFile::new(entry).map_err(|e| DataError::archive(path, format!("{name}: {e}")))?;
        chunks.push(read_token_array(npy, path, &name)?);
    }
    tracing::debug!(path = %path.display(), chunks = chunks.len(), "read npz");
    Ok(chunks)
}

fn read_token_array<R: Read>(npy: NpyFile<R>, path: &Path, name: &str) -> Result<Vec<u32>> {
    if npy.shape().len() != 1 {
        return Err(DataError::archive(
            path,
            format!("{name}: expected a 1-D array, got shape {:?}", npy.shape()),
        ));
    }
    let ts = match npy.dtype() {
        DType::Plain(ts) => ts,
        other => {
            return Err(DataError::archive(
                path,
                format!("{name}: unsupported dtype {}", other.descr()),
            ))
        }
    };
    let bad = |e: std::io::Error| DataError::archive(path, format!("{name}: {e}"));
    let ids = match (ts.type_char(), ts.size_field()) {
        (TypeChar::Uint, 1) => to_token_ids(npy.into_vec::<u8>().map_err(bad)?),
        (TypeChar::Uint, 2) => to_token_ids(npy.into_vec::<u16>().map_err(bad)?),
        (TypeChar::Uint, 4) => to_token_ids(npy.into_vec::<u32>().map_err(bad)?),
        (TypeChar::Uint, 8) => to_token_ids(npy.into_vec::<u64>().map_err(bad)?),
        (TypeChar::Int, 1) => to_token_ids(npy.into_vec::<i8>().map_err(bad)?),
        (TypeChar::Int, 2) => to_token_ids(npy.into_vec::<i16>().map_err(bad)?),
        (TypeChar::Int, 4) => to_token_ids(npy.into_vec::<i32>().map_err(bad)?),
        (TypeChar::Int, 8) => to_token_ids(npy.into_vec::<i64>().map_err(bad)?),
        _ => {
            return Err(DataError::archive(
                path,
                format!("{name}: token arrays must be integer, got {ts}"),
            ))
        }
    };
    ids.ok_or_else(|| DataError::archive(path, format!("{name}: token id out of u32 range")))
}

fn to_token_ids<T>(values: Vec<T>) -> Option<Vec<u32>>
where
    u32: TryFrom<T>,
{
    values.into_iter().map(|v| u32::try_from(v).ok()).collect()
}

/// Write chunks as an `.npz` with entries `arr_0 .. arr_{N-1}` (numpy `savez` naming).
pub fn write_npz(path: &Path, chunks: &[Vec<u32>]) -> Result<()> {
    let file = File::create(path).map_err(|e| DataError::io(path, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default();
    let io_err = |e: std::io::Error| DataError::io(path, e);
    for (i, chunk) in chunks.iter().enumerate() {
        zip.start_file(format!("arr_{i}.npy"), options)
            .map_err(|e| DataError::archive(path, e.to_string()))?;
        let mut writer: NpyWriter<u32, _> = npyz::WriteOptions::new()
            .default_dtype()
            .shape(&[chunk.len() as u64])
            .writer(&mut zip)
            .begin_nd()
            .map_err(io_err)?;
        writer.extend(chunk.iter().copied()).map_err(io_err)?;
        writer.finish().map_err(io_err)?;
    }
    let mut inner = zip
        .finish()
        .map_err(|e| DataError::archive(path, e.to_string()))?;
    inner.flush().map_err(io_err)?;
    Ok(())
}

// ── Tokenized binary format ─────────────────────────────────────────────────

/// Write one token sequence in the `.tokens` format.
pub fn write_tokenized_file(path: &Path, token_ids: &[u32]) -> Result<()> {
    let io_err = |e: std::io::Error| DataError::io(path, e);
    let mut f = BufWriter::new(File::create(path).map_err(io_err)?);
    f.write_all(TOKENIZED_MAGIC).map_err(io_err)?;
    f.write_all(&(token_ids.len() as u64).to_le_bytes())
        .map_err(io_err)?;
    for &id in token_ids {
        f.write_all(&id.to_le_bytes()).map_err(io_err)?;
    }
    let f = f.into_inner().map_err(|e| DataError::io(path, e.into_error()))?;
    f.sync_all().map_err(io_err)?;
    Ok(())
}

/// Read a `.tokens` file into memory via a read-only mapping.
pub fn read_tokenized_file(path: &Path) -> Result<Vec<u32>> {
    let file = File::open(path).map_err(|e| DataError::io(path, e))?;
    // SAFETY: the mapping is read-only and dropped before returning; callers
    // must not truncate the file concurrently.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| DataError::io(path, e))?;
    if mmap.len() < TOKENIZED_HEADER_LEN {
        return Err(DataError::archive(path, "tokenized file too short"));
    }
    if &mmap[0..4] != TOKENIZED_MAGIC {
        return Err(DataError::archive(path, "invalid tokenized file: bad magic"));
    }
    let mut count = [0u8; 8];
    count.copy_from_slice(&mmap[4..TOKENIZED_HEADER_LEN]);
    let expected_len = usize::try_from(u64::from_le_bytes(count))
        .ok()
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(TOKENIZED_HEADER_LEN))
        .ok_or_else(|| DataError::archive(path, "token count overflows"))?;
    if mmap.len() < expected_len {
        return Err(DataError::archive(
            path,
            format!(
                "tokenized file truncated: expected {} bytes, got {}",
                expected_len,
                mmap.len()
            ),
        ));
    }
    Ok(mmap[TOKENIZED_HEADER_LEN..expected_len]
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
