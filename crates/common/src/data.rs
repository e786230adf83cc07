//! Data pipeline: path resolution → chunk store.
//!
//! * **[`ChunkStore`]** — immutable list of token chunks plus the cumulative
//!   boundary table used by the samplers.
//! * **[`load_dataset`]** — plain text (combined and encoded in batches of
//!   `combine` characters) and pre-encoded `.npz` / `.tokens` archives.
//! * **[`load_qna_dataset`]** — blank-line separated question/answer pairs,
//!   one chunk per pair, answer kept whole and question truncated to fit.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use crate::archive::{read_archive, ArchiveKind};
use crate::encoder::Encoder;
use crate::error::{DataError, Result};
use crate::paths::resolve_paths;

/// Document separator appended between plain-text files that are combined
/// into a single encoded chunk.
pub const END_OF_TEXT: &str = "<|endoftext|>";

// ── ChunkStore ──────────────────────────────────────────────────────────────

/// Ordered token chunks and their boundaries in the virtual concatenation.
///
/// `boundaries[0] == 0` and `boundaries[i + 1] - boundaries[i] == chunks[i].len()`,
/// so `boundaries[n]` is the total token count. Built once, read-only after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkStore {
    chunks: Vec<Vec<u32>>,
    boundaries: Vec<usize>,
}

impl ChunkStore {
    pub fn new(chunks: Vec<Vec<u32>>) -> Self {
        let mut boundaries = Vec::with_capacity(chunks.len() + 1);
        let mut acc = 0usize;
        boundaries.push(acc);
        for chunk in &chunks {
            acc += chunk.len();
            boundaries.push(acc);
        }
        Self { chunks, boundaries }
    }

    pub fn chunks(&self) -> &[Vec<u32>] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> &[u32] {
        &self.chunks[index]
    }

    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_tokens(&self) -> usize {
        self.boundaries[self.boundaries.len() - 1]
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Index of the chunk holding global `offset`, or `None` past the end.
    ///
    /// Finds the smallest `j` with `boundaries[j] > offset` and returns `j - 1`,
    /// so empty chunks are never selected.
    pub fn locate(&self, offset: usize) -> Option<usize> {
        if offset >= self.total_tokens() {
            return None;
        }
        let j = self.boundaries.partition_point(|&b| b <= offset);
        Some(j - 1)
    }

    pub fn into_chunks(self) -> Vec<Vec<u32>> {
        self.chunks
    }

    pub fn stats(&self) -> StoreStats {
        let lens = self.chunks.iter().map(Vec::len);
        let num_chunks = self.num_chunks();
        let total_tokens = self.total_tokens();
        StoreStats {
            num_chunks,
            total_tokens,
            min_chunk: lens.clone().min().unwrap_or(0),
            max_chunk: lens.max().unwrap_or(0),
            mean_chunk: if num_chunks == 0 {
                0.0
            } else {
                total_tokens as f64 / num_chunks as f64
            },
            max_fair_length: (total_tokens / num_chunks.max(1)).saturating_sub(1),
        }
    }
}

impl Default for ChunkStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl From<Vec<Vec<u32>>> for ChunkStore {
    fn from(chunks: Vec<Vec<u32>>) -> Self {
        Self::new(chunks)
    }
}

/// Summary of a [`ChunkStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub num_chunks: usize,
    pub total_tokens: usize,
    pub min_chunk: usize,
    pub max_chunk: usize,
    pub mean_chunk: f64,
    /// Largest sample length the fair sampler's feasibility guard accepts.
    pub max_fair_length: usize,
}

// ── Loaders ─────────────────────────────────────────────────────────────────

fn progress_bar(len: usize, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} files")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

/// Read a UTF-8 file with `\r\n` and lone `\r` line endings folded to `\n`.
fn read_text(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
    Ok(normalize_newlines(text))
}

fn normalize_newlines(text: String) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text
    }
}

/// Build a chunk store from a file, directory or glob.
///
/// Archives contribute their stored chunks directly. Plain-text files are
/// appended to a pending buffer; once the buffer reaches `combine` characters
/// it is encoded as one chunk, otherwise [`END_OF_TEXT`] is appended and
/// accumulation continues. Leftover text is encoded as a final chunk.
pub fn load_dataset<E: Encoder + ?Sized>(
    encoder: &E,
    path: &Path,
    combine: usize,
    progress: bool,
) -> Result<ChunkStore> {
    let paths = resolve_paths(path)?;
    let pb = progress_bar(paths.len(), progress);

    let mut chunks: Vec<Vec<u32>> = Vec::new();
    let mut raw_text = String::new();
    let mut raw_chars = 0usize;
    for p in &paths {
        if let Some(kind) = ArchiveKind::from_path(p) {
            let stored = read_archive(p, kind)?;
            tracing::debug!(path = %p.display(), chunks = stored.len(), "pre-encoded");
            chunks.extend(stored);
        } else {
            let text = read_text(p)?;
            raw_chars += text.chars().count();
            raw_text.push_str(&text);
            if raw_chars >= combine {
                chunks.push(encoder.encode(&raw_text)?);
                raw_text.clear();
                raw_chars = 0;
            } else {
                raw_text.push_str(END_OF_TEXT);
                raw_chars += END_OF_TEXT.chars().count();
            }
        }
        pb.inc(1);
    }
    if !raw_text.is_empty() {
        chunks.push(encoder.encode(&raw_text)?);
    }
    pb.finish_and_clear();

    let store = ChunkStore::new(chunks);
    tracing::info!(
        files = paths.len(),
        chunks = store.num_chunks(),
        tokens = store.total_tokens(),
        "Loaded dataset"
    );
    Ok(store)
}

/// A QnA record that was skipped during loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub path: PathBuf,
    /// Zero-based position among the file's non-empty records.
    pub index: usize,
    pub lines: usize,
}

impl From<SkippedRecord> for DataError {
    fn from(r: SkippedRecord) -> Self {
        DataError::MalformedRecord {
            path: r.path,
            index: r.index,
            lines: r.lines,
        }
    }
}

/// Result of [`load_qna_dataset`].
#[derive(Debug, Clone, Default)]
pub struct QnaDataset {
    pub store: ChunkStore,
    pub skipped: Vec<SkippedRecord>,
}

impl QnaDataset {
    /// Skipped records as [`DataError::MalformedRecord`] values, for reporting.
    pub fn skipped_errors(&self) -> impl Iterator<Item = DataError> + '_ {
        self.skipped.iter().cloned().map(DataError::from)
    }
}

/// Encode one question/answer pair into a chunk of at most `length` tokens
/// (more only when the answer alone exceeds it).
///
/// The answer is encoded with a leading newline and never truncated; the
/// question keeps its first `length - answer_len` tokens, or none.
pub fn encode_qna_pair<E: Encoder + ?Sized>(
    encoder: &E,
    question: &str,
    answer: &str,
    length: usize,
) -> Result<Vec<u32>> {
    let mut chunk = encoder.encode(question)?;
    let answer = encoder.encode(&format!("\n{answer}"))?;
    chunk.truncate(length.saturating_sub(answer.len()));
    chunk.extend(answer);
    Ok(chunk)
}

/// Build a chunk store of question/answer pairs.
///
/// Each file is split on blank lines; every record must be exactly a question
/// line followed by an answer line. Malformed records are logged, recorded in
/// [`QnaDataset::skipped`], and skipped. Pre-encoded archives are rejected with
/// [`DataError::UnsupportedFormat`].
pub fn load_qna_dataset<E: Encoder + ?Sized>(
    encoder: &E,
    path: &Path,
    length: usize,
    progress: bool,
) -> Result<QnaDataset> {
    let paths = resolve_paths(path)?;
    let pb = progress_bar(paths.len(), progress);

    let mut chunks = Vec::new();
    let mut skipped = Vec::new();
    for p in &paths {
        if ArchiveKind::from_path(p).is_some() {
            return Err(DataError::UnsupportedFormat {
                path: p.clone(),
                reason: "pre-encoded archives are not supported for qna".into(),
            });
        }
        let raw_text = read_text(p)?;
        for (index, record) in raw_text
            .split("\n\n")
            .map(|r| r.trim_end_matches('\n'))
            .filter(|r| !r.is_empty())
            .enumerate()
        {
            let lines: Vec<&str> = record.split('\n').collect();
            match lines.as_slice() {
                [question, answer] => {
                    chunks.push(encode_qna_pair(encoder, question, answer, length)?);
                }
                _ => {
                    let rec = SkippedRecord {
                        path: p.clone(),
                        index,
                        lines: lines.len(),
                    };
                    tracing::warn!(
                        path = %p.display(),
                        record = index,
                        lines = lines.len(),
                        "skipping malformed qna record"
                    );
                    skipped.push(rec);
                }
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let store = ChunkStore::new(chunks);
    tracing::info!(
        files = paths.len(),
        pairs = store.num_chunks(),
        skipped = skipped.len(),
        tokens = store.total_tokens(),
        "Loaded qna dataset"
    );
    Ok(QnaDataset { store, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{write_npz, write_tokenized_file};
    use crate::encoder::ByteEncoder;
    use std::fs;

    /// One token per character, so lengths are easy to reason about.
    struct CharEncoder;

    impl Encoder for CharEncoder {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            Ok(text.chars().map(u32::from).collect())
        }
    }

    /// Fixed-length encodings keyed on the first character: `q` → 50 tokens,
    /// `\n` (answers) → 10 tokens.
    struct LenEncoder;

    impl Encoder for LenEncoder {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            let (base, n) = if text.starts_with('\n') { (1000, 10) } else { (0, 50) };
            Ok((0..n).map(|i| base + i).collect())
        }
    }

    #[test]
    fn boundary_table_invariant() {
        let store =
            ChunkStore::new(vec![vec![1, 2, 3, 4, 5], vec![], vec![6, 7], vec![8, 9, 10, 11]]);
        let b = store.boundaries();
        assert_eq!(b[0], 0);
        assert_eq!(b.len(), store.num_chunks() + 1);
        for i in 0..store.num_chunks() {
            assert_eq!(b[i + 1] - b[i], store.chunk(i).len());
        }
        assert_eq!(store.total_tokens(), 11);
    }

    #[test]
    fn empty_store() {
        let store = ChunkStore::new(Vec::new());
        assert!(store.is_empty());
        assert_eq!(store.boundaries(), &[0]);
        assert_eq!(store.total_tokens(), 0);
        assert_eq!(store.locate(0), None);
        assert_eq!(store.stats().max_fair_length, 0);
    }

    #[test]
    fn locate_skips_empty_chunks() {
        let store = ChunkStore::new(vec![vec![1, 2], vec![], vec![3], vec![4, 5]]);
        assert_eq!(store.locate(0), Some(0));
        assert_eq!(store.locate(1), Some(0));
        assert_eq!(store.locate(2), Some(2));
        assert_eq!(store.locate(3), Some(3));
        assert_eq!(store.locate(4), Some(3));
        assert_eq!(store.locate(5), None);
    }

    #[test]
    fn stats_summary() {
        let store = ChunkStore::new(vec![vec![1, 2, 3, 4, 5], vec![6, 7], vec![8, 9, 10, 11]]);
        let s = store.stats();
        assert_eq!(s.num_chunks, 3);
        assert_eq!(s.total_tokens, 11);
        assert_eq!(s.min_chunk, 2);
        assert_eq!(s.max_chunk, 5);
        assert_eq!(s.max_fair_length, 2);
    }

    #[test]
    fn small_text_files_are_combined_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        fs::write(dir.path().join("b.txt"), "world").unwrap();

        let store = load_dataset(&CharEncoder, dir.path(), 1_000, false).unwrap();
        assert_eq!(store.num_chunks(), 1);
        let text: String = store
            .chunk(0)
            .iter()
            .map(|&c| char::from_u32(c).unwrap())
            .collect();
        assert_eq!(text, "hello<|endoftext|>world<|endoftext|>");
    }

    #[test]
    fn buffer_flushes_at_combine_threshold() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "0123456789").unwrap();
        fs::write(dir.path().join("b.txt"), "ab").unwrap();
        fs::write(dir.path().join("c.txt"), "cd").unwrap();

        // "a" alone reaches 10 and is flushed without a marker; "b" plus its
        // marker stays pending until "c" pushes the buffer past 10.
        let store = load_dataset(&CharEncoder, dir.path(), 10, false).unwrap();
        assert_eq!(store.num_chunks(), 2);
        assert_eq!(store.chunk(0).len(), 10);
        let tail: String = store
            .chunk(1)
            .iter()
            .map(|&c| char::from_u32(c).unwrap())
            .collect();
        assert_eq!(tail, "ab<|endoftext|>cd");
    }

    #[test]
    fn combine_counts_characters_not_bytes() {
        let dir = tempfile::tempdir().unwrap();
        // 3 characters, 6 bytes.
        fs::write(dir.path().join("a.txt"), "ééé").unwrap();
        let store = load_dataset(&ByteEncoder, dir.path(), 4, false).unwrap();
        // Not flushed at 3 chars, so the marker follows.
        assert_eq!(store.total_tokens(), 6 + END_OF_TEXT.len());
    }

    #[test]
    fn archives_keep_their_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_npz(&dir.path().join("a.npz"), &[vec![1, 2, 3], vec![4]]).unwrap();
        write_tokenized_file(&dir.path().join("b.tokens"), &[5, 6]).unwrap();
        fs::write(dir.path().join("c.txt"), "xy").unwrap();

        let store = load_dataset(&CharEncoder, dir.path(), 1, false).unwrap();
        assert_eq!(
            store.chunks(),
            &[vec![1, 2, 3], vec![4], vec![5, 6], vec![u32::from('x'), u32::from('y')]]
        );
    }

    #[test]
    fn missing_glob_gives_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = load_dataset(&CharEncoder, &dir.path().join("*.txt"), 10, false).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn qna_truncates_question_keeps_answer() {
        let chunk = encode_qna_pair(&LenEncoder, "q", "a", 20).unwrap();
        assert_eq!(chunk.len(), 20);
        assert_eq!(&chunk[..10], &(0..10).collect::<Vec<u32>>()[..]);
        assert_eq!(&chunk[10..], &(1000..1010).collect::<Vec<u32>>()[..]);
    }

    #[test]
    fn qna_answer_longer_than_length_drops_question() {
        let chunk = encode_qna_pair(&LenEncoder, "q", "a", 5).unwrap();
        assert_eq!(chunk, (1000..1010).collect::<Vec<u32>>());
    }

    #[test]
    fn qna_file_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.txt");
        fs::write(&path, "what?\nthat\n\nwhy?\nbecause\n").unwrap();

        let qna = load_qna_dataset(&CharEncoder, &path, 100, false).unwrap();
        assert!(qna.skipped.is_empty());
        assert_eq!(qna.store.num_chunks(), 2);
        let first: String = qna
            .store
            .chunk(0)
            .iter()
            .map(|&c| char::from_u32(c).unwrap())
            .collect();
        assert_eq!(first, "what?\nthat");
    }

    #[test]
    fn qna_malformed_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.txt");
        fs::write(&path, "q1\na1\n\njust one line\n\nq3\na3\nextra\n\nq4\na4").unwrap();

        let qna = load_qna_dataset(&CharEncoder, &path, 100, false).unwrap();
        assert_eq!(qna.store.num_chunks(), 2);
        assert_eq!(qna.skipped.len(), 2);
        assert_eq!(qna.skipped[0].index, 1);
        assert_eq!(qna.skipped[0].lines, 1);
        assert_eq!(qna.skipped[1].index, 2);
        assert_eq!(qna.skipped[1].lines, 3);

        let err: DataError = qna.skipped[0].clone().into();
        assert!(matches!(err, DataError::MalformedRecord { index: 1, .. }));
    }

    #[test]
    fn qna_crlf_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.txt");
        fs::write(&path, "q1\r\na1\r\n\r\nq2\r\na2\r\n").unwrap();

        let qna = load_qna_dataset(&CharEncoder, &path, 100, false).unwrap();
        assert!(qna.skipped.is_empty(), "{:?}", qna.skipped);
        assert_eq!(qna.store.num_chunks(), 2);
        let second: String = qna
            .store
            .chunk(1)
            .iter()
            .map(|&c| char::from_u32(c).unwrap())
            .collect();
        assert_eq!(second, "q2\na2");
    }

    #[test]
    fn qna_trailing_blank_lines_are_not_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.txt");
        fs::write(&path, "q1\na1\n\n\n").unwrap();

        let qna = load_qna_dataset(&CharEncoder, &path, 100, false).unwrap();
        assert_eq!(qna.store.num_chunks(), 1);
        assert!(qna.skipped.is_empty(), "{:?}", qna.skipped);
    }

    #[test]
    fn skipped_records_report_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.txt");
        fs::write(&path, "q1\na1\n\nlonely\n").unwrap();

        let qna = load_qna_dataset(&CharEncoder, &path, 100, false).unwrap();
        let errors: Vec<DataError> = qna.skipped_errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            DataError::MalformedRecord { index: 1, lines: 1, .. }
        ));
        assert!(errors[0].to_string().contains("expected 2 lines, found 1"));
    }

    #[test]
    fn crlf_text_counts_like_lf() {
        let dir = tempfile::tempdir().unwrap();
        // 4 characters once normalised, so combine = 4 flushes without a marker.
        fs::write(dir.path().join("a.txt"), "a\r\nb\r\n").unwrap();
        let store = load_dataset(&CharEncoder, dir.path(), 4, false).unwrap();
        let text: String = store
            .chunk(0)
            .iter()
            .map(|&c| char::from_u32(c).unwrap())
            .collect();
        assert_eq!(text, "a\nb\n");
    }

    #[test]
    fn qna_rejects_archives() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "q\na").unwrap();
        write_npz(&dir.path().join("b.npz"), &[vec![1]]).unwrap();

        let err = load_qna_dataset(&CharEncoder, dir.path(), 10, false).unwrap_err();
        assert!(matches!(err, DataError::UnsupportedFormat { .. }));
    }
}
