use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokenizers::Tokenizer;

use tokenfeed_common::{
    load_dataset, load_qna_dataset, load_tokenizer, write_npz, write_tokenized_file, AnySampler,
    ArchiveKind, ByteEncoder, ChunkSampler, ChunkStore, DatasetConfig, Encoder, SamplerKind,
};

#[derive(Parser, Debug)]
#[command(name = "tokenfeed", about = "Encode, inspect and sample token datasets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode text (and merge archives) into a reusable .npz or .tokens file.
    Encode(EncodeArgs),
    /// Print chunk statistics for a dataset.
    Stats(InputArgs),
    /// Draw samples and print them as JSON arrays (or text with --decode).
    Sample(SampleArgs),
}

// ── Shared input options ───────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct InputArgs {
    /// File, directory (walked recursively) or glob pattern.
    #[arg(long)]
    input: PathBuf,
    /// HuggingFace tokenizer.json; byte-level ids when omitted.
    #[arg(long)]
    tokenizer: Option<PathBuf>,
    /// Dataset config JSON. Created with defaults if it does not exist.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Characters of plain text to combine before encoding one chunk.
    #[arg(long)]
    combine: Option<usize>,
    /// Load blank-line separated question/answer pairs.
    #[arg(long)]
    qna: bool,
    /// Sample length; also the QnA truncation budget.
    #[arg(long)]
    length: Option<usize>,
    #[arg(long)]
    no_progress: bool,
}

#[derive(Parser, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Output path; `.npz` keeps chunk boundaries, `.tokens` is one flat chunk.
    #[arg(long)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct SampleArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long, value_parser = ["fair", "whole-chunk"])]
    sampler: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 1)]
    count: usize,
    /// Print decoded text instead of token ids.
    #[arg(long)]
    decode: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Encode(args) => cmd_encode(args),
        Command::Stats(args) => cmd_stats(args),
        Command::Sample(args) => cmd_sample(args),
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────────

fn resolve_config(args: &InputArgs) -> Result<DatasetConfig> {
    let mut config = match &args.config {
        Some(path) if path.exists() => DatasetConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        Some(path) => {
            let default = DatasetConfig::default();
            default.save(path)?;
            eprintln!("Created default config at {}", path.display());
            default
        }
        None => DatasetConfig::default(),
    };
    if let Some(combine) = args.combine {
        config.combine = combine;
    }
    if let Some(length) = args.length {
        config.length = length;
    }
    if args.qna {
        config.qna = true;
    }
    if args.no_progress {
        config.progress = false;
    }
    Ok(config)
}

fn load_encoder(path: Option<&Path>) -> Result<Option<Tokenizer>> {
    path.map(|p| load_tokenizer(p).with_context(|| format!("tokenizer {}", p.display())))
        .transpose()
}

fn load_store(
    args: &InputArgs,
    config: &DatasetConfig,
    tokenizer: Option<&Tokenizer>,
) -> Result<ChunkStore> {
    let encoder: &dyn Encoder = match tokenizer {
        Some(t) => t,
        None => &ByteEncoder,
    };
    if config.qna {
        let qna = load_qna_dataset(encoder, &args.input, config.length, config.progress)?;
        if !qna.skipped.is_empty() {
            eprintln!("Skipped {} malformed qna records:", qna.skipped.len());
            for err in qna.skipped_errors() {
                eprintln!("  {err}");
            }
        }
        Ok(qna.store)
    } else {
        Ok(load_dataset(
            encoder,
            &args.input,
            config.combine,
            config.progress,
        )?)
    }
}

fn decode(tokenizer: Option<&Tokenizer>, ids: &[u32]) -> Result<String> {
    match tokenizer {
        Some(t) => t
            .decode(ids, false)
            .map_err(|e| anyhow::anyhow!("decode: {e}")),
        None => decode_bytes(ids),
    }
}

/// Inverse of `ByteEncoder`; ids above 255 came from some other tokenizer.
fn decode_bytes(ids: &[u32]) -> Result<String> {
    let bytes = ids
        .iter()
        .map(|&id| {
            u8::try_from(id).map_err(|_| {
                anyhow::anyhow!("token id {id} is not a byte; pass --tokenizer to decode")
            })
        })
        .collect::<Result<Vec<u8>>>()?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ── Command implementations ────────────────────────────────────────────────────

fn cmd_encode(args: EncodeArgs) -> Result<()> {
    let config = resolve_config(&args.input)?;
    let tokenizer = load_encoder(args.input.tokenizer.as_deref())?;
    let store = load_store(&args.input, &config, tokenizer.as_ref())?;

    match ArchiveKind::from_path(&args.output) {
        Some(ArchiveKind::Npz) => write_npz(&args.output, store.chunks())?,
        Some(ArchiveKind::Tokens) => {
            if store.num_chunks() > 1 {
                tracing::warn!(
                    chunks = store.num_chunks(),
                    "flattening chunks into one .tokens sequence; boundaries are lost"
                );
            }
            write_tokenized_file(&args.output, &store.chunks().concat())?;
        }
        None => anyhow::bail!(
            "output must end in .npz or .tokens: {}",
            args.output.display()
        ),
    }
    eprintln!(
        "Wrote {} tokens ({} chunks) to {}",
        store.total_tokens(),
        store.num_chunks(),
        args.output.display()
    );
    Ok(())
}

fn cmd_stats(args: InputArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let tokenizer = load_encoder(args.tokenizer.as_deref())?;
    let store = load_store(&args, &config, tokenizer.as_ref())?;
    let s = store.stats();

    println!("chunks:          {}", s.num_chunks);
    println!("tokens:          {}", s.total_tokens);
    println!("min chunk:       {}", s.min_chunk);
    println!("max chunk:       {}", s.max_chunk);
    println!("mean chunk:      {:.1}", s.mean_chunk);
    println!("max fair length: {}", s.max_fair_length);
    Ok(())
}

fn cmd_sample(args: SampleArgs) -> Result<()> {
    let mut config = resolve_config(&args.input)?;
    if let Some(ref kind) = args.sampler {
        config.sampler = SamplerKind::from_str(kind);
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    let tokenizer = load_encoder(args.input.tokenizer.as_deref())?;
    let store = Arc::new(load_store(&args.input, &config, tokenizer.as_ref())?);

    let mut sampler = AnySampler::new(config.sampler, store, config.seed);
    for _ in 0..args.count {
        let ids = sampler.sample(config.length)?;
        if args.decode {
            println!("{}", decode(tokenizer.as_ref(), &ids)?);
        } else {
            println!("{}", serde_json::to_string(&ids)?);
        }
    }
    Ok(())
}
