//! # shardtree
//!
//! Command-line front end for the shardtree commitment pipeline.
//!
//! ```text
//! shardtree fingerprint photo.jpg              # metadata line + shard line
//! cat photo.jpg | shardtree fingerprint - -s 4K
//! shardtree verify photo.meta photo.jpg        # exit 1 on mismatch
//! shardtree split log.txt --lines 1000 --dir parts
//! ```
//!
//! `fingerprint` prints two lines, each a standalone JSON document:
//!
//! ```text
//! {"n":"blob","l":["<leaf>", ...],"r":"<root>","s":<length>}
//! ["<hex shard>", ...]
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use shardtree_dag::{Dag, DagBuilder, Metadata, Sha256Hasher, DEFAULT_NAME};
use shardtree_split::{write_shards, FileNaming, SplitOptions, Splitter};
use tracing::{debug, info};

/// Shard size used by the tool when none is given.
const DEFAULT_CLI_SLICE_SIZE: &str = "512";

/// Input path meaning "read standard input".
const STDIN_MARKER: &str = "-";

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "shardtree")]
#[command(about = "Deterministic shard-and-Merkle fingerprints for byte streams")]
#[command(version)]
struct Cli {
    /// Log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the metadata record and hex shards for a file or stdin
    Fingerprint {
        /// File to read, or "-" for stdin
        #[arg(default_value = STDIN_MARKER)]
        input: String,

        /// Shard size in bytes, e.g. 512, 4K, 4M
        #[arg(short, long, default_value = DEFAULT_CLI_SLICE_SIZE)]
        size: String,

        /// Name recorded in the metadata
        #[arg(short, long, default_value = DEFAULT_NAME)]
        name: String,

        /// Pad with random bytes instead of zeros (not reproducible)
        #[arg(long)]
        random: bool,
    },
    /// Check a file or stdin against a stored metadata record
    Verify {
        /// File holding the metadata record (first line is used)
        metadata: PathBuf,

        /// File to read, or "-" for stdin
        #[arg(default_value = STDIN_MARKER)]
        input: String,

        /// Shard size the record was produced with
        #[arg(short, long, default_value = DEFAULT_CLI_SLICE_SIZE)]
        size: String,
    },
    /// Split a file or stdin into shard files
    Split {
        /// File to read, or "-" for stdin
        #[arg(default_value = STDIN_MARKER)]
        input: String,

        /// Lines per shard
        #[arg(short, long)]
        lines: Option<String>,

        /// Bytes per shard
        #[arg(short, long)]
        bytes: Option<String>,

        /// Split lines, then cut each line into pieces of at most this size
        #[arg(short = 'C', long)]
        line_bytes: Option<String>,

        /// Output file name prefix
        #[arg(long, default_value = "x")]
        prefix: String,

        /// Width of the generated suffix
        #[arg(short = 'a', long, default_value_t = 2)]
        suffix_length: usize,

        /// Use numeric suffixes instead of alphabetic
        #[arg(short = 'd', long)]
        numeric: bool,

        /// Output directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

// ─── Helpers ───────────────────────────────────────────────────────────────

fn setup_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_input(input: &str) -> Result<Vec<u8>> {
    if input == STDIN_MARKER {
        let mut buffer = Vec::new();
        io::stdin()
            .read_to_end(&mut buffer)
            .context("failed to read standard input")?;
        debug!(bytes = buffer.len(), "read stdin");
        Ok(buffer)
    } else {
        let buffer = fs::read(input).with_context(|| format!("failed to read {}", input))?;
        debug!(path = input, bytes = buffer.len(), "read file");
        Ok(buffer)
    }
}

/// The two output lines of `fingerprint`.
fn render_fingerprint(dag: &Dag, name: &str) -> Result<(String, String)> {
    let metadata = dag.to_metadata(Some(name)).to_json()?;
    let shards = serde_json::to_string(&dag.shards_hex())?;
    Ok((metadata, shards))
}

/// Parse a metadata record from the first non-blank line of `text`, so the
/// full output of `fingerprint` can be fed back in.
fn parse_metadata(text: &str) -> Result<Metadata> {
    let line = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .context("metadata file is empty")?;
    Ok(Metadata::from_json(line.trim())?)
}

fn load_metadata(path: &Path) -> Result<Metadata> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_metadata(&text).with_context(|| format!("invalid metadata in {}", path.display()))
}

// ─── Commands ──────────────────────────────────────────────────────────────

fn run_fingerprint(input: &str, size: &str, name: &str, random: bool) -> Result<()> {
    let buffer = read_input(input)?;
    let dag = DagBuilder::new()
        .with_slice_size(size)
        .with_random_fill(random)
        .build(&buffer)
        .context("failed to fingerprint input")?;

    let (metadata, shards) = render_fingerprint(&dag, name)?;
    println!("{}", metadata);
    println!("{}", shards);
    Ok(())
}

fn run_verify(metadata: &Path, input: &str, size: &str) -> Result<ExitCode> {
    let expected = load_metadata(metadata)?;
    if !expected.recompute_root(&Sha256Hasher)? {
        eprintln!(
            "{} {}",
            "✗".bright_red(),
            "record is inconsistent: leaves do not fold to the stored root".red()
        );
        return Ok(ExitCode::FAILURE);
    }

    let buffer = read_input(input)?;
    let dag = DagBuilder::new()
        .with_slice_size(size)
        .build(&buffer)
        .context("failed to fingerprint input")?;

    if expected.matches(&dag) {
        println!(
            "{} {} {}",
            "✓".bright_green(),
            expected.name.bold(),
            dag.root().to_string().dimmed()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{} {} expected {} got {}",
            "✗".bright_red(),
            expected.name.bold(),
            expected.root.to_lowercase().yellow(),
            dag.root().to_string().yellow()
        );
        Ok(ExitCode::FAILURE)
    }
}

fn run_split(input: &str, options: SplitOptions, naming: FileNaming, dir: &Path) -> Result<()> {
    let splitter = Splitter::new(&options)?;
    let buffer = read_input(input)?;
    let shards = splitter.split(&buffer);

    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let paths = write_shards(&shards, dir, &naming)?;
    info!(files = paths.len(), mode = ?splitter.mode(), "split complete");

    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    match cli.command {
        Commands::Fingerprint {
            input,
            size,
            name,
            random,
        } => run_fingerprint(&input, &size, &name, random).map(|_| ExitCode::SUCCESS),
        Commands::Verify {
            metadata,
            input,
            size,
        } => run_verify(&metadata, &input, &size),
        Commands::Split {
            input,
            lines,
            bytes,
            line_bytes,
            prefix,
            suffix_length,
            numeric,
            dir,
        } => {
            let options = SplitOptions {
                lines,
                bytes,
                line_bytes,
            };
            let naming = FileNaming {
                prefix,
                suffix_len: suffix_length,
                numeric,
            };
            run_split(&input, options, naming, &dir).map(|_| ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn golden_dag() -> Dag {
        let buffer: Vec<u8> = (0u16..10).flat_map(|i| (i * 0x10).to_be_bytes()).collect();
        DagBuilder::new().with_slice_size(2).build(&buffer).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fingerprint_defaults() {
        let cli = Cli::try_parse_from(["shardtree", "fingerprint"]).unwrap();
        match cli.command {
            Commands::Fingerprint {
                input,
                size,
                name,
                random,
            } => {
                assert_eq!(input, "-");
                assert_eq!(size, "512");
                assert_eq!(name, "blob");
                assert!(!random);
            }
            _ => panic!("expected fingerprint"),
        }
    }

    #[test]
    fn test_render_fingerprint_lines_are_json() {
        let (metadata, shards) = render_fingerprint(&golden_dag(), "blob").unwrap();

        let record: serde_json::Value = serde_json::from_str(&metadata).unwrap();
        assert_eq!(record["n"], "blob");
        assert_eq!(record["s"], 20);
        assert_eq!(
            record["r"],
            "08541c3238e4be60e2b8f049deee8b0bd2c91829c3b4f47f1b703bd4d48d2ff3"
        );

        let shards: Vec<String> = serde_json::from_str(&shards).unwrap();
        assert_eq!(shards.len(), 10);
        assert_eq!(shards[0], "0000");
        assert_eq!(shards[9], "0090");
    }

    #[test]
    fn test_parse_metadata_accepts_fingerprint_output() {
        let dag = golden_dag();
        let (metadata, shards) = render_fingerprint(&dag, "golden").unwrap();
        let text = format!("\n{}\n{}\n", metadata, shards);

        let parsed = parse_metadata(&text).unwrap();
        assert_eq!(parsed.name, "golden");
        assert!(parsed.matches(&dag));
    }

    #[test]
    fn test_parse_metadata_rejects_empty() {
        assert!(parse_metadata("  \n\n").is_err());
    }

    #[test]
    fn test_read_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.bin");
        fs::write(&path, b"file contents").unwrap();
        assert_eq!(
            read_input(path.to_str().unwrap()).unwrap(),
            b"file contents".to_vec()
        );
        assert!(read_input(dir.path().join("missing").to_str().unwrap()).is_err());
    }

    #[test]
    fn test_verify_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.txt");
        fs::write(&input, b"verify me please").unwrap();

        let dag = DagBuilder::new()
            .with_slice_size(4)
            .build(b"verify me please")
            .unwrap();
        let (metadata, _) = render_fingerprint(&dag, "data").unwrap();
        let meta_path = dir.path().join("data.meta");
        fs::write(&meta_path, metadata).unwrap();

        let input = input.to_str().unwrap();
        assert_eq!(
            run_verify(&meta_path, input, "4").unwrap(),
            ExitCode::SUCCESS
        );
        assert_eq!(
            run_verify(&meta_path, input, "8").unwrap(),
            ExitCode::FAILURE
        );
    }

    #[test]
    fn test_split_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("lines.txt");
        fs::write(&input, b"a\nb\nc\n").unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        run_split(
            input.to_str().unwrap(),
            SplitOptions::lines("2"),
            FileNaming::default(),
            &out,
        )
        .unwrap();

        assert_eq!(fs::read(out.join("xaa")).unwrap(), b"a\nb\n");
        assert_eq!(fs::read(out.join("xab")).unwrap(), b"c\n");
    }

    #[test]
    fn test_split_rejects_conflicting_modes() {
        let options = SplitOptions {
            lines: Some("1".into()),
            bytes: Some("1".into()),
            line_bytes: None,
        };
        let dir = tempfile::tempdir().unwrap();
        assert!(run_split("-", options, FileNaming::default(), dir.path()).is_err());
    }
}
