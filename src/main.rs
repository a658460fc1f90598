use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::ProgressBar;
use minos::chunk::{self, DumpChunk};
use minos::config::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_WORKERS, DEFAULT_QUEUE_DEPTH};
use minos::coverage;
use minos::extract;
use minos::pipeline::{self, PipelineConfig};
use minos::store::SqliteStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "minos")]
#[command(about = "Stream Wikipedia dump chunks into a page store")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify coverage, then extract all chunks into the page store
    Ingest(IngestArgs),
    /// Check a dump directory for gapless page-id coverage
    Verify(VerifyArgs),
    /// Count articles per chunk without writing anything
    Scan(VerifyArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Directory containing the .xml-p<start>p<end>.bz2 chunk files
    #[arg(short, long)]
    data_dir: String,

    /// SQLite database file to load pages into
    #[arg(short = 'o', long)]
    database: String,

    /// Maximum concurrent extraction workers
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    max_workers: usize,

    /// Maximum queued page records before producers block
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH)]
    queue_depth: usize,

    /// Pages per store commit
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Directory for the duplicate-title log
    #[arg(long)]
    log_dir: Option<String>,

    /// Skip creating the title index after the load
    #[arg(long)]
    no_index: bool,
}

#[derive(Args)]
struct VerifyArgs {
    /// Directory containing the .xml-p<start>p<end>.bz2 chunk files
    #[arg(short, long)]
    data_dir: String,
}

fn run_ingest(args: IngestArgs) -> Result<()> {
    let start = Instant::now();
    let chunks = chunk::discover_chunks(Path::new(&args.data_dir))?;
    info!(chunks = chunks.len(), "discovered dump chunks");

    let mut store = SqliteStore::open(Path::new(&args.database))
        .with_context(|| format!("failed to open page store: {}", args.database))?;

    let config = PipelineConfig {
        max_workers: args.max_workers,
        queue_depth: args.queue_depth,
        batch_size: args.batch_size,
        log_dir: args.log_dir.map(PathBuf::from),
    };

    let report = pipeline::run(&chunks, &mut store, &config)?;

    if !args.no_index {
        store.create_indices()?;
    }

    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", start.elapsed().as_secs_f64());
    println!();
    for chunk in &report.per_chunk {
        println!(
            "p{}-p{}: {} pages, {} additions, {} duplicates, {} errors",
            chunk.start_id,
            chunk.end_id,
            chunk.counts.pages,
            chunk.counts.additions,
            chunk.counts.duplicates,
            chunk.counts.errors
        );
    }
    println!();
    println!("Pages seen:         {}", report.totals.pages);
    println!("Additions:          {}", report.totals.additions);
    println!("Duplicates:         {}", report.totals.duplicates);
    println!("Errors:             {}", report.totals.errors);

    Ok(())
}

fn run_verify(args: VerifyArgs) -> Result<()> {
    let chunks = chunk::discover_chunks(Path::new(&args.data_dir))?;
    println!("Found {} chunk files", chunks.len());

    let result = coverage::verify_coverage(&chunks)?;
    if result.contiguous {
        let last = result.last_valid_chunk.as_ref().map(DumpChunk::file_name);
        println!(
            "Coverage is gapless through {}",
            last.as_deref().unwrap_or("none")
        );
    } else {
        let last = result.last_valid_chunk.as_ref().map(DumpChunk::file_name);
        println!(
            "Coverage is broken; last valid chunk: {}",
            last.as_deref().unwrap_or("none")
        );
        anyhow::bail!("dump is not gapless");
    }
    Ok(())
}

fn run_scan(args: VerifyArgs) -> Result<()> {
    let chunks = chunk::discover_chunks(Path::new(&args.data_dir))?;
    println!("Found {} chunk files", chunks.len());

    let pb = ProgressBar::new_spinner();
    for chunk in &chunks {
        if !chunk.is_valid_chunk_file() {
            error!(chunk = %chunk.file_name(), "invalid chunk file, skipping");
            continue;
        }
        let (count, longest) = extract::scan_chunk(chunk)?;
        pb.tick();
        println!(
            "{}: {} articles, longest title: {}",
            chunk.file_name(),
            count,
            longest.as_deref().unwrap_or("(none)")
        );
    }
    pb.finish_and_clear();
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Ingest(args) => run_ingest(args),
        Commands::Verify(args) => run_verify(args),
        Commands::Scan(args) => run_scan(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
