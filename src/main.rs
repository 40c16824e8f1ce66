use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use recipe_etl::{DirectorySink, DocumentSink, FirestoreSink, RecipeETL, FIRESTORE_ENDPOINT};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "recipe-etl", version, about = "Recipe dataset pipeline: ingest, enrich, refine, upload")]
struct Cli {
    /// Directory all default inputs/outputs live under
    #[arg(long, global = true, default_value = ".")]
    work_dir: PathBuf,
    /// Disable progress bars
    #[arg(long, global = true, default_value_t = false)]
    no_progress: bool,
    /// Worker threads (default: all cores)
    #[arg(long, global = true)]
    parallelism: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Merge CSV exports into one deduplicated JSON array
    Ingest(IngestArgs),
    /// Crawl detail pages, checkpointing into numbered segment files
    Enrich(EnrichArgs),
    /// Clean, filter and sample segments into two equal partitions
    Refine(RefineArgs),
    /// Upload partitions to a document store with resumable offsets
    Upload(UploadArgs),
    /// Ingest, enrich and refine in sequence
    Run {
        #[command(flatten)]
        ingest: IngestArgs,
        #[command(flatten)]
        enrich: EnrichArgs,
        #[command(flatten)]
        refine: RefineArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct IngestArgs {
    /// CSV export files, first file wins on duplicate ids
    #[arg(long = "csv", value_name = "FILE", num_args = 1..)]
    csv: Vec<PathBuf>,
    /// Normalized JSON output (default: <work-dir>/all_recipes_for_firestore.json)
    #[arg(long)]
    normalized_json: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct EnrichArgs {
    /// Segment directory (default: <work-dir>/crawling_checkpoints)
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,
    /// Records per segment file
    #[arg(long)]
    checkpoint_interval: Option<usize>,
    /// Minimum delay between requests, in milliseconds
    #[arg(long)]
    delay_min_ms: Option<u64>,
    /// Maximum delay between requests, in milliseconds
    #[arg(long)]
    delay_max_ms: Option<u64>,
    /// Detail page base URL; the record id is appended
    #[arg(long)]
    detail_url_base: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct RefineArgs {
    /// Directory for final_recipes_part{1,2}.json (default: <work-dir>)
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Total records across both partitions (must be even)
    #[arg(long)]
    target_total: Option<usize>,
    /// Shuffle seed for the balanced phase
    #[arg(long)]
    seed: Option<u64>,
    /// Share of target_total taken by popularity
    #[arg(long)]
    popular_ratio: Option<f64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum SinkKind {
    Firestore,
    Dir,
}

#[derive(Args, Debug, Clone)]
struct UploadArgs {
    /// Files to upload (default: the two refine partitions)
    #[arg(long = "file", value_name = "FILE")]
    files: Vec<PathBuf>,
    /// Directory holding the refine partitions (default: <work-dir>)
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Offset checkpoint file (default: <work-dir>/upload_checkpoint.json)
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    #[arg(long, default_value = "recipes")]
    collection: String,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Retries after the first failed attempt
    #[arg(long)]
    max_retries: Option<usize>,
    /// Seconds to wait between attempts
    #[arg(long)]
    retry_delay_secs: Option<u64>,
    #[arg(long, value_enum, default_value_t = SinkKind::Firestore)]
    sink: SinkKind,
    #[arg(long, env = "FIRESTORE_PROJECT_ID")]
    project: Option<String>,
    #[arg(long, env = "FIRESTORE_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Firestore REST root, e.g. a local emulator
    #[arg(long, default_value = FIRESTORE_ENDPOINT)]
    firestore_endpoint: String,
    #[arg(long, default_value = "(default)")]
    database: String,
    /// Root directory for `--sink dir`
    #[arg(long)]
    dir: Option<PathBuf>,
}

fn apply_ingest(mut etl: RecipeETL, args: &IngestArgs) -> RecipeETL {
    etl = etl.csv_inputs(&args.csv);
    if let Some(p) = &args.normalized_json {
        etl = etl.normalized_json(p);
    }
    etl
}

fn apply_enrich(mut etl: RecipeETL, args: &EnrichArgs) -> RecipeETL {
    if let Some(d) = &args.checkpoint_dir {
        etl = etl.checkpoint_dir(d);
    }
    let mut cfg = etl.options().enrich.clone();
    if let Some(n) = args.checkpoint_interval {
        cfg.checkpoint_interval = n;
    }
    if let Some(ms) = args.delay_min_ms {
        cfg.delay_min_ms = ms;
    }
    if let Some(ms) = args.delay_max_ms {
        cfg.delay_max_ms = ms;
    }
    if let Some(base) = &args.detail_url_base {
        cfg.detail_url_base = base.clone();
    }
    etl.enrich_cfg(cfg)
}

fn apply_refine(mut etl: RecipeETL, args: &RefineArgs) -> RecipeETL {
    if let Some(d) = &args.output_dir {
        etl = etl.output_dir(d);
    }
    let mut cfg = etl.options().refine.clone();
    if let Some(n) = args.target_total {
        cfg.target_total = n;
    }
    if let Some(s) = args.seed {
        cfg.seed = s;
    }
    if let Some(r) = args.popular_ratio {
        cfg.popular_ratio = r;
    }
    etl.refine_cfg(cfg)
}

fn apply_upload(mut etl: RecipeETL, args: &UploadArgs) -> RecipeETL {
    if let Some(d) = &args.output_dir {
        etl = etl.output_dir(d);
    }
    if !args.files.is_empty() {
        etl = etl.output_files(&args.files);
    }
    if let Some(c) = &args.checkpoint {
        etl = etl.upload_checkpoint(c);
    }
    let mut cfg = etl.options().upload.clone();
    cfg.collection = args.collection.clone();
    if let Some(n) = args.batch_size {
        cfg.batch_size = n;
    }
    if let Some(n) = args.max_retries {
        cfg.max_retries = n;
    }
    if let Some(s) = args.retry_delay_secs {
        cfg.retry_delay = Duration::from_secs(s);
    }
    etl.upload_cfg(cfg)
}

fn build_sink(args: &UploadArgs, work_dir: &Path) -> Result<Box<dyn DocumentSink>> {
    match args.sink {
        SinkKind::Firestore => {
            let (Some(project), Some(token)) = (&args.project, &args.token) else {
                bail!("--sink firestore needs --project/FIRESTORE_PROJECT_ID and --token/FIRESTORE_TOKEN");
            };
            let sink = FirestoreSink::new(project.clone(), token.clone())
                .context("create Firestore sink")?
                .with_endpoint(&args.firestore_endpoint)
                .with_database(&args.database);
            Ok(Box::new(sink))
        }
        SinkKind::Dir => {
            let root = args.dir.clone().unwrap_or_else(|| work_dir.join("upload_mirror"));
            Ok(Box::new(DirectorySink::new(root)))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut base = RecipeETL::new().work_dir(&cli.work_dir).progress(!cli.no_progress);
    if let Some(n) = cli.parallelism {
        base = base.parallelism(n);
    }

    match &cli.command {
        Commands::Ingest(args) => {
            let report = apply_ingest(base, args).ingest()?;
            println!(
                "ingest: {} rows from {} files, {} duplicates, {} written to {}",
                report.rows_read,
                report.files,
                report.duplicates,
                report.written,
                report.output.display()
            );
        }
        Commands::Enrich(args) => {
            let report = apply_enrich(base, args).enrich()?;
            println!(
                "enrich: {} processed ({} already done), {} fetched, {} failed, {} segments",
                report.processed, report.already_processed, report.fetched, report.failed, report.segments_written
            );
        }
        Commands::Refine(args) => {
            let report = apply_refine(base, args).refine()?;
            println!(
                "refine: {} loaded, {} kept, {} written",
                report.records_loaded, report.records_kept, report.written
            );
        }
        Commands::Upload(args) => {
            let sink = build_sink(args, &cli.work_dir)?;
            let report = apply_upload(base, args).upload(sink.as_ref())?;
            for f in &report.files {
                println!(
                    "{}: {}/{} committed, {} batch(es) failed",
                    f.file.display(),
                    f.committed_offset,
                    f.total,
                    f.batches_failed
                );
            }
            if report.batches_failed() > 0 {
                bail!("{} batch(es) failed; rerun to resume from the checkpoint", report.batches_failed());
            }
        }
        Commands::Run { ingest, enrich, refine } => {
            let etl = apply_refine(apply_enrich(apply_ingest(base, ingest), enrich), refine);
            etl.ingest()?;
            etl.enrich()?;
            let report = etl.refine()?;
            println!("run: {} records written to {:?}", report.written, report.outputs);
        }
    }
    Ok(())
}
