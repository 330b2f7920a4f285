//! `cellcover` - track Midjourney jobs made through the TTAPI proxy.

use std::path::PathBuf;
use std::process::ExitCode;

use cellcover::config::{default_config_path, load_config_or_default};
use cellcover::metadata::{trace, JobRecord, JobStatus, MetadataIndex};
use cellcover::{
    fetch_remote_jobs, normalize_all, restore_from_remote, sync, AppConfig, BlendDimensions,
    BlendParams, CellCoverError, ImageStorage, ImagineParams, JobRunner, MetadataStore,
    NormalizeOptions, RestoreOptions, StateFiles, TtapiClient,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cellcover", version, about, long_about = None)]
struct Cli {
    /// Path to the JSON config file (default: ~/.crc/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a new prompt and save the resulting image
    Imagine {
        prompt: String,
        #[arg(long)]
        concept: Option<String>,
        /// Comma-separated variation tags
        #[arg(long)]
        variations: Option<String>,
        /// Comma-separated global style tags
        #[arg(long)]
        styles: Option<String>,
    },

    /// Combine 2 to 5 local images into a new image
    Blend {
        #[arg(required = true, num_args = 2..=5)]
        images: Vec<PathBuf>,
        /// portrait, square or landscape
        #[arg(long)]
        dimensions: Option<BlendDimensions>,
    },

    /// Apply an action (upsample1, variation2, ...) to an existing job
    Action {
        /// Job id, 6-character prefix or filename
        identifier: String,
        action_code: String,
    },

    /// Re-submit the root prompt of an existing job
    Recreate { identifier: String },

    /// Show the stored record for a job
    Find { identifier: String },

    /// Show the lineage of a job from its root
    Trace { identifier: String },

    /// List stored records
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        concept: Option<String>,
    },

    /// Reconcile unfinished records with the vendor
    Sync,

    /// Add jobs from the vendor's history that are missing locally
    Restore {
        #[arg(long, default_value_t = 1)]
        pages: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Look up jobs whose listing has no image URL
        #[arg(long)]
        fetch_details: bool,
        /// Only record metadata; skip image downloads
        #[arg(long)]
        no_download: bool,
    },

    /// Rewrite every record into canonical form
    Normalize {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        backup: bool,
    },

    /// Delete a record from the metadata file
    Remove { identifier: String },
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        tracing::subscriber::set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        tracing::subscriber::set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            ),
        )
    };

    if let Err(e) = installed {
        eprintln!("cellcover: failed to install log subscriber: {}", e);
    }
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("cellcover: failed to bridge log records: {}", e);
    }
}

/// Components built from the loaded config.
struct App {
    config: AppConfig,
    store: MetadataStore,
    images: ImageStorage,
    state: StateFiles,
}

impl App {
    fn load(config_path: Option<PathBuf>) -> cellcover::Result<Self> {
        let path = match config_path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let config = load_config_or_default(&path)?;
        log::debug!("Using config {:?}", path);

        Ok(Self {
            store: MetadataStore::new(config.metadata_path()),
            images: ImageStorage::new(config.image_path()),
            state: StateFiles::new(config.state_path()),
            config,
        })
    }

    fn vendor(&self) -> cellcover::Result<TtapiClient> {
        let api_key = self.config.api_key.resolve()?;
        Ok(TtapiClient::new(&self.config.vendor, api_key)?)
    }

    fn find(&self, identifier: &str) -> cellcover::Result<JobRecord> {
        self.store.lookup(identifier)
    }
}

fn describe(record: &JobRecord) -> String {
    format!(
        "{:<18} {:<24} {}",
        record.status.as_ref().map(JobStatus::as_str).unwrap_or("-"),
        record.action.as_deref().unwrap_or("-"),
        record.filename.as_deref().unwrap_or("-"),
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> cellcover::Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CellCoverError::Store(cellcover::StoreError::Serialize(e)))?;
    println!("{}", text);
    Ok(())
}

fn run(cli: Cli) -> cellcover::Result<()> {
    let app = App::load(cli.config)?;

    match cli.command {
        Commands::Imagine {
            prompt,
            concept,
            variations,
            styles,
        } => {
            let vendor = app.vendor()?;
            let runner = JobRunner::new(&app.store, &vendor, &app.images, &app.state)
                .with_vendor_config(&app.config.vendor);
            let outcome = runner.imagine(ImagineParams {
                prompt,
                concept,
                variations,
                global_styles: styles,
            })?;
            println!("{}  {}", outcome.record.job_id, outcome.path.display());
        }
        Commands::Blend { images, dimensions } => {
            let vendor = app.vendor()?;
            let runner = JobRunner::new(&app.store, &vendor, &app.images, &app.state)
                .with_vendor_config(&app.config.vendor);
            let outcome = runner.blend(BlendParams { images, dimensions })?;
            println!("{}  {}", outcome.record.job_id, outcome.path.display());
        }
        Commands::Action {
            identifier,
            action_code,
        } => {
            let vendor = app.vendor()?;
            let runner = JobRunner::new(&app.store, &vendor, &app.images, &app.state)
                .with_vendor_config(&app.config.vendor);
            let outcome = runner.action(&identifier, &action_code)?;
            println!("{}  {}", outcome.record.job_id, outcome.path.display());
        }
        Commands::Recreate { identifier } => {
            let vendor = app.vendor()?;
            let runner = JobRunner::new(&app.store, &vendor, &app.images, &app.state)
                .with_vendor_config(&app.config.vendor);
            let outcome = runner.recreate(&identifier)?;
            println!("{}  {}", outcome.record.job_id, outcome.path.display());
        }
        Commands::Find { identifier } => {
            let record = app.find(&identifier)?;
            print_json(&record)?;
        }
        Commands::Trace { identifier } => {
            let record = app.find(&identifier)?;
            let records = app.store.records();
            let index = MetadataIndex::build(&records);
            let lineage = trace(&record.job_id, &index);

            for (depth, link) in lineage.chain.iter().enumerate() {
                println!("{}{}  {}", "  ".repeat(depth), link.job_id, describe(link));
            }
            if let Some(broken) = &lineage.broken {
                println!("(chain broken: {:?})", broken);
            }
        }
        Commands::List { status, concept } => {
            let wanted = status.as_deref().map(JobStatus::parse);
            let records = app.store.records();
            let shown = records
                .iter()
                .filter(|r| wanted.is_none() || r.status == wanted)
                .filter(|r| concept.is_none() || r.concept == concept);

            let mut count = 0;
            for record in shown {
                println!("{}  {}", record.job_id, describe(record));
                count += 1;
            }
            eprintln!("{} of {} records", count, records.len());
        }
        Commands::Sync => {
            let vendor = app.vendor()?;
            let report = sync(&app.store, &vendor, &app.images)?;
            print_json(&report)?;
        }
        Commands::Restore {
            pages,
            limit,
            fetch_details,
            no_download,
        } => {
            let vendor = app.vendor()?;
            let jobs = fetch_remote_jobs(&vendor, pages, limit)?;
            let report = restore_from_remote(
                &app.store,
                &vendor,
                &app.images,
                Some(&app.state),
                &jobs,
                RestoreOptions {
                    fetch_details,
                    download: !no_download,
                },
            )?;
            print_json(&report)?;
        }
        Commands::Normalize { dry_run, backup } => {
            let report = normalize_all(&app.store, NormalizeOptions { dry_run, backup })?;
            println!(
                "{} records, {} changed, {} skipped{}",
                report.total,
                report.changed,
                report.skipped,
                if report.saved { "" } else { " (not saved)" }
            );
        }
        Commands::Remove { identifier } => {
            let record = app.find(&identifier)?;
            if app.store.remove(&record.job_id)? {
                println!("Removed {}", record.job_id);
                if let Some(path) = &record.filepath {
                    println!("Image left in place: {}", path);
                }
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);
    tracing::debug!("cellcover v{}", env!("CARGO_PKG_VERSION"));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("cellcover: {}", e);
            ExitCode::FAILURE
        }
    }
}
