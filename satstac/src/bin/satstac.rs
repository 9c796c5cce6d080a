use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Utc;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum as _};
use satstac::config::{UnrecognizedKeys, ignored_env_settings};
use satstac::env::{Env, OsEnv};
use satstac::logging::{LogFormat, init_tracing};
use satstac::pipeline::{CacheKeyContext, render_cache_key};
use satstac::s3::{Credentials, DEFAULT_REGION, sign_s3_url};
use satstac::{
    Collection, Config, Downloader, Pipeline, ValidationLevel, parse_date_label, read_config,
    text_calendar,
};
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Defines the styles used for the CLI help output.
const HELP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Blue.on_default().bold())
    .usage(AnsiColor::Blue.on_default().bold())
    .literal(AnsiColor::White.on_default())
    .placeholder(AnsiColor::Green.on_default());

#[derive(Parser, PartialEq, Debug)]
#[command(
    version,
    name = "satstac",
    about = "A utility to work with STAC collection records and the pipelines that publish them",
    after_help = "Use RUST_LOG environment variable to control logging level, e.g. RUST_LOG=debug or RUST_LOG=satstac=debug. Use SATSTAC_LOG_FORMAT or --log-format to change the log format.",
    styles = HELP_STYLES
)]
pub struct Args {
    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// How to format the logs. [DEFAULT: compact]
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, PartialEq, Debug)]
enum Commands {
    /// Show collection summary statistics
    #[command(name = "summary", alias = "info")]
    Summary { file: PathBuf },
    /// Validate a collection record, or every `*.json` record in a directory
    #[command(name = "validate", alias = "check")]
    Validate {
        /// Record file or directory to validate
        path: PathBuf,
        /// How thoroughly to check each record
        #[arg(long, value_enum, default_value_t = ValidationLevel::default())]
        level: ValidationLevel,
    },
    /// Get a single value by its dotted key, e.g. `properties.eo:platform`
    #[command(name = "meta-get", alias = "get-meta")]
    MetaGetValue {
        /// Collection record to read from
        file: PathBuf,
        /// Dotted key of the value
        key: String,
    },
    /// Print the whole record as YAML
    #[command(name = "meta-all")]
    MetaAll { file: PathBuf },
    /// List spectral bands and the assets that reference them
    #[command(name = "bands")]
    Bands { file: PathBuf },
    /// Inspect a CircleCI pipeline definition
    #[command(name = "pipeline", subcommand)]
    Pipeline(PipelineCommands),
    /// Download a file, signing S3 requests when AWS credentials are set
    #[command(name = "download")]
    Download {
        url: String,
        /// Output file. Defaults to the last URL path segment in the download directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a signed S3 request for a requester-pays bucket
    #[command(name = "sign-url")]
    SignUrl {
        url: String,
        /// AWS region of the bucket. Defaults to the config file value
        #[arg(long)]
        region: Option<String>,
    },
    /// Print a calendar highlighting labelled dates
    #[command(name = "calendar")]
    Calendar {
        /// Dates as `YYYY-MM-DD=LABEL`
        #[arg(required = true)]
        dates: Vec<String>,
        /// Months per row
        #[arg(long, default_value_t = 3)]
        cols: usize,
    },
}

#[derive(Subcommand, PartialEq, Debug)]
enum PipelineCommands {
    /// List the jobs that run on a branch, in execution order
    #[command(name = "plan")]
    Plan {
        file: PathBuf,
        #[arg(short, long)]
        branch: String,
        /// Only plan this workflow
        #[arg(short, long)]
        workflow: Option<String>,
    },
    /// Check job references and dependency cycles
    #[command(name = "check")]
    Check { file: PathBuf },
    /// List environment variables that job commands expect
    #[command(name = "env")]
    Env { file: PathBuf },
    /// Render a cache key template
    #[command(name = "cache-key")]
    CacheKey(CacheKeyArgs),
}

#[derive(ClapArgs, PartialEq, Debug)]
struct CacheKeyArgs {
    /// Template such as `v1-deps-{{ .Branch }}-{{ checksum "requirements.txt" }}`
    template: String,
    #[arg(short, long)]
    branch: String,
    #[arg(short, long, default_value = "")]
    revision: String,
    /// Directory that `checksum` file names are relative to
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let format = args.log_format.or_else(format_from_env).unwrap_or_default();
    if let Err(e) = init_tracing(env::var("RUST_LOG").ok().as_deref(), format) {
        eprintln!("Unable to initialize logging: {e}");
    }

    if let Err(err) = main_int(args).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn format_from_env() -> Option<LogFormat> {
    let value = env::var("SATSTAC_LOG_FORMAT").ok()?;
    LogFormat::from_str(&value, true)
        .map_err(|e| eprintln!("Warning: invalid SATSTAC_LOG_FORMAT: {e}"))
        .ok()
}

async fn main_int(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    match args.command {
        Commands::Summary { file } => {
            let col = Collection::from_file(&file)?;
            println!("Collection record summary for {}", file.display());
            println!("{}", col.summary());
        }
        Commands::Validate { path, level } => validate(&path, level)?,
        Commands::MetaGetValue { file, key } => {
            let value = Collection::from_file(&file)?.get_value(&key)?;
            match value {
                serde_json::Value::String(s) => println!("{s}"),
                v => println!("{v}"),
            }
        }
        Commands::MetaAll { file } => {
            let col = Collection::from_file(&file)?;
            println!("{}", serde_yaml::to_string(&col)?);
        }
        Commands::Bands { file } => {
            let summary = Collection::from_file(&file)?.summary();
            println!("{}", serde_yaml::to_string(&summary.bands)?);
        }
        Commands::Pipeline(cmd) => pipeline(cmd)?,
        Commands::Download { url, output } => {
            let credentials = Credentials::from_env(&OsEnv::default());
            let downloader = Downloader::new(&config, credentials)?;
            let path = downloader.download(&url, output.as_deref()).await?;
            info!("Saved {}", path.display());
        }
        Commands::SignUrl { url, region } => {
            let credentials = Credentials::from_env(&OsEnv::default()).context(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set to sign a request",
            )?;
            let region = region.unwrap_or(config.s3.region);
            let signed = sign_s3_url(&url, &region, &credentials, Utc::now())?;
            println!("{}", signed.url);
            for (name, value) in &signed.headers {
                println!("{name}: {value}");
            }
        }
        Commands::Calendar { dates, cols } => {
            let dates = dates
                .iter()
                .map(String::as_str)
                .map(parse_date_label)
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            println!("{}", text_calendar(&dates, cols)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let env = OsEnv::default();
    let mut config = match path {
        Some(path) => {
            info!("Using config file {}", path.display());
            let config = read_config(path, &env)?;
            for var in ignored_env_settings(&env) {
                warn!("Environment variable {var} is set, but will be ignored because a configuration file was loaded. Use ${{{var}}} inside the config file instead.");
            }
            config
        }
        None => Config::from_env(&env),
    };
    warn_unrecognized(&config.finalize());
    if config.s3.region != DEFAULT_REGION {
        info!("Using S3 region {}", config.s3.region);
    }
    Ok(config)
}

fn warn_unrecognized(keys: &UnrecognizedKeys) {
    for key in keys {
        warn!("Ignoring unrecognized configuration key '{key}'. Please check your configuration file for typos.");
    }
}

/// `path` itself, or every `*.json` file below it when it is a directory.
fn record_files(path: &Path) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }
    WalkDir::new(path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| {
            entry
                .map_err(|e| warn!("Skipping unreadable entry while searching {}: {e}", path.display()))
                .ok()
        })
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect()
}

fn validate(path: &Path, level: ValidationLevel) -> anyhow::Result<()> {
    let files = record_files(path);

    let mut failed = 0;
    for file in &files {
        let result = Collection::from_file(file).and_then(|col| col.validate(level).into_result());
        match result {
            Ok(report) => {
                for issue in report.warnings() {
                    warn!("{}: {issue}", file.display());
                }
                println!("{}: OK", file.display());
            }
            Err(e) => {
                failed += 1;
                error!("{e}");
                println!("{}: FAILED", file.display());
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} records failed validation", files.len());
    }
    Ok(())
}

fn pipeline(cmd: PipelineCommands) -> anyhow::Result<()> {
    match cmd {
        PipelineCommands::Plan {
            file,
            branch,
            workflow,
        } => {
            let pipeline = Pipeline::from_file(&file)?;
            for (name, wf) in &pipeline.workflows {
                if workflow.as_ref().is_some_and(|w| w != name) {
                    continue;
                }
                println!("{name}:");
                for (i, job) in wf.plan(&branch)?.iter().enumerate() {
                    println!("  {}. {}", i + 1, job.name);
                }
            }
            if let Some(w) = workflow.filter(|w| pipeline.workflow(w).is_none()) {
                anyhow::bail!("Workflow `{w}` is not defined in {}", file.display());
            }
        }
        PipelineCommands::Check { file } => {
            Pipeline::from_file(&file)?.check()?;
            println!("{}: OK", file.display());
        }
        PipelineCommands::Env { file } => {
            let vars = Pipeline::from_file(&file)?.required_env_vars();
            for (var, is_set) in env_var_states(vars, &OsEnv::default()) {
                println!("{var} ({})", if is_set { "set" } else { "missing" });
            }
        }
        PipelineCommands::CacheKey(args) => {
            let ctx = CacheKeyContext {
                base_dir: args.base_dir,
                ..CacheKeyContext::new(args.branch, args.revision)
            };
            println!("{}", render_cache_key(&args.template, &ctx, &OsEnv::default())?);
        }
    }
    Ok(())
}

/// Whether each variable is set. Values are never decoded or printed.
fn env_var_states<'a>(vars: Vec<String>, env: &impl Env<'a>) -> Vec<(String, bool)> {
    vars.into_iter()
        .map(|var| {
            let is_set = env.var_os(&var).is_some();
            (var, is_set)
        })
        .collect()
}
