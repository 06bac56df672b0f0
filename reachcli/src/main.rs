use clap::{ArgAction, Parser};
use libreach_storm::{FilterSet, Pipeline, ProbeConfig, Prober, Threshold};
use serde::Deserialize;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::File,
    io::{BufReader, BufWriter},
};
use tracing::{info, warn};

const DEFAULT_INPUT_FILE: &str = "domains.txt";
const DEFAULT_OUTPUT_SUCCESS_FILE: &str = "success.txt";
const DEFAULT_OUTPUT_FAILS_FILE: &str = "fails.txt";
const DEFAULT_DOMAIN_FILTER_FILE: &str = "domain_filter.txt";
const DEFAULT_WORKERS_COUNT: usize = 100;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Default, Deserialize)]
struct Config {
    #[serde(default)]
    files: FilesConfig,
    #[serde(default)]
    probe: ProbeSection,
    #[serde(default)]
    log: LogConfig,
}

#[derive(Debug, Default, Deserialize)]
struct FilesConfig {
    input: Option<PathBuf>,
    output_success: Option<PathBuf>,
    output_fails: Option<PathBuf>,
    domain_filter: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeSection {
    workers_count: Option<usize>,
    accept_4xx_errors: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LogConfig {
    level: Option<String>,
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("reach").join("config.toml"))
}

/// Reads the config file. A missing file at the default location is the
/// same as an empty one; an explicitly given file must exist.
fn load_config(explicit: Option<&Path>) -> Result<Config, String> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

fn get_default_config_toml() -> String {
    r#"# Reach Configuration
# Command line flags take precedence over these values.

[files]
input = "domains.txt"
output_success = "success.txt"
output_fails = "fails.txt"
domain_filter = "domain_filter.txt"

[probe]
workers_count = 100
# false moves 4xx responses into the fails file
accept_4xx_errors = true
# timeout_secs = 10

[log]
# overridden by RUST_LOG
level = "info"
"#
    .to_string()
}

#[derive(Parser, Debug)]
#[command(name = "reach")]
#[command(about = "Reach - check HTTP reachability of domains on allowed TLDs", long_about = None)]
struct Args {
    /// Set input file [default: domains.txt]
    #[arg(long = "input_file", value_name = "PATH")]
    input_file: Option<PathBuf>,

    /// Set output success file [default: success.txt]
    #[arg(long = "output_success_file", value_name = "PATH")]
    output_success_file: Option<PathBuf>,

    /// Set output fails file [default: fails.txt]
    #[arg(long = "output_fails_file", value_name = "PATH")]
    output_fails_file: Option<PathBuf>,

    /// Set domain filter file [default: domain_filter.txt]
    #[arg(long = "domain_filter_file", value_name = "PATH")]
    domain_filter_file: Option<PathBuf>,

    /// Set workers count [default: 100]
    #[arg(long = "workers_count", value_name = "N")]
    workers_count: Option<usize>,

    /// Set accept 4XX errors; if false, 4XX will be included into fails file [default: true]
    #[arg(
        long = "accept_4xx_errors",
        value_name = "BOOL",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    accept_4xx_errors: Option<bool>,

    /// Per-request timeout in seconds (no timeout when unset)
    #[arg(long = "timeout_secs", value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Read configuration from this file instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the default config to stdout and exit
    #[arg(long)]
    print_default_config: bool,

    /// Write the default config to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

const GO_STYLE_FLAGS: &[&str] = &[
    "input_file",
    "output_success_file",
    "output_fails_file",
    "domain_filter_file",
    "workers_count",
    "accept_4xx_errors",
    "timeout_secs",
];

/// Rewrites `-workers_count 10` and `-workers_count=10` to their `--` form so
/// the single-dash spelling keeps working.
fn go_style_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| rewrite_go_flag(&arg).unwrap_or(arg))
        .collect()
}

fn rewrite_go_flag(arg: &OsString) -> Option<OsString> {
    let text = arg.to_str()?;
    let rest = text.strip_prefix('-').filter(|r| !r.starts_with('-'))?;
    let name = rest.split('=').next().unwrap_or(rest);
    GO_STYLE_FLAGS
        .contains(&name)
        .then(|| OsString::from(format!("-{}", text)))
}

#[derive(Debug)]
struct Settings {
    input_file: PathBuf,
    output_success_file: PathBuf,
    output_fails_file: PathBuf,
    domain_filter_file: PathBuf,
    workers_count: usize,
    accept_4xx_errors: bool,
    timeout: Option<Duration>,
    log_level: String,
}

impl Settings {
    fn resolve(args: Args, config: Config) -> Self {
        Self {
            input_file: args
                .input_file
                .or(config.files.input)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_FILE)),
            output_success_file: args
                .output_success_file
                .or(config.files.output_success)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_SUCCESS_FILE)),
            output_fails_file: args
                .output_fails_file
                .or(config.files.output_fails)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FAILS_FILE)),
            domain_filter_file: args
                .domain_filter_file
                .or(config.files.domain_filter)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOMAIN_FILTER_FILE)),
            workers_count: args
                .workers_count
                .or(config.probe.workers_count)
                .unwrap_or(DEFAULT_WORKERS_COUNT),
            accept_4xx_errors: args
                .accept_4xx_errors
                .or(config.probe.accept_4xx_errors)
                .unwrap_or(true),
            timeout: args
                .timeout_secs
                .or(config.probe.timeout_secs)
                .map(Duration::from_secs),
            log_level: config
                .log
                .level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }
}

fn setup_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse_from(go_style_flags(std::env::args_os()));

    if args.print_default_config {
        println!("{}", get_default_config_toml());
        return Ok(());
    }

    if args.write_default_config {
        if let Some(path) = config_path() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, get_default_config_toml())?;
            println!("Default config written to: {}", path.display());
        } else {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
        return Ok(());
    }

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let settings = Settings::resolve(args, config);
    setup_logging(&settings.log_level);

    let rt = tokio::runtime::Runtime::new()?;
    if let Err(e) = rt.block_on(run(settings)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let filters = FilterSet::load(&settings.domain_filter_file)?;
    info!(
        path = %settings.domain_filter_file.display(),
        patterns = filters.len(),
        "loaded domain filter"
    );
    if filters.is_empty() {
        warn!("domain filter is empty, every domain will be rejected");
    }

    let input = open(&settings.input_file, "input").await?;
    let success = create(&settings.output_success_file, "output success").await?;
    let fails = create(&settings.output_fails_file, "output fails").await?;

    let config = ProbeConfig {
        threshold: Threshold::from_accept_4xx(settings.accept_4xx_errors),
        timeout: settings.timeout,
    };
    info!(
        workers = settings.workers_count,
        threshold = config.threshold.boundary(),
        "starting"
    );

    let prober = Prober::new(Arc::new(filters), config)?;
    let output = Pipeline::new(prober, settings.workers_count)
        .run(
            BufReader::new(input),
            BufWriter::new(success),
            BufWriter::new(fails),
        )
        .await?;

    let summary = output.summary;
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "done"
    );

    Ok(())
}

async fn open(path: &Path, what: &str) -> Result<File, String> {
    File::open(path)
        .await
        .map_err(|e| format!("Failed to open {} file {}: {}", what, path.display(), e))
}

async fn create(path: &Path, what: &str) -> Result<File, String> {
    File::create(path)
        .await
        .map_err(|e| format!("Failed to create {} file {}: {}", what, path.display(), e))
}
