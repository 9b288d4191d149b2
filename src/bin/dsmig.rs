//! dsmig CLI
//!
//! Runs retrieval and conversion over a control file, or maintains the control file itself
//! (`--init`, `--add`, `--stats`).

use clap::{Parser, ValueEnum};
use dsmig::error::{EXIT_DEGRADED, EXIT_FATAL, EXIT_OK};
use dsmig::{
    Config, Converter, Coordinator, DsmiginConverter, FtpTransfer, PhaseSet, RunSummary,
    SelectionOptions, ToExitCode, Transfer, UnavailableConverter, UnavailableTransfer,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "dsmig")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Control-file driven mainframe dataset migration")]
#[command(long_about = "dsmig - mainframe dataset migration scheduler\n\n\
    Every dataset is one row of a delimited control file. A run retrieves the rows that still\n\
    need retrieving, then converts the rows that still need converting, and records each\n\
    completion back into the file.\n\n\
    Examples:\n\
      dsmig --csv datasets.csv --init\n\
      dsmig --csv datasets.csv --add HLQ.PAYROLL.DATA:HLQ.PAYROLL.INDEX\n\
      dsmig --csv datasets.csv -F -i zos.example.com -n 20\n\
      dsmig --csv datasets.csv -M -C\n\
      dsmig --csv datasets.csv --stats -t wave1")]
struct Cli {
    /// Control file
    #[arg(long, value_name = "FILE")]
    csv: PathBuf,

    /// Working directory for retrieved datasets, backups and statistics
    #[arg(long, value_name = "DIR")]
    working_directory: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run the retrieval phase
    #[arg(short = 'F', long)]
    retrieve: bool,

    /// Run the conversion phase
    #[arg(short = 'M', long)]
    convert: bool,

    /// Retrieve at most this many rows
    #[arg(short = 'n', long, value_name = "COUNT")]
    number: Option<usize>,

    /// Reprocess every non-ignored row regardless of its flags
    #[arg(long)]
    force: bool,

    /// Convert as a dry run without recording completions
    #[arg(short = 'C', long)]
    convert_only: bool,

    /// Create the control file with only its header row
    #[arg(long, conflicts_with_all = ["add", "stats"])]
    init: bool,

    /// Append datasets to the control file (colon separated)
    #[arg(long, value_name = "DSN[:DSN...]", conflicts_with = "stats")]
    add: Option<String>,

    /// Print control file statistics and write them to the statistics directory
    #[arg(long)]
    stats: bool,

    /// Tag for backup and statistics file names
    #[arg(short = 't', long)]
    tag: Option<String>,

    /// Log level
    #[arg(short = 'l', long, value_enum, ignore_case = true, default_value = "INFO")]
    log_level: LogLevel,

    /// Also write the log to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Mainframe host name or IP address
    #[arg(short = 'i', long, value_name = "HOST")]
    ip_address: Option<String>,

    /// Prefix of the flat copies VSAM clusters are retrieved from
    #[arg(short = 'p', long)]
    prefix: Option<String>,

    /// Encoding code passed to dsmigin
    #[arg(short = 'e', long)]
    encoding: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
#[value(rename_all = "UPPER")]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

fn init_logging(cli: &Cli) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dsmig={}", cli.log_level.directive())));

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("cannot open log file {}: {}", path.display(), e))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn load_config(cli: &Cli) -> dsmig::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.working_directory {
        config.workspace.working_dir = dir.clone();
    }
    if let Some(tag) = &cli.tag {
        config.control.tag = Some(tag.clone());
    }
    if let Some(host) = &cli.ip_address {
        config.transfer.host = Some(host.clone());
    }
    if let Some(prefix) = &cli.prefix {
        config.transfer.vsam_prefix = Some(prefix.clone());
    }
    if let Some(encoding) = &cli.encoding {
        config.conversion.encoding_code = encoding.clone();
    }
    config.validate()?;
    Ok(config)
}

fn build_transfer(config: &Config) -> Arc<dyn Transfer> {
    match FtpTransfer::from_config(&config.transfer, &config.retry) {
        Ok(ftp) => Arc::new(ftp),
        Err(e) => {
            tracing::warn!(error = %e, "retrieval unavailable");
            Arc::new(UnavailableTransfer::new(e.to_string()))
        }
    }
}

fn build_converter(config: &Config) -> Arc<dyn Converter> {
    match DsmiginConverter::from_config(&config.conversion, &config.workspace) {
        Ok(converter) => Arc::new(converter),
        Err(e) => {
            tracing::warn!(error = %e, "conversion unavailable");
            Arc::new(UnavailableConverter::new(e.to_string()))
        }
    }
}

fn print_summary(summary: &RunSummary) {
    if let Some(reason) = &summary.backup_failure {
        println!("BACKUP    {reason}");
    }
    for rejected in &summary.rejected {
        println!("REJECTED  {rejected}");
    }
    for outcome in &summary.outcomes {
        if let dsmig::OutcomeKind::Failure { reason } = &outcome.result {
            println!("FAILED    {} ({}): {}", outcome.dataset, outcome.phase, reason);
        }
    }
    println!(
        "succeeded: {}  failed: {}  skipped: {}  rejected: {}",
        summary.succeeded().count(),
        summary.failed().len(),
        summary.skipped().count(),
        summary.rejected.len()
    );
}

fn print_stats(stats: &dsmig::CatalogStats) {
    for (name, value) in stats.fields() {
        println!("{name:<20} {value}");
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "control".to_string())
}

async fn run(cli: Cli) -> dsmig::Result<i32> {
    let config = load_config(&cli)?;
    let transfer = build_transfer(&config);
    let converter = build_converter(&config);
    let coordinator = Coordinator::new(config, transfer, converter);

    if cli.init {
        coordinator.init(&cli.csv)?;
        return Ok(EXIT_OK);
    }

    if let Some(list) = &cli.add {
        let datasets: Vec<String> = list
            .split(':')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let refused = coordinator.add_datasets(&cli.csv, &datasets)?;
        for e in &refused {
            println!("NOT ADDED {e}");
        }
        return Ok(if refused.is_empty() { EXIT_OK } else { EXIT_DEGRADED });
    }

    if cli.stats {
        let stats = coordinator.stats(&cli.csv)?;
        print_stats(&stats);
        let config = coordinator.config();
        stats.write_csv(
            &config.workspace.statistics_dir(),
            &file_stem(&cli.csv),
            config.control.tag.as_deref(),
        )?;
        return Ok(EXIT_OK);
    }

    // Neither phase named means both
    let phases = match (cli.retrieve, cli.convert) {
        (false, false) => PhaseSet::both(),
        (retrieval, conversion) => PhaseSet {
            retrieval,
            conversion,
        },
    };
    let options = SelectionOptions {
        max_rows: cli.number,
        force: cli.force,
        convert_only: cli.convert_only,
    };

    let cancel = CancellationToken::new();
    dsmig::cancel_on_signal(cancel.clone());
    let summary = coordinator
        .execute(&cli.csv, phases, options, &cancel)
        .await?;
    cancel.cancel();

    print_summary(&summary);
    Ok(summary.exit_code())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli) {
        eprintln!("dsmig: {e}");
        std::process::exit(EXIT_FATAL);
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("dsmig: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}
