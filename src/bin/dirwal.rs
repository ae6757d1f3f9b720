//! dirwal CLI
//!
//! Inspect and append to a log directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dirwal::wal::LogVerifier;
use dirwal::{Log, LogConfig, LogError, UserLogRecord};
use tracing_subscriber::{fmt, EnvFilter};

/// dirwal CLI
#[derive(Parser, Debug)]
#[command(name = "dirwal")]
#[command(about = "Inspect and append to a dirwal write-ahead log")]
#[command(version)]
struct Args {
    /// Log directory
    #[arg(short, long, default_value = "./dirwal_data")]
    dir: PathBuf,

    /// Log file suffix
    #[arg(short, long, default_value = "log")]
    suffix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check every frame and print a summary
    Verify,

    /// Print every record
    Dump {
        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,

        /// Bytes of payload to show per record
        #[arg(short, long, default_value = "32")]
        preview: usize,
    },

    /// Append payloads durably
    Append {
        /// Payloads, one record each
        #[arg(required = true)]
        payloads: Vec<String>,

        /// File size cap in KB, used when creating a new log
        #[arg(long, default_value = "65536")]
        file_size_kb: u64,
    },
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dirwal=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> dirwal::Result<()> {
    match args.command {
        Commands::Verify => {
            let report = LogVerifier::verify(&args.dir, &args.suffix)?;
            println!("files:     {}", report.files);
            println!("bytes:     {}", report.bytes);
            println!("records:   {}", report.records);
            println!("first lsn: {}", fmt_lsn(report.first_lsn));
            println!("last lsn:  {}", fmt_lsn(report.last_lsn));
            if !report.truncated_files.is_empty() {
                println!("truncated: {:?}", report.truncated_files);
            }
        }

        Commands::Dump { limit, preview } => {
            let files = dirwal::wal::LogFileManager::discover(&args.dir, &args.suffix)?;
            let mut scanner = dirwal::LogScanner::new(files);
            let mut record = UserLogRecord::new();
            let mut shown = 0usize;

            while limit.map_or(true, |l| shown < l) && scanner.get_next_record(&mut record)? {
                let anchor = record
                    .anchor()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                let data = record.data();
                let head = &data[..data.len().min(preview)];
                println!(
                    "{:<24} len={:<8} {}{}",
                    anchor,
                    data.len(),
                    hex(head),
                    if data.len() > head.len() { "…" } else { "" }
                );
                shown += 1;
            }
        }

        Commands::Append {
            payloads,
            file_size_kb,
        } => {
            let config = LogConfig::builder()
                .log_dir(&args.dir)
                .suffix(&args.suffix)
                .file_size_cap(kb_to_bytes(file_size_kb)?)
                .build();
            let log = Log::open(config)?;
            let mut record = UserLogRecord::new();

            for payload in &payloads {
                record.set_data(payload.as_bytes());
                let anchor = log.log(&record, true)?;
                println!("{}", anchor);
            }
            log.destroy()?;
        }
    }

    Ok(())
}

fn kb_to_bytes(kb: u64) -> dirwal::Result<u64> {
    kb.checked_mul(1024)
        .ok_or_else(|| LogError::Config(format!("file size of {} KB is too large", kb)))
}

fn fmt_lsn(lsn: Option<u64>) -> String {
    lsn.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
