//! SegKV Admin CLI
//!
//! Opens a data directory directly for inspection and maintenance.
//! Do not point it at a directory another process is serving.

use std::process;

use clap::{Parser, Subcommand};
use segkv::{Config, Engine, SegKvError};
use tracing_subscriber::{fmt, EnvFilter};

/// SegKV admin tool
#[derive(Parser, Debug)]
#[command(name = "segkv-admin")]
#[command(about = "Inspect and maintain a SegKV data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./segkv_data")]
    data_dir: String,

    /// Segment size limit in KB before rollover
    #[arg(short = 's', long, default_value = "10240")]
    max_segment_kb: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Print the total size of all segments in bytes
    Size,

    /// Merge all segments into one
    Compact,

    /// List segments and recovery details
    Inspect,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,segkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .max_segment_size(args.max_segment_kb * 1024)
        .auto_compaction(false)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.data_dir, e);
            process::exit(1);
        }
    };

    let outcome = run(&engine, args.command);
    let closed = engine.close();

    if let Err(e) = outcome {
        match e {
            SegKvError::KeyNotFound(key) => {
                eprintln!("(not found) {}", key);
                process::exit(2);
            }
            e => {
                tracing::error!("Command failed: {}", e);
                process::exit(1);
            }
        }
    }
    if let Err(e) = closed {
        tracing::error!("Failed to close engine: {}", e);
        process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> segkv::Result<()> {
    match command {
        Commands::Get { key } => {
            println!("{}", engine.get(&key)?);
        }
        Commands::Put { key, value } => {
            engine.put(&key, &value)?;
            println!("OK");
        }
        Commands::Size => {
            println!("{}", engine.size()?);
        }
        Commands::Compact => {
            let stats = engine.compact()?;
            if stats.is_noop() {
                println!("nothing to compact ({} bytes)", stats.bytes_before);
            } else {
                println!(
                    "merged {} segments: {} -> {} bytes, kept {} records, dropped {}",
                    stats.segments_merged,
                    stats.bytes_before,
                    stats.bytes_after,
                    stats.records_written,
                    stats.records_dropped()
                );
            }
        }
        Commands::Inspect => {
            let report = engine.recovery_report();
            println!(
                "recovered: {} segments, {} records, {} live keys, {} bytes truncated{}",
                report.segments_loaded,
                report.records_replayed,
                report.live_keys,
                report.bytes_truncated,
                if report.stale_merge_removed {
                    ", stale merge file removed"
                } else {
                    ""
                }
            );
            for segment in engine.segments()? {
                println!(
                    "{:>6}  {:>12} bytes  {:>8} keys  {}",
                    segment.id.0,
                    segment.size,
                    segment.key_count,
                    segment.path.display()
                );
            }
        }
    }
    Ok(())
}
