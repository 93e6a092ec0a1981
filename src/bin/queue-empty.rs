// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Reports whether a queue directory is empty.
//!
//! Exit codes: `0` the queue is empty, `1` the queue has items, `-1` the
//! directory could not be opened as a queue, `-2` an unexpected I/O error
//! occurred.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use filequeue::{Queue, QueueError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Exit 0 if the queue at PATH is empty, 1 otherwise")]
struct Cli {
    path: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match Queue::open(&cli.path).and_then(|q| q.is_empty()) {
        Ok(true) => ExitCode::from(0),
        Ok(false) => ExitCode::from(1),
        Err(QueueError::Io { .. }) => ExitCode::from(254),
        Err(e) => {
            tracing::error!(error = %e, path = %cli.path.display(), "failed to check queue");
            ExitCode::from(255)
        }
    }
}
