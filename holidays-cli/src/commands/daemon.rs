//! `holidays daemon` — background runtime lifecycle.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use holidays_daemon::paths::{socket_path, stderr_log_path, stdout_log_path};
use holidays_daemon::{
    request_status, request_stop, request_sync, start_blocking, DaemonError, SyncSummary,
};

use super::{home, print_json};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run daemon in foreground (settings watcher, daily timer, socket server).
    Start(DaemonStartArgs),
    /// Request graceful daemon shutdown over Unix socket.
    Stop,
    /// Query daemon runtime status over Unix socket.
    Status,
    /// Ask the running daemon to sync now.
    Sync,
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonStartArgs {
    /// Write logs under ~/.holidays/logs instead of stdout.
    #[arg(long)]
    pub log_file: bool,
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only stderr log file.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home()?;

    match command {
        DaemonCommand::Start(args) => {
            start_blocking(&home, args.log_file).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                print_json(&payload)?;
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Sync => {
            let data = match request_sync(&home) {
                Ok(data) => data,
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    bail!("daemon is not running; use 'holidays sync' instead")
                }
                Err(err) => return Err(err).context("daemon sync request failed"),
            };
            print_json(&data)?;
            let summary: SyncSummary =
                serde_json::from_value(data).context("unexpected sync response from daemon")?;
            if summary.is_failed() {
                bail!(
                    "{}",
                    summary.message.as_deref().unwrap_or("sync failed in daemon")
                );
            }
        }
        DaemonCommand::Logs(args) => {
            if args.stderr_only {
                print_tail(&stderr_log_path(&home), args.lines)
                    .context("failed to read daemon stderr log")?;
            } else {
                print_tail(&stdout_log_path(&home), args.lines)
                    .context("failed to read daemon stdout log")?;
                print_tail(&stderr_log_path(&home), args.lines)
                    .context("failed to read daemon stderr log")?;
            }
        }
    }

    Ok(())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if lines == 0 {
            continue;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
