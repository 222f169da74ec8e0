//! Decoupled, non-blocking logging pipeline.
//!
//! `HarnessLogger` implements `log::Log` but never writes synchronously:
//! every record is formatted and pushed onto a `crossbeam_channel`, drained
//! by one background writer thread. This keeps sampler/aggregator hot paths
//! free of file I/O latency, mirroring the teacher's `LogCollector` design
//! minus its UI-dispatch half.

use crate::config::Config;
use crate::error::AppError;
use chrono::Utc;
use crossbeam_channel::{Sender, TrySendError};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::thread::JoinHandle;

struct LogLine {
    level: Level,
    target: String,
    message: String,
    at: chrono::DateTime<Utc>,
}

struct HarnessLogger {
    tx: Sender<LogLine>,
    level: LevelFilter,
}

impl Log for HarnessLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = LogLine {
            level: record.level(),
            target: record.target().to_string(),
            message: format!("{}", record.args()),
            at: Utc::now(),
        };
        // Never block the caller; a full channel drops the line rather than
        // stalling a sampler or the aggregator.
        if let Err(TrySendError::Full(_)) = self.tx.try_send(line) {
            eprintln!("[logging] dropped log line: channel full");
        }
    }

    fn flush(&self) {}
}

/// Owns the background writer thread and the channel sender; dropping it
/// without calling `flush_and_join` may lose buffered lines.
pub struct LoggingHandle {
    tx: Sender<LogLine>,
    join: Option<JoinHandle<()>>,
}

impl LoggingHandle {
    /// Signals the writer thread to drain remaining lines and exit, then
    /// blocks until it has.
    pub fn flush_and_join(mut self) {
        drop(self.tx.clone());
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

/// Installs `HarnessLogger` as the global logger and starts its writer
/// thread, writing to `<logs_dir>/harness_<run_id>.log`.
pub fn init(config: &Config, run_id: &str) -> Result<LoggingHandle, AppError> {
    std::fs::create_dir_all(&config.paths.logs_dir)?;
    let log_path: PathBuf = config.paths.logs_dir.join(format!("harness_{run_id}.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let (tx, rx) = crossbeam_channel::bounded::<LogLine>(4096);
    let join = std::thread::Builder::new()
        .name("harness-logger".to_string())
        .spawn(move || writer_loop(file, rx))
        .expect("failed to spawn logging writer thread");

    let level = parse_level(&config.log_level);
    let logger = HarnessLogger {
        tx: tx.clone(),
        level,
    };
    log::set_boxed_logger(Box::new(logger))
        .map(|()| log::set_max_level(level))
        .map_err(|e| AppError::PreCheck(format!("failed to install logger: {e}")))?;

    Ok(LoggingHandle {
        tx,
        join: Some(join),
    })
}

fn writer_loop(mut file: File, rx: crossbeam_channel::Receiver<LogLine>) {
    for line in rx.iter() {
        let formatted = format!(
            "{} [{}] {}: {}\n",
            line.at.to_rfc3339(),
            line.level,
            line.target,
            line.message
        );
        if let Err(e) = file.write_all(formatted.as_bytes()) {
            eprintln!("[logging] write failed: {e}");
        }
    }
    let _ = file.flush();
}

fn parse_level(s: &str) -> LevelFilter {
    match s.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}
