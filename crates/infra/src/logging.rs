//! Structured logging setup (spec §6 ambient stack): `tracing` +
//! `tracing-subscriber` to the console, plus a size-rotating, gzip-compressed
//! file sink under `logs/agent.log` with a 7-day retention sweep.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fleetlink_common::crypto::compress;
use fleetlink_domain::{constants, AgentConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global `tracing` subscriber for the agent process.
///
/// Returns a [`WorkerGuard`] that must be held for the lifetime of the
/// process: dropping it flushes and stops the background writer thread that
/// the non-blocking file appender spawns.
pub fn init(config: &AgentConfig) -> anyhow::Result<WorkerGuard> {
    let logs_dir = config.logs_dir();
    std::fs::create_dir_all(&logs_dir)?;
    let log_path = logs_dir.join(constants::LOG_FILENAME);

    let writer = RotatingFileWriter::open(
        log_path,
        constants::LOG_ROTATION_MAX_BYTES,
        constants::LOG_RETENTION_DAYS,
    )?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let env_filter = EnvFilter::try_new(&config.log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer();
    let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(guard)
}

/// A `Write` implementation that rotates `agent.log` once it exceeds
/// `max_bytes`, gzip-compressing the rotated file and pruning rotated files
/// older than `retention_days`.
///
/// `tracing_appender::rolling` only rotates on a time boundary, not on size,
/// so the spec's "10 MB rotation" is implemented here directly rather than
/// through that module.
struct RotatingFileWriter {
    path: PathBuf,
    max_bytes: u64,
    retention_days: i64,
    file: File,
    written: u64,
}

impl RotatingFileWriter {
    fn open(path: PathBuf, max_bytes: u64, retention_days: i64) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self { path, max_bytes, retention_days, file, written })
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let rotated_name = format!(
            "{}.{}",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or(constants::LOG_FILENAME),
            Utc::now().format("%Y%m%dT%H%M%S%.f")
        );
        let rotated_path = self.path.with_file_name(rotated_name);
        std::fs::rename(&self.path, &rotated_path)?;

        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;

        if let Err(e) = compress_and_remove(&rotated_path) {
            // Logging itself can't safely report this failure through
            // `tracing` (we'd re-enter the subscriber we're rotating for),
            // so it goes to stderr.
            let _ = writeln!(io::stderr(), "log rotation: failed to compress {}: {e}", rotated_path.display());
        }

        if let Err(e) = prune_old_logs(&self.path, self.retention_days) {
            let _ = writeln!(io::stderr(), "log rotation: retention sweep failed: {e}");
        }

        Ok(())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written.saturating_add(buf.len() as u64) > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn compress_and_remove(path: &Path) -> io::Result<()> {
    let data = std::fs::read(path)?;
    let compressed =
        compress(&data).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    let mut gz_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
    gz_name.push_str(".gz");
    let gz_path = path.with_file_name(gz_name);
    std::fs::write(&gz_path, compressed)?;
    std::fs::remove_file(path)?;
    Ok(())
}

/// Delete rotated (`.gz`) log files older than `retention_days`, judged by
/// file modified time.
fn prune_old_logs(active_log_path: &Path, retention_days: i64) -> io::Result<()> {
    let Some(dir) = active_log_path.parent() else { return Ok(()) };
    let Some(stem) = active_log_path.file_name().and_then(|n| n.to_str()) else { return Ok(()) };
    let cutoff = std::time::SystemTime::now()
        .checked_sub(std::time::Duration::from_secs(u64::try_from(retention_days.max(0)).unwrap_or(0) * 86400));

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(stem) || !name.ends_with(".gz") {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        let Ok(modified) = metadata.modified() else { continue };
        if let Some(cutoff) = cutoff {
            if modified < cutoff {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_rotates_once_max_bytes_is_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(constants::LOG_FILENAME);
        let mut writer = RotatingFileWriter::open(path.clone(), 16, 7).unwrap();

        writer.write_all(b"0123456789").unwrap();
        writer.write_all(b"0123456789").unwrap();
        writer.flush().unwrap();

        assert!(path.exists());
        let rotated: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".gz"))
            .collect();
        assert_eq!(rotated.len(), 1);
    }

    #[test]
    fn prune_removes_only_files_past_retention() {
        let dir = tempfile::tempdir().unwrap();
        let active = dir.path().join(constants::LOG_FILENAME);
        std::fs::write(&active, b"current").unwrap();

        let old_path = dir.path().join(format!("{}.old.gz", constants::LOG_FILENAME));
        std::fs::write(&old_path, b"stale").unwrap();
        let old_time = std::time::SystemTime::now() - std::time::Duration::from_secs(30 * 86400);
        let old_file = OpenOptions::new().write(true).open(&old_path).unwrap();
        old_file.set_modified(old_time).unwrap();

        prune_old_logs(&active, 7).unwrap();
        assert!(!old_path.exists());
    }
}
