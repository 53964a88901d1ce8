//! Rotating file sink
//!
//! Appends one line per record to an active file. When the next record would
//! push the file past `max_size`, the active file is renamed to a timestamped
//! backup and a fresh one is opened.
//!
//! # Layout
//!
//! ```text
//! logs/
//! ├── app.log                              # active
//! ├── app-2024-01-25T09-12-44.120.log      # backup
//! └── app-2024-01-25T08-03-10.007.log.lz4  # backup, compressed
//! ```
//!
//! Lines are buffered and flushed on every write, or at most every
//! `flush_interval` when one is set.
//!
//! Backups beyond `max_backups` or older than `max_age` are deleted after
//! each rotation. Backup timestamps come from the sink's clock, so pruning by
//! age reads the name rather than filesystem times.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use fanlog_config::{Compression, FileConfig};
use lz4_flex::frame::FrameEncoder;
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::common::{MetricsSnapshot, Sink, SinkError, SinkMetrics};
use crate::record::{Level, LogRecord};

/// Backup timestamp pattern, sortable and filename-safe
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

/// Length of a rendered [`BACKUP_TIME_FORMAT`]
const BACKUP_TIME_LEN: usize = 23;

/// Suffix appended to compressed backups
const LZ4_SUFFIX: &str = ".lz4";

/// Write buffer size
const BUFFER_SIZE: usize = 64 * 1024;

/// When and how the active file is rotated
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    /// Rotate before the active file would exceed this many bytes
    pub max_size: u64,
    /// Delete backups older than this
    pub max_age: Option<Duration>,
    /// Keep at most this many backups (0 = unlimited)
    pub max_backups: usize,
    pub compression: Compression,
    /// Flush after a write once this much time passed since the last flush
    /// (zero = every write)
    pub flush_interval: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024,
            max_age: Some(Duration::from_secs(30 * 24 * 3600)),
            max_backups: 5,
            compression: Compression::None,
            flush_interval: Duration::ZERO,
        }
    }
}

impl RotationPolicy {
    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            max_size: config.max_size_bytes().unwrap_or(u64::MAX),
            max_age: (config.max_age_days > 0)
                .then(|| Duration::from_secs(u64::from(config.max_age_days) * 24 * 3600)),
            max_backups: config.max_backups,
            compression: config.compression,
            flush_interval: config.flush_interval,
        }
    }
}

struct ActiveFile {
    writer: BufWriter<File>,
    size: u64,
    last_flush: DateTime<Utc>,
}

/// Size-rotating file sink
pub struct RotatingFileSink {
    path: PathBuf,
    policy: RotationPolicy,
    level: Level,
    clock: Arc<dyn Clock>,
    active: Mutex<Option<ActiveFile>>,
    metrics: SinkMetrics,
}

impl RotatingFileSink {
    /// Open (or create) the active file
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or file cannot be created.
    pub fn new(
        path: impl Into<PathBuf>,
        policy: RotationPolicy,
        level: Level,
    ) -> Result<Self, SinkError> {
        Self::with_clock(path, policy, level, Arc::new(SystemClock))
    }

    pub fn with_clock(
        path: impl Into<PathBuf>,
        policy: RotationPolicy,
        level: Level,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SinkError> {
        let path = path.into();
        if policy.max_size == 0 {
            return Err(SinkError::creation("max_size must be greater than 0"));
        }
        if path.file_name().is_none() {
            return Err(SinkError::creation(format!(
                "invalid log file path: {}",
                path.display()
            )));
        }

        let active = open_active(&path, clock.now())?;
        Ok(Self {
            path,
            policy,
            level,
            clock,
            active: Mutex::new(Some(active)),
            metrics: SinkMetrics::new(),
        })
    }

    /// Sink for a `[file]` section at the given effective level
    pub fn from_config(config: &FileConfig, level: Level) -> Result<Self, SinkError> {
        Self::new(&config.path, RotationPolicy::from_config(config), level)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backups currently on disk, newest first
    pub fn backups(&self) -> io::Result<Vec<PathBuf>> {
        let mut backups = self.backup_entries()?;
        backups.sort_by(|a, b| b.cmp(a));
        Ok(backups.into_iter().map(|(_, path)| path).collect())
    }

    fn write_line(&self, line: &[u8]) -> Result<(), SinkError> {
        let len = line.len() as u64;
        if len > self.policy.max_size {
            return Err(SinkError::write(format!(
                "record of {} bytes exceeds max file size {}",
                len, self.policy.max_size
            )));
        }

        let mut guard = self.active.lock();
        let needs_rotation = match guard.as_ref() {
            Some(active) => active.size > 0 && active.size + len > self.policy.max_size,
            None => false,
        };

        if needs_rotation && let Some(active) = guard.take() {
            self.rotate(active)?;
        }
        if guard.is_none() {
            *guard = Some(open_active(&self.path, self.clock.now())?);
        }

        let Some(active) = guard.as_mut() else {
            return Err(SinkError::write("active file unavailable"));
        };
        active.writer.write_all(line)?;
        active.size += len;

        let now = self.clock.now();
        let due = self.policy.flush_interval.is_zero()
            || (now - active.last_flush)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.policy.flush_interval);
        if due {
            active.writer.flush()?;
            active.last_flush = now;
        }
        Ok(())
    }

    fn rotate(&self, active: ActiveFile) -> Result<(), SinkError> {
        let mut writer = active.writer;
        writer.flush()?;
        drop(writer);

        let backup = self.backup_path(self.clock.now());
        fs::rename(&self.path, &backup)?;

        let backup = match self.policy.compression {
            Compression::None => backup,
            Compression::Lz4 => compress_lz4(&backup)?,
        };
        tracing::debug!(backup = %backup.display(), "log file rotated");

        if let Err(e) = self.prune() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to prune log backups");
        }
        Ok(())
    }

    fn stem_and_ext(&self) -> (String, String) {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self
            .path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        (stem, ext)
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// `{stem}-{time}{ext}`, with `-{n}` before the extension on collision
    fn backup_path(&self, now: DateTime<Utc>) -> PathBuf {
        let (stem, ext) = self.stem_and_ext();
        let time = now.format(BACKUP_TIME_FORMAT).to_string();
        let dir = self.dir();

        let mut candidate = dir.join(format!("{}-{}{}", stem, time, ext));
        let mut n = 1;
        while candidate.exists() || with_lz4_suffix(&candidate).exists() {
            candidate = dir.join(format!("{}-{}-{}{}", stem, time, n, ext));
            n += 1;
        }
        candidate
    }

    fn backup_entries(&self) -> io::Result<Vec<(NaiveDateTime, PathBuf)>> {
        let (stem, ext) = self.stem_and_ext();
        let prefix = format!("{}-", stem);
        let mut entries = Vec::new();

        for entry in fs::read_dir(self.dir())? {
            let path = entry?.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let body = name.strip_suffix(LZ4_SUFFIX).unwrap_or(&name);
            let Some(rest) = body.strip_prefix(&prefix) else {
                continue;
            };
            if !rest.ends_with(&ext) || rest.len() < BACKUP_TIME_LEN {
                continue;
            }
            let Some(stamp) = rest.get(..BACKUP_TIME_LEN) else {
                continue;
            };
            if let Ok(time) = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT) {
                entries.push((time, path));
            }
        }
        Ok(entries)
    }

    fn prune(&self) -> io::Result<()> {
        let mut entries = self.backup_entries()?;
        entries.sort_by(|a, b| b.cmp(a));

        let now = self.clock.now().naive_utc();
        for (idx, (time, path)) in entries.iter().enumerate() {
            let over_count = self.policy.max_backups > 0 && idx >= self.policy.max_backups;
            let too_old = self.policy.max_age.is_some_and(|max_age| {
                now.signed_duration_since(*time)
                    .to_std()
                    .is_ok_and(|age| age > max_age)
            });
            if over_count || too_old {
                fs::remove_file(path)?;
                tracing::debug!(backup = %path.display(), "log backup removed");
            }
        }
        Ok(())
    }
}

fn open_active(path: &Path, now: DateTime<Utc>) -> io::Result<ActiveFile> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    Ok(ActiveFile {
        writer: BufWriter::with_capacity(BUFFER_SIZE, file),
        size,
        last_flush: now,
    })
}

fn with_lz4_suffix(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(LZ4_SUFFIX);
    PathBuf::from(name)
}

/// Compress `path` into `path.lz4` and remove the original
fn compress_lz4(path: &Path) -> io::Result<PathBuf> {
    let target = with_lz4_suffix(path);
    let mut input = File::open(path)?;
    let output = BufWriter::new(File::create(&target)?);

    let mut encoder = FrameEncoder::new(output);
    io::copy(&mut input, &mut encoder)?;
    let mut output = encoder.finish().map_err(io::Error::other)?;
    output.flush()?;

    fs::remove_file(path)?;
    Ok(target)
}

impl Sink for RotatingFileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn accepts(&self, level: Level) -> bool {
        level >= self.level
    }

    fn write(&self, record: &LogRecord) -> Result<usize, SinkError> {
        let payload = record.payload();
        let result = if payload.ends_with(b"\n") {
            self.write_line(payload).map(|()| payload.len())
        } else {
            let mut line = Vec::with_capacity(payload.len() + 1);
            line.extend_from_slice(payload);
            line.push(b'\n');
            self.write_line(&line).map(|()| line.len())
        };

        match result {
            Ok(n) => {
                self.metrics.record_written(n as u64);
                Ok(n)
            }
            Err(e) => {
                self.metrics.write_error();
                Err(e)
            }
        }
    }

    fn flush(&self) -> Result<(), SinkError> {
        if let Some(active) = self.active.lock().as_mut() {
            active.writer.flush()?;
        }
        self.metrics.flush();
        Ok(())
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for RotatingFileSink {
    fn drop(&mut self) {
        if let Some(active) = self.active.lock().as_mut()
            && let Err(e) = active.writer.flush()
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush log file on drop");
        }
    }
}
