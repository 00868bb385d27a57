//! Logging bootstrap: console echo plus a size-capped rotating file,
//! one line per event formatted as `[YYYY-MM-DD HH:MM:SS] message`.
//!
//! No crate in our dependency stack reproduces Python's
//! `RotatingFileHandler(maxBytes=..., backupCount=...)` exactly —
//! `tracing-appender`'s `RollingFileAppender` only rotates on a time
//! cadence — so `RotatingFileWriter` below is a small hand-rolled
//! `MakeWriter` that does the byte-cap rotation itself.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const DEFAULT_MAX_BYTES: u64 = 2_000_000;
const DEFAULT_BACKUPS: u32 = 5;

struct RotatingFileInner {
    path: PathBuf,
    file: File,
    max_bytes: u64,
    backups: u32,
    written: u64,
}

impl RotatingFileInner {
    fn open(path: PathBuf, max_bytes: u64, backups: u32) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            file,
            max_bytes,
            backups,
            written,
        })
    }

    fn rotate(&mut self) -> io::Result<()> {
        for i in (1..self.backups).rev() {
            let src = self.backup_path(i);
            let dst = self.backup_path(i + 1);
            if src.exists() {
                let _ = fs::rename(&src, &dst);
            }
        }
        if self.backups > 0 {
            let first_backup = self.backup_path(1);
            let _ = fs::rename(&self.path, &first_backup);
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.backups > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }
}

/// Clonable handle around a size-capped rotating file, usable as a
/// `tracing_subscriber::fmt::MakeWriter`.
#[derive(Clone)]
pub struct RotatingFileWriter {
    inner: Arc<Mutex<RotatingFileInner>>,
}

impl RotatingFileWriter {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_limits(path, DEFAULT_MAX_BYTES, DEFAULT_BACKUPS)
    }

    pub fn with_limits(path: impl AsRef<Path>, max_bytes: u64, backups: u32) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingFileInner::open(
                path, max_bytes, backups,
            )?)),
        })
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write_bytes(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Writer that fans a single event out to both stdout and a rotating file.
#[derive(Clone)]
pub struct TeeWriter {
    file: RotatingFileWriter,
}

impl TeeWriter {
    pub fn new(file: RotatingFileWriter) -> Self {
        Self { file }
    }
}

pub struct TeeHandle {
    file: RotatingFileWriter,
}

impl Write for TeeHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for TeeWriter {
    type Writer = TeeHandle;

    fn make_writer(&'a self) -> Self::Writer {
        TeeHandle {
            file: self.file.clone(),
        }
    }
}

/// `[YYYY-MM-DD HH:MM:SS] message` formatter, matching the original
/// scheduler's log line shape.
pub struct PlainFormatter;

impl<S, N> FormatEvent<S, N> for PlainFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        write!(writer, "[")?;
        LocalStamp.format_time(&mut writer)?;
        write!(writer, "] ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

struct LocalStamp;

impl FormatTime for LocalStamp {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Install the global tracing subscriber: console + rotating file, plain
/// `[timestamp] message` formatting, `RUST_LOG`-overridable filter.
pub fn init(log_file: &str) -> io::Result<()> {
    let path = if log_file.is_empty() {
        std::env::current_dir()?.join("scheduler.log")
    } else {
        PathBuf::from(log_file)
    };
    let file_writer = RotatingFileWriter::new(path)?;
    let writer = TeeWriter::new(file_writer);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "schedulerd=info,sqlx=warn".into());

    tracing_subscriber::fmt()
        .event_format(PlainFormatter)
        .with_writer(writer)
        .with_env_filter(filter)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_past_byte_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rot.log");
        let mut writer = RotatingFileWriter::with_limits(&path, 10, 2).unwrap();
        writer.write_all(b"0123456789").unwrap();
        writer.write_all(b"0123456789").unwrap();
        writer.flush().unwrap();
        assert!(dir.path().join("rot.log.1").exists());
    }
}
