use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use logmode_core::{BoxError, Writer, WriterFactory, writer_factory};

/// The process's standard output. Never released by the engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutWriter;

impl Writer for StdoutWriter {
    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(buf)?;
        out.flush()
    }

    fn is_shared_stream(&self) -> bool {
        true
    }
}

/// The process's standard error. Never released by the engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrWriter;

impl Writer for StderrWriter {
    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        let mut out = io::stderr().lock();
        out.write_all(buf)?;
        out.flush()
    }

    fn is_shared_stream(&self) -> bool {
        true
    }
}

/// Appends to a file, creating it if needed. Released writers reject further
/// writes; reloading the mode opens the path again, which picks up a file
/// that was moved away by log rotation.
#[derive(Debug)]
pub struct FileWriter {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileWriter {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, io::Error> {
        let file = File::options()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Writer for FileWriter {
    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        match file.as_mut() {
            Some(file) => file.write_all(buf),
            None => Err(io::Error::other(format!(
                "{} is closed",
                self.path.display()
            ))),
        }
    }

    fn release(&self) -> io::Result<()> {
        let file = self
            .file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match file {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }
}

/// Serializes access to any [`io::Write`].
#[derive(Debug)]
pub struct SyncWriter<W> {
    inner: Mutex<W>,
}

impl<W: Write + Send> SyncWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Writer for SyncWriter<W> {
    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_all(buf)
    }

    fn release(&self) -> io::Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

/// Sends every write to all children, in order, stopping at the first
/// failure. Releasing it releases every child that is not a shared stream.
pub struct MultiWriter {
    writers: Vec<Arc<dyn Writer>>,
}

impl MultiWriter {
    pub fn new(writers: Vec<Arc<dyn Writer>>) -> Self {
        Self { writers }
    }
}

fn release_all(writers: &[Arc<dyn Writer>]) -> io::Result<()> {
    let errors: Vec<String> = writers
        .iter()
        .filter(|w| !w.is_shared_stream())
        .filter_map(|w| w.release().err())
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "error(s) releasing multi writer: {}",
            errors.join("; ")
        )))
    }
}

impl Writer for MultiWriter {
    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        for writer in &self.writers {
            writer.write_record(buf)?;
        }
        Ok(())
    }

    fn release(&self) -> io::Result<()> {
        release_all(&self.writers)
    }
}

/// Truncates each write to at most `max` bytes.
pub struct LimitWriter {
    inner: Arc<dyn Writer>,
    max: usize,
}

impl LimitWriter {
    pub fn new(inner: Arc<dyn Writer>, max: usize) -> Self {
        Self { inner, max }
    }
}

impl Writer for LimitWriter {
    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_record(&buf[..buf.len().min(self.max)])
    }

    fn release(&self) -> io::Result<()> {
        self.inner.release()
    }

    fn is_shared_stream(&self) -> bool {
        self.inner.is_shared_stream()
    }
}

const RS: u8 = 0x1e;

/// Frames each write as a JSON text sequence record (RFC 7464): `RS`, the
/// payload, and a trailing `LF` unless the payload already ends with one.
pub struct RecordSeparatorWriter {
    inner: Arc<dyn Writer>,
}

impl RecordSeparatorWriter {
    pub fn new(inner: Arc<dyn Writer>) -> Self {
        Self { inner }
    }
}

impl Writer for RecordSeparatorWriter {
    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        let mut framed = Vec::with_capacity(buf.len() + 2);
        framed.push(RS);
        framed.extend_from_slice(buf);
        if buf.last() != Some(&b'\n') {
            framed.push(b'\n');
        }
        self.inner.write_record(&framed)
    }

    fn release(&self) -> io::Result<()> {
        self.inner.release()
    }

    fn is_shared_stream(&self) -> bool {
        self.inner.is_shared_stream()
    }
}

pub fn stdout_writer() -> WriterFactory {
    writer_factory(|| Ok(StdoutWriter))
}

pub fn stderr_writer() -> WriterFactory {
    writer_factory(|| Ok(StderrWriter))
}

/// Opens `path` for appending each time the factory runs.
pub fn file_writer<P: Into<PathBuf>>(path: P) -> WriterFactory {
    let path = path.into();
    writer_factory(move || Ok(FileWriter::open(&path)?))
}

/// Builds every child; if one fails, the children already built are
/// released and the error is returned.
pub fn multi_writer(factories: Vec<WriterFactory>) -> WriterFactory {
    Arc::new(move || -> Result<Arc<dyn Writer>, BoxError> {
        let mut writers: Vec<Arc<dyn Writer>> = Vec::with_capacity(factories.len());
        for factory in &factories {
            match factory() {
                Ok(writer) => writers.push(writer),
                Err(err) => {
                    if let Err(release) = release_all(&writers) {
                        log::warn!("{release}");
                    }
                    return Err(err);
                }
            }
        }
        Ok(Arc::new(MultiWriter::new(writers)))
    })
}

pub fn limit_writer(factory: WriterFactory, max: usize) -> WriterFactory {
    Arc::new(move || -> Result<Arc<dyn Writer>, BoxError> {
        Ok(Arc::new(LimitWriter::new(factory()?, max)))
    })
}

pub fn record_separator_writer(factory: WriterFactory) -> WriterFactory {
    Arc::new(move || -> Result<Arc<dyn Writer>, BoxError> {
        Ok(Arc::new(RecordSeparatorWriter::new(factory()?)))
    })
}
