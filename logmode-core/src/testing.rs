//! Recording collaborators shared by the unit tests.

use std::{
    borrow::Cow,
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crate::{
    capability::{BoxError, Filterer, Serializer, Writer},
    record::Field,
};

pub(crate) struct IdentityFilter;

impl Filterer for IdentityFilter {
    fn filter<'a>(&self, fields: &'a [Field]) -> Result<Cow<'a, [Field]>, BoxError> {
        Ok(Cow::Borrowed(fields))
    }
}

pub(crate) fn identity() -> IdentityFilter {
    IdentityFilter
}

/// Suppresses every record.
pub(crate) struct DropAll;

impl Filterer for DropAll {
    fn filter<'a>(&self, _: &'a [Field]) -> Result<Cow<'a, [Field]>, BoxError> {
        Ok(Cow::Owned(Vec::new()))
    }
}

/// Writes `tag|k=v k=v` in one write.
pub(crate) struct TaggedSerializer {
    tag: String,
}

impl TaggedSerializer {
    pub(crate) fn new(tag: &str) -> Self {
        Self { tag: tag.into() }
    }
}

impl Serializer for TaggedSerializer {
    fn serialize(&self, writer: &dyn Writer, fields: &[Field]) -> Result<(), BoxError> {
        let body: Vec<String> = fields
            .iter()
            .map(|f| format!("{}={}", f.key, f.value))
            .collect();
        writer.write_record(format!("{}|{}", self.tag, body.join(" ")).as_bytes())?;
        Ok(())
    }
}

/// Lines written to every [`Recorder`] sharing this sink.
#[derive(Clone, Default)]
pub(crate) struct Sink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Sink {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.lines.lock().unwrap().len()
    }
}

/// Build and release counters of one factory.
#[derive(Default)]
pub(crate) struct Lifecycle {
    built: AtomicUsize,
    released: AtomicUsize,
}

impl Lifecycle {
    pub(crate) fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct Recorder {
    sink: Sink,
    id: usize,
    lifecycle: Option<Arc<Lifecycle>>,
    shared: bool,
    fail_release: bool,
    closed: AtomicBool,
}

impl Recorder {
    pub(crate) fn new(sink: &Sink) -> Self {
        Self {
            sink: sink.clone(),
            ..Self::default()
        }
    }

    /// Counts this instance as built by `lifecycle`; the instance id is the
    /// build sequence number, starting at 1.
    pub(crate) fn tracked(mut self, lifecycle: &Arc<Lifecycle>) -> Self {
        self.id = lifecycle.built.fetch_add(1, Ordering::SeqCst) + 1;
        self.lifecycle = Some(Arc::clone(lifecycle));
        self
    }

    pub(crate) fn shared_stream(mut self) -> Self {
        self.shared = true;
        self
    }

    pub(crate) fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }
}

impl Writer for Recorder {
    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::other("writer released"));
        }
        let line = format!("#{} {}", self.id, String::from_utf8_lossy(buf));
        self.sink.lines.lock().unwrap().push(line);
        Ok(())
    }

    fn release(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.released.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail_release {
            return Err(io::Error::other("release refused"));
        }
        Ok(())
    }

    fn is_shared_stream(&self) -> bool {
        self.shared
    }
}
