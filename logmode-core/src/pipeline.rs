use std::{borrow::Cow, fmt, sync::Arc};

use crate::{
    capability::{Filterer, Serializer, Writer},
    error::PipelineError,
    mode::PipelineTuple,
    record::Field,
    state::{ResourceState, Slot},
};

type PipelineFn = dyn Fn(&[Field]) -> Result<(), PipelineError> + Send + Sync;

/// The function installed for a level: either a compiled pipeline or the
/// no-op used for levels the active mode does not route.
#[derive(Clone, Default)]
pub struct LogFn(Option<Arc<PipelineFn>>);

impl LogFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Field]) -> Result<(), PipelineError> + Send + Sync + 'static,
    {
        Self(Some(Arc::new(f)))
    }

    pub const fn noop() -> Self {
        Self(None)
    }

    pub fn is_noop(&self) -> bool {
        self.0.is_none()
    }

    /// True when both are the no-op or both are the same compiled pipeline.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    pub fn call(&self, fields: &[Field]) -> Result<(), PipelineError> {
        match &self.0 {
            Some(f) => f(fields),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for LogFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_noop() { "LogFn(noop)" } else { "LogFn(..)" })
    }
}

/// A tuple resolved against the resource state it was compiled from.
struct Route {
    tuple: PipelineTuple,
    filter: Arc<Slot<dyn Filterer>>,
    serializer: Arc<Slot<dyn Serializer>>,
    writer: Arc<Slot<dyn Writer>>,
}

impl Route {
    fn write(&self, fields: &[Field]) -> Result<(), PipelineError> {
        self.serializer
            .serialize(&**self.writer, fields)
            .map_err(|source| PipelineError::Serialize {
                serializer: self.tuple.serializer,
                writer: self.tuple.writer,
                source,
            })
    }
}

fn filter<'a>(
    filter: &dyn Filterer,
    index: usize,
    fields: &'a [Field],
) -> Result<Cow<'a, [Field]>, PipelineError> {
    filter
        .filter(fields)
        .map_err(|source| PipelineError::Filter { index, source })
}

/// Compiles the tuples of one level into a [`LogFn`]. The instances are
/// captured when this is called, so a later transition never changes what an
/// already installed function does, and a retired instance stays open until
/// every function capturing it is gone.
///
/// When every tuple shares one filter, the filter runs once per call and all
/// writers receive the same entries. Otherwise each tuple filters on its own,
/// and the first tuple whose filter returns nothing ends the call.
pub(crate) fn compile(resources: &ResourceState, tuples: &[PipelineTuple]) -> LogFn {
    let routes: Vec<Route> = tuples
        .iter()
        .map(|&tuple| Route {
            tuple,
            filter: Arc::clone(
                resources.filters[tuple.filter]
                    .as_ref()
                    .expect("filter required by the mode is built"),
            ),
            serializer: Arc::clone(
                resources.serializers[tuple.serializer]
                    .as_ref()
                    .expect("serializer required by the mode is built"),
            ),
            writer: Arc::clone(
                resources.writers[tuple.writer]
                    .as_ref()
                    .expect("writer required by the mode is built"),
            ),
        })
        .collect();

    let shared_filter = match routes.split_first() {
        Some((first, rest)) if rest.iter().all(|r| r.tuple.filter == first.tuple.filter) => {
            Some((Arc::clone(&first.filter), first.tuple.filter))
        }
        _ => None,
    };

    match shared_filter {
        Some((shared, index)) => LogFn::new(move |fields| {
            let kv = filter(&**shared, index, fields)?;
            if kv.is_empty() {
                return Ok(());
            }
            for route in &routes {
                route.write(&kv)?;
            }
            Ok(())
        }),
        None => LogFn::new(move |fields| {
            for route in &routes {
                let kv = filter(&**route.filter, route.tuple.filter, fields)?;
                if kv.is_empty() {
                    return Ok(());
                }
                route.write(&kv)?;
            }
            Ok(())
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        capability::{BoxError, FilterFn},
        record,
        registry::{Collection, Registry},
        state::Disposable,
        testing::{DropAll, Recorder, Sink, TaggedSerializer, identity},
    };

    /// Tags each record with a per-call counter so tests can tell whether
    /// the filter ran once or once per tuple.
    struct Stamp(AtomicUsize);

    impl Filterer for Stamp {
        fn filter<'a>(&self, fields: &'a [Field]) -> Result<Cow<'a, [Field]>, BoxError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            let mut out = fields.to_vec();
            out.push(Field::new("n", n));
            Ok(Cow::Owned(out))
        }
    }

    fn slots<T: ?Sized + Disposable>(
        collection: Collection,
        instances: Vec<Arc<T>>,
    ) -> Vec<Option<Arc<Slot<T>>>> {
        instances
            .into_iter()
            .enumerate()
            .map(|(i, instance)| Some(Slot::new(collection, i, instance)))
            .collect()
    }

    fn state(
        filters: Vec<Arc<dyn Filterer>>,
        serializers: Vec<Arc<dyn Serializer>>,
        writers: Vec<Arc<dyn Writer>>,
    ) -> ResourceState {
        let mut s = ResourceState::empty(&Registry::default());
        s.filters = slots(Collection::Filter, filters);
        s.serializers = slots(Collection::Serializer, serializers);
        s.writers = slots(Collection::Writer, writers);
        s
    }

    #[test]
    fn test_noop() {
        let f = LogFn::noop();
        assert!(f.is_noop());
        assert!(f.call(&record!["msg" => "x"]).is_ok());
    }

    #[test]
    fn test_shared_filter_runs_once() {
        let (x, y) = (Sink::default(), Sink::default());
        let s = state(
            vec![Arc::new(Stamp(AtomicUsize::new(0)))],
            vec![
                Arc::new(TaggedSerializer::new("a")),
                Arc::new(TaggedSerializer::new("b")),
            ],
            vec![Arc::new(Recorder::new(&x)), Arc::new(Recorder::new(&y))],
        );
        let f = compile(
            &s,
            &[PipelineTuple::new(0, 0, 0), PipelineTuple::new(0, 1, 1)],
        );
        f.call(&record!["msg" => "hi"]).unwrap();
        assert_eq!(x.lines(), ["#0 a|msg=hi n=0"]);
        assert_eq!(y.lines(), ["#0 b|msg=hi n=0"]);
    }

    #[test]
    fn test_per_tuple_filters_run_independently() {
        let (x, y) = (Sink::default(), Sink::default());
        let s = state(
            vec![
                Arc::new(Stamp(AtomicUsize::new(0))),
                Arc::new(Stamp(AtomicUsize::new(10))),
            ],
            vec![Arc::new(TaggedSerializer::new("a"))],
            vec![Arc::new(Recorder::new(&x)), Arc::new(Recorder::new(&y))],
        );
        let f = compile(
            &s,
            &[PipelineTuple::new(0, 0, 0), PipelineTuple::new(1, 0, 1)],
        );
        f.call(&record!["msg" => "hi"]).unwrap();
        assert_eq!(x.lines(), ["#0 a|msg=hi n=0"]);
        assert_eq!(y.lines(), ["#0 a|msg=hi n=10"]);
    }

    #[test]
    fn test_shared_filter_suppression_skips_all_writers() {
        let x = Sink::default();
        let s = state(
            vec![Arc::new(DropAll)],
            vec![Arc::new(TaggedSerializer::new("a"))],
            vec![Arc::new(Recorder::new(&x))],
        );
        let f = compile(&s, &[PipelineTuple::new(0, 0, 0)]);
        assert!(f.call(&record!["msg" => "hidden"]).is_ok());
        assert_eq!(x.len(), 0);
    }

    #[test]
    fn test_per_tuple_suppression_ends_the_call() {
        let (x, y) = (Sink::default(), Sink::default());
        let s = state(
            vec![Arc::new(identity()), Arc::new(DropAll)],
            vec![Arc::new(TaggedSerializer::new("a"))],
            vec![Arc::new(Recorder::new(&x)), Arc::new(Recorder::new(&y))],
        );
        // the dropping filter comes first: nothing reaches the second route
        let f = compile(
            &s,
            &[PipelineTuple::new(1, 0, 1), PipelineTuple::new(0, 0, 0)],
        );
        assert!(f.call(&record!["msg" => "x"]).is_ok());
        assert_eq!(x.len(), 0);
        assert_eq!(y.len(), 0);
    }

    #[test]
    fn test_first_failure_aborts_remaining_routes() {
        let (x, y) = (Sink::default(), Sink::default());
        let closed = Recorder::new(&x);
        closed.release().unwrap();
        let s = state(
            vec![Arc::new(identity())],
            vec![Arc::new(TaggedSerializer::new("a"))],
            vec![Arc::new(closed), Arc::new(Recorder::new(&y))],
        );
        let f = compile(
            &s,
            &[PipelineTuple::new(0, 0, 0), PipelineTuple::new(0, 0, 1)],
        );
        let err = f.call(&record!["msg" => "x"]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Serialize {
                serializer: 0,
                writer: 0,
                ..
            }
        ));
        assert_eq!(y.len(), 0);
    }

    #[test]
    fn test_filter_error_is_reported() {
        let x = Sink::default();
        let failing =
            FilterFn(|_: &[Field]| -> Result<Vec<Field>, BoxError> { Err("bad entry".into()) });
        let s = state(
            vec![Arc::new(failing)],
            vec![Arc::new(TaggedSerializer::new("a"))],
            vec![Arc::new(Recorder::new(&x))],
        );
        let f = compile(&s, &[PipelineTuple::new(0, 0, 0)]);
        let err = f.call(&record!["msg" => "x"]).unwrap_err();
        assert!(matches!(err, PipelineError::Filter { index: 0, .. }));
        assert_eq!(x.len(), 0);
    }
}
