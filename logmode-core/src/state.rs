use std::{
    fmt,
    ops::Deref,
    sync::{Arc, OnceLock},
};

use crossbeam_channel::Sender;

use crate::{
    capability::{BoxError, Filterer, Serializer, Writer},
    error::{DisposalError, Error},
    mode::Mode,
    registry::{Collection, Factory, Registry},
};

/// What the engine needs to tear an instance down.
pub(crate) trait Disposable {
    fn dispose(&self) -> Result<(), BoxError>;

    fn keep_open(&self) -> bool {
        false
    }
}

impl Disposable for dyn Filterer {
    fn dispose(&self) -> Result<(), BoxError> {
        self.release()
    }
}

impl Disposable for dyn Serializer {
    fn dispose(&self) -> Result<(), BoxError> {
        self.release()
    }
}

impl Disposable for dyn Writer {
    fn dispose(&self) -> Result<(), BoxError> {
        self.release().map_err(Into::into)
    }

    fn keep_open(&self) -> bool {
        self.is_shared_stream()
    }
}

/// A built instance, shared by the resource state and every compiled
/// pipeline that routes through it.
///
/// Retiring a slot does not release the instance. The release runs when the
/// last handle is dropped, so log calls that started on an older pipeline
/// finish on the instances they captured.
pub(crate) struct Slot<T: ?Sized + Disposable> {
    collection: Collection,
    index: usize,
    instance: Arc<T>,
    retired: OnceLock<Sender<DisposalError>>,
}

impl<T: ?Sized + Disposable> Slot<T> {
    pub(crate) fn new(collection: Collection, index: usize, instance: Arc<T>) -> Arc<Self> {
        Arc::new(Self {
            collection,
            index,
            instance,
            retired: OnceLock::new(),
        })
    }

    /// Marks the instance for release once no handle is left. Failures are
    /// logged and sent to `reports`.
    fn retire(self: Arc<Self>, reports: &Sender<DisposalError>) {
        if self.retired.set(reports.clone()).is_err() {
            log::debug!("{} {} already retired", self.collection, self.index);
        }
    }
}

impl<T: ?Sized + Disposable> Deref for Slot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T: ?Sized + Disposable> Drop for Slot<T> {
    fn drop(&mut self) {
        let Some(reports) = self.retired.get() else {
            return;
        };
        if self.instance.keep_open() {
            log::debug!("keeping shared stream {} {} open", self.collection, self.index);
            return;
        }
        if let Err(source) = self.instance.dispose() {
            let report = DisposalError {
                collection: self.collection,
                index: self.index,
                source,
            };
            log::warn!("{report}: {}", report.source);
            if reports.try_send(report).is_err() {
                log::debug!("disposal report dropped, channel full");
            }
        }
    }
}

impl<T: ?Sized + Disposable> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({} {})", self.collection, self.index)
    }
}

/// Instances built for the active mode, stored at the index of the factory
/// that built them. Slots the mode does not use are `None`.
#[derive(Clone)]
pub(crate) struct ResourceState {
    pub(crate) filters: Vec<Option<Arc<Slot<dyn Filterer>>>>,
    pub(crate) serializers: Vec<Option<Arc<Slot<dyn Serializer>>>>,
    pub(crate) writers: Vec<Option<Arc<Slot<dyn Writer>>>>,
}

impl ResourceState {
    pub(crate) fn empty(registry: &Registry) -> Self {
        Self {
            filters: vec![None; registry.filters.len()],
            serializers: vec![None; registry.serializers.len()],
            writers: vec![None; registry.writers.len()],
        }
    }

    /// Number of populated slots in `collection`.
    pub(crate) fn live(&self, collection: Collection) -> usize {
        match collection {
            Collection::Filter => self.filters.iter().flatten().count(),
            Collection::Serializer => self.serializers.iter().flatten().count(),
            Collection::Writer => self.writers.iter().flatten().count(),
        }
    }
}

/// A slot leaving the live state.
pub(crate) enum Resource {
    Filter(Arc<Slot<dyn Filterer>>),
    Serializer(Arc<Slot<dyn Serializer>>),
    Writer(Arc<Slot<dyn Writer>>),
}

impl Resource {
    fn retire(self, reports: &Sender<DisposalError>) {
        match self {
            Resource::Filter(slot) => slot.retire(reports),
            Resource::Serializer(slot) => slot.retire(reports),
            Resource::Writer(slot) => slot.retire(reports),
        }
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> (Collection, usize) {
        match self {
            Resource::Filter(slot) => (slot.collection, slot.index),
            Resource::Serializer(slot) => (slot.collection, slot.index),
            Resource::Writer(slot) => (slot.collection, slot.index),
        }
    }
}

/// Outcome of planning a transition: the state to commit and what to retire
/// once it is committed.
pub(crate) struct Transition {
    pub(crate) resources: ResourceState,
    pub(crate) retired: Vec<Resource>,
}

/// Computes the resources `mode` needs starting from `current`, building what
/// is missing (or everything when `recreate` is set). Nothing in `current` is
/// touched; on a factory failure every instance built here is retired before
/// the error is returned.
pub(crate) fn plan(
    registry: &Registry,
    current: &ResourceState,
    mode: &Mode,
    recreate: bool,
    reports: &Sender<DisposalError>,
) -> Result<Transition, Error> {
    let mut built = Vec::new();
    let mut retired = Vec::new();
    let result = rebuild_all(registry, current, mode, recreate, &mut built, &mut retired);
    match result {
        Ok(resources) => Ok(Transition { resources, retired }),
        Err(err) => {
            retire(built, reports);
            Err(err)
        }
    }
}

fn rebuild_all(
    registry: &Registry,
    current: &ResourceState,
    mode: &Mode,
    recreate: bool,
    built: &mut Vec<Resource>,
    retired: &mut Vec<Resource>,
) -> Result<ResourceState, Error> {
    let filters = rebuild(
        Slots {
            collection: Collection::Filter,
            current: &current.filters,
            factories: &registry.filters,
            wrap: Resource::Filter,
        },
        mode,
        recreate,
        built,
        retired,
    )?;
    let serializers = rebuild(
        Slots {
            collection: Collection::Serializer,
            current: &current.serializers,
            factories: &registry.serializers,
            wrap: Resource::Serializer,
        },
        mode,
        recreate,
        built,
        retired,
    )?;
    let writers = rebuild(
        Slots {
            collection: Collection::Writer,
            current: &current.writers,
            factories: &registry.writers,
            wrap: Resource::Writer,
        },
        mode,
        recreate,
        built,
        retired,
    )?;
    Ok(ResourceState {
        filters,
        serializers,
        writers,
    })
}

struct Slots<'a, T: ?Sized + Disposable> {
    collection: Collection,
    current: &'a [Option<Arc<Slot<T>>>],
    factories: &'a [Option<Factory<T>>],
    wrap: fn(Arc<Slot<T>>) -> Resource,
}

fn rebuild<T: ?Sized + Disposable>(
    slots: Slots<'_, T>,
    mode: &Mode,
    recreate: bool,
    built: &mut Vec<Resource>,
    retired: &mut Vec<Resource>,
) -> Result<Vec<Option<Arc<Slot<T>>>>, Error> {
    let Slots {
        collection,
        current,
        factories,
        wrap,
    } = slots;
    let required = mode.required(collection, factories.len());
    let mut next = Vec::with_capacity(factories.len());
    for (index, (factory, needed)) in factories.iter().zip(required).enumerate() {
        let existing = current.get(index).cloned().flatten();
        if !needed {
            if let Some(old) = existing {
                retired.push(wrap(old));
            }
            next.push(None);
            continue;
        }
        match existing {
            Some(old) if !recreate => next.push(Some(old)),
            existing => {
                let Some(factory) = factory else {
                    return Err(Error::Factory {
                        collection,
                        index,
                        source: "factory slot is empty".into(),
                    });
                };
                let instance = factory().map_err(|source| Error::Factory {
                    collection,
                    index,
                    source,
                })?;
                let fresh = Slot::new(collection, index, instance);
                built.push(wrap(Arc::clone(&fresh)));
                if let Some(old) = existing {
                    retired.push(wrap(old));
                }
                next.push(Some(fresh));
            }
        }
    }
    Ok(next)
}

/// Retires every resource. Each one is released as soon as no compiled
/// pipeline holds it any more, which is immediately unless a log call is
/// still running on it. Shared process streams are never released.
pub(crate) fn retire(resources: Vec<Resource>, reports: &Sender<DisposalError>) {
    for resource in resources {
        resource.retire(reports);
    }
}
