use std::{fmt, sync::Arc};

use crate::capability::{BoxError, Filterer, Serializer, Writer};

/// Zero-argument constructor of a pipeline component.
pub type Factory<T> = Arc<dyn Fn() -> Result<Arc<T>, BoxError> + Send + Sync>;
pub type FilterFactory = Factory<dyn Filterer>;
pub type SerializerFactory = Factory<dyn Serializer>;
pub type WriterFactory = Factory<dyn Writer>;

/// Wraps a closure building a concrete filter into a [`FilterFactory`].
pub fn filter_factory<T, F>(factory: F) -> FilterFactory
where
    T: Filterer + 'static,
    F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
{
    Arc::new(move || factory().map(|f| Arc::new(f) as Arc<dyn Filterer>))
}

/// Wraps a closure building a concrete serializer into a [`SerializerFactory`].
pub fn serializer_factory<T, F>(factory: F) -> SerializerFactory
where
    T: Serializer + 'static,
    F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
{
    Arc::new(move || factory().map(|s| Arc::new(s) as Arc<dyn Serializer>))
}

/// Wraps a closure building a concrete writer into a [`WriterFactory`].
pub fn writer_factory<T, F>(factory: F) -> WriterFactory
where
    T: Writer + 'static,
    F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
{
    Arc::new(move || factory().map(|w| Arc::new(w) as Arc<dyn Writer>))
}

/// The three factory collections a [`PipelineTuple`](crate::PipelineTuple)
/// indexes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Filter,
    Serializer,
    Writer,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Filter, Collection::Serializer, Collection::Writer];
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Collection::Filter => "filter",
            Collection::Serializer => "serializer",
            Collection::Writer => "writer",
        })
    }
}

/// Ordered factory collections. Factories are identified by their position
/// only; a `None` slot is rejected when the engine is built.
#[derive(Clone, Default)]
pub struct Registry {
    pub filters: Vec<Option<FilterFactory>>,
    pub serializers: Vec<Option<SerializerFactory>>,
    pub writers: Vec<Option<WriterFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter factory.
    pub fn with_filter<T, F>(mut self, factory: F) -> Self
    where
        T: Filterer + 'static,
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.filters.push(Some(filter_factory(factory)));
        self
    }

    /// Appends a serializer factory.
    pub fn with_serializer<T, F>(mut self, factory: F) -> Self
    where
        T: Serializer + 'static,
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.serializers.push(Some(serializer_factory(factory)));
        self
    }

    /// Appends a writer factory.
    pub fn with_writer<T, F>(mut self, factory: F) -> Self
    where
        T: Writer + 'static,
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.writers.push(Some(writer_factory(factory)));
        self
    }

    /// Appends an already boxed writer factory, e.g. one of the combinators
    /// that wrap other writer factories.
    pub fn with_writer_factory(mut self, factory: WriterFactory) -> Self {
        self.writers.push(Some(factory));
        self
    }

    pub fn len(&self, collection: Collection) -> usize {
        match collection {
            Collection::Filter => self.filters.len(),
            Collection::Serializer => self.serializers.len(),
            Collection::Writer => self.writers.len(),
        }
    }

    pub(crate) fn is_missing(&self, collection: Collection, index: usize) -> bool {
        match collection {
            Collection::Filter => self.filters[index].is_none(),
            Collection::Serializer => self.serializers[index].is_none(),
            Collection::Writer => self.writers[index].is_none(),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("filters", &self.filters.len())
            .field("serializers", &self.serializers.len())
            .field("writers", &self.writers.len())
            .finish()
    }
}
