use crate::{
    error::ValidationError,
    level::Level,
    registry::{Collection, Registry},
};

/// One route: indices into the filter, serializer and writer collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineTuple {
    pub filter: usize,
    pub serializer: usize,
    pub writer: usize,
}

impl PipelineTuple {
    pub const fn new(filter: usize, serializer: usize, writer: usize) -> Self {
        Self {
            filter,
            serializer,
            writer,
        }
    }

    pub const fn index(&self, collection: Collection) -> usize {
        match collection {
            Collection::Filter => self.filter,
            Collection::Serializer => self.serializer,
            Collection::Writer => self.writer,
        }
    }
}

impl From<(usize, usize, usize)> for PipelineTuple {
    fn from((filter, serializer, writer): (usize, usize, usize)) -> Self {
        Self::new(filter, serializer, writer)
    }
}

/// A complete routing configuration: for each level either the tuples the
/// level is fed through, or nothing (the level is a no-op in this mode).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mode {
    routes: [Option<Vec<PipelineTuple>>; Level::COUNT],
}

impl Mode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `level` through `tuples`, replacing any previous route.
    pub fn route<I, T>(mut self, level: Level, tuples: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<PipelineTuple>,
    {
        self.set_route(level, tuples.into_iter().map(Into::into).collect());
        self
    }

    pub fn set_route(&mut self, level: Level, tuples: Vec<PipelineTuple>) {
        self.routes[level.index()] = Some(tuples);
    }

    /// Makes `level` inactive in this mode.
    pub fn remove_route(&mut self, level: Level) {
        self.routes[level.index()] = None;
    }

    pub fn pipeline(&self, level: Level) -> Option<&[PipelineTuple]> {
        self.routes[level.index()].as_deref()
    }

    pub fn is_active(&self, level: Level) -> bool {
        self.routes[level.index()].is_some()
    }

    /// Declared levels with their tuples, in [`Level::ALL`] order.
    pub fn routes(&self) -> impl Iterator<Item = (Level, &[PipelineTuple])> {
        Level::ALL
            .into_iter()
            .filter_map(|level| self.pipeline(level).map(|tuples| (level, tuples)))
    }

    /// Marks which indices of `collection` this mode uses. Indices past `len`
    /// are ignored; validation rejects them up front.
    pub(crate) fn required(&self, collection: Collection, len: usize) -> Vec<bool> {
        let mut required = vec![false; len];
        for (_, tuples) in self.routes() {
            for tuple in tuples {
                if let Some(slot) = required.get_mut(tuple.index(collection)) {
                    *slot = true;
                }
            }
        }
        required
    }
}

/// Checks a mode table against a registry: indices in range, no empty
/// pipeline, every factory referenced, no missing factory.
pub fn validate(registry: &Registry, modes: &[Mode]) -> Result<(), ValidationError> {
    if modes.is_empty() {
        return Err(ValidationError::EmptyModeTable);
    }
    for (mode, m) in modes.iter().enumerate() {
        for (level, tuples) in m.routes() {
            for tuple in tuples {
                for collection in Collection::ALL {
                    let index = tuple.index(collection);
                    let len = registry.len(collection);
                    if index >= len {
                        return Err(ValidationError::IndexOutOfRange {
                            collection,
                            mode,
                            level,
                            index,
                            len,
                        });
                    }
                }
            }
        }
    }
    for (mode, m) in modes.iter().enumerate() {
        if let Some((level, _)) = m.routes().find(|(_, tuples)| tuples.is_empty()) {
            return Err(ValidationError::EmptyPipeline { mode, level });
        }
    }
    for collection in Collection::ALL {
        let len = registry.len(collection);
        let mut referenced = vec![false; len];
        for m in modes {
            for (slot, used) in referenced.iter_mut().zip(m.required(collection, len)) {
                *slot |= used;
            }
        }
        if let Some(index) = referenced.iter().position(|used| !used) {
            return Err(ValidationError::UnusedFactory { collection, index });
        }
    }
    for collection in Collection::ALL {
        if let Some(index) =
            (0..registry.len(collection)).find(|&i| registry.is_missing(collection, i))
        {
            return Err(ValidationError::MissingFactory { collection, index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorder, TaggedSerializer, identity};

    fn registry(filters: usize, serializers: usize, writers: usize) -> Registry {
        let mut r = Registry::new();
        for _ in 0..filters {
            r = r.with_filter(|| Ok(identity()));
        }
        for i in 0..serializers {
            r = r.with_serializer(move || Ok(TaggedSerializer::new(&format!("s{i}"))));
        }
        for _ in 0..writers {
            r = r.with_writer(|| Ok(Recorder::default()));
        }
        r
    }

    fn two_modes() -> Vec<Mode> {
        vec![
            Mode::new()
                .route(Level::Error, [(0, 0, 0), (0, 1, 1)])
                .route(Level::Warn, [(0, 0, 0), (0, 1, 1)]),
            Mode::new()
                .route(Level::Error, [(0, 0, 0), (0, 1, 1)])
                .route(Level::Warn, [(0, 0, 0), (0, 1, 1)])
                .route(Level::Debug, [(0, 0, 0), (0, 1, 1)])
                .route(Level::Info, [(0, 0, 0), (0, 1, 1)]),
        ]
    }

    #[test]
    fn test_valid_table() {
        assert_eq!(validate(&registry(1, 2, 2), &two_modes()), Ok(()));
    }

    #[test]
    fn test_serializer_index_equal_to_len_is_out_of_range() {
        let mut modes = two_modes();
        modes[0].set_route(Level::Error, vec![PipelineTuple::new(0, 0, 0), PipelineTuple::new(0, 2, 1)]);
        assert_eq!(
            validate(&registry(1, 2, 2), &modes),
            Err(ValidationError::IndexOutOfRange {
                collection: Collection::Serializer,
                mode: 0,
                level: Level::Error,
                index: 2,
                len: 2,
            })
        );
    }

    #[test]
    fn test_filter_and_writer_out_of_range() {
        let mut modes = two_modes();
        modes[1].set_route(Level::Debug, vec![PipelineTuple::new(0, 0, 3)]);
        assert!(matches!(
            validate(&registry(1, 2, 2), &modes),
            Err(ValidationError::IndexOutOfRange {
                collection: Collection::Writer,
                mode: 1,
                level: Level::Debug,
                index: 3,
                ..
            })
        ));
        let mut modes = two_modes();
        modes[0].set_route(Level::Warn, vec![PipelineTuple::new(1, 0, 0), PipelineTuple::new(0, 1, 1)]);
        assert!(matches!(
            validate(&registry(1, 2, 2), &modes),
            Err(ValidationError::IndexOutOfRange {
                collection: Collection::Filter,
                index: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_pipeline() {
        let mut modes = two_modes();
        modes[1].set_route(Level::Audit, Vec::new());
        assert_eq!(
            validate(&registry(1, 2, 2), &modes),
            Err(ValidationError::EmptyPipeline {
                mode: 1,
                level: Level::Audit
            })
        );
    }

    #[test]
    fn test_unused_factories() {
        let modes = two_modes();
        assert_eq!(
            validate(&registry(2, 2, 2), &modes),
            Err(ValidationError::UnusedFactory {
                collection: Collection::Filter,
                index: 1
            })
        );
        assert_eq!(
            validate(&registry(1, 3, 2), &modes),
            Err(ValidationError::UnusedFactory {
                collection: Collection::Serializer,
                index: 2
            })
        );
        assert_eq!(
            validate(&registry(1, 2, 3), &modes),
            Err(ValidationError::UnusedFactory {
                collection: Collection::Writer,
                index: 2
            })
        );
    }

    #[test]
    fn test_missing_factory() {
        let mut r = registry(1, 2, 2);
        r.writers[1] = None;
        assert_eq!(
            validate(&r, &two_modes()),
            Err(ValidationError::MissingFactory {
                collection: Collection::Writer,
                index: 1
            })
        );
    }

    #[test]
    fn test_empty_mode_table() {
        assert_eq!(
            validate(&Registry::new(), &[]),
            Err(ValidationError::EmptyModeTable)
        );
    }

    #[test]
    fn test_required_is_union_over_levels() {
        let mode = Mode::new()
            .route(Level::Error, [(0, 0, 1)])
            .route(Level::Audit, [(0, 2, 3)]);
        assert_eq!(
            mode.required(Collection::Writer, 4),
            [false, true, false, true]
        );
        assert_eq!(
            mode.required(Collection::Serializer, 3),
            [true, false, true]
        );
    }
}
