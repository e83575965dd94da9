use std::io;

use thiserror::Error;

use crate::{capability::BoxError, level::Level, registry::Collection};

/// Problems found while checking a registry against a mode table. The engine
/// is not created when any of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("mode table is empty")]
    EmptyModeTable,
    #[error("{collection} reference {index} in mode {mode} ({level}) is out of range ({len})")]
    IndexOutOfRange {
        collection: Collection,
        mode: usize,
        level: Level,
        index: usize,
        len: usize,
    },
    #[error("mode {mode} declares an empty pipeline for {level}")]
    EmptyPipeline { mode: usize, level: Level },
    #[error("{collection} factory {index} is not referenced by any mode")]
    UnusedFactory { collection: Collection, index: usize },
    #[error("{collection} factory {index} is missing")]
    MissingFactory { collection: Collection, index: usize },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("mode {index} is out of range ({len} modes)")]
    ModeOutOfRange { index: usize, len: usize },
    #[error("failed to build {collection} {index}")]
    Factory {
        collection: Collection,
        index: usize,
        #[source]
        source: BoxError,
    },
    #[error("unable to subscribe to control signals")]
    Signal(#[source] io::Error),
}

/// Failure of a single log call. Never affects the engine or other levels.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("filter {index} failed")]
    Filter {
        index: usize,
        #[source]
        source: BoxError,
    },
    #[error("serializer {serializer} failed to write to writer {writer}")]
    Serialize {
        serializer: usize,
        writer: usize,
        #[source]
        source: BoxError,
    },
}

/// A dropped resource could not be released. Reported, never returned from a
/// transition.
#[derive(Debug, Error)]
#[error("failed to release {collection} {index}")]
pub struct DisposalError {
    pub collection: Collection,
    pub index: usize,
    #[source]
    pub source: BoxError,
}
