use std::{borrow::Cow, io};

use crate::record::Field;

/// Error type returned by collaborators (filters, serializers, factories).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Adds, mutates or removes entries of a record before it is serialized.
///
/// Returning an empty sequence suppresses the record: nothing downstream of
/// the filter runs for that call.
pub trait Filterer: Send + Sync {
    fn filter<'a>(&self, fields: &'a [Field]) -> Result<Cow<'a, [Field]>, BoxError>;

    /// Called once after the engine retires this instance and the last log
    /// call using it has returned.
    fn release(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Encodes a record and hands it to `writer` in a single write.
pub trait Serializer: Send + Sync {
    fn serialize(&self, writer: &dyn Writer, fields: &[Field]) -> Result<(), BoxError>;

    /// Called once after the engine retires this instance and the last log
    /// call using it has returned.
    fn release(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Append-only byte sink. Implementations must not interleave concurrent
/// writes.
pub trait Writer: Send + Sync {
    fn write_record(&self, buf: &[u8]) -> io::Result<()>;

    /// Closes the underlying handle. Called once after the engine retires
    /// this instance and the last log call using it has returned, unless
    /// [`Writer::is_shared_stream`] is true.
    fn release(&self) -> io::Result<()> {
        Ok(())
    }

    /// Process-wide streams (stdout, stderr) are never released by the engine.
    fn is_shared_stream(&self) -> bool {
        false
    }
}

/// Turns a closure into a [`Filterer`].
pub struct FilterFn<F>(pub F);

impl<F> Filterer for FilterFn<F>
where
    F: Fn(&[Field]) -> Result<Vec<Field>, BoxError> + Send + Sync,
{
    fn filter<'a>(&self, fields: &'a [Field]) -> Result<Cow<'a, [Field]>, BoxError> {
        (self.0)(fields).map(Cow::Owned)
    }
}

/// Turns a closure into a [`Serializer`].
pub struct SerializerFn<F>(pub F);

impl<F> Serializer for SerializerFn<F>
where
    F: Fn(&dyn Writer, &[Field]) -> Result<(), BoxError> + Send + Sync,
{
    fn serialize(&self, writer: &dyn Writer, fields: &[Field]) -> Result<(), BoxError> {
        (self.0)(writer, fields)
    }
}
