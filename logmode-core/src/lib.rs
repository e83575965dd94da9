//! # logmode-core
//! Runtime switchable logging modes: validation of a mode table, the
//! lifecycle of the filters, serializers and writers each mode needs, and the
//! atomic swap of per-level pipelines.
//!
//! ```rust
//! use std::{borrow::Cow, io, sync::{Arc, Mutex}};
//!
//! use logmode_core::{
//!     BoxError, DispatchTable, Engine, Field, Filterer, Level, Mode, Registry, Serializer,
//!     Writer, record,
//! };
//!
//! struct Identity;
//! impl Filterer for Identity {
//!     fn filter<'a>(&self, fields: &'a [Field]) -> Result<Cow<'a, [Field]>, BoxError> {
//!         Ok(Cow::Borrowed(fields))
//!     }
//! }
//!
//! struct Plain;
//! impl Serializer for Plain {
//!     fn serialize(&self, writer: &dyn Writer, fields: &[Field]) -> Result<(), BoxError> {
//!         let line: Vec<String> = fields.iter().map(|f| format!("{}={}", f.key, f.value)).collect();
//!         Ok(writer.write_record(line.join(" ").as_bytes())?)
//!     }
//! }
//!
//! #[derive(Clone, Default)]
//! struct Memory(Arc<Mutex<Vec<String>>>);
//! impl Writer for Memory {
//!     fn write_record(&self, buf: &[u8]) -> io::Result<()> {
//!         self.0.lock().unwrap().push(String::from_utf8_lossy(buf).into_owned());
//!         Ok(())
//!     }
//! }
//!
//! let memory = Memory::default();
//! let sink = memory.clone();
//! let registry = Registry::new()
//!     .with_filter(|| Ok(Identity))
//!     .with_serializer(|| Ok(Plain))
//!     .with_writer(move || Ok(sink.clone()));
//! let modes = [
//!     Mode::new().route(Level::Error, [(0, 0, 0)]),
//!     Mode::new().route(Level::Error, [(0, 0, 0)]).route(Level::Debug, [(0, 0, 0)]),
//! ];
//! let table = Arc::new(DispatchTable::new());
//! let engine = Engine::new(&registry, &modes, false, Arc::clone(&table)).unwrap();
//! engine.change_to_mode(0, true, true).unwrap();
//!
//! table.log(Level::Debug, &record!["msg" => "hidden"]).unwrap();
//! engine.next_mode().unwrap();
//! table.log(Level::Debug, &record!["msg" => "shown"]).unwrap();
//! assert_eq!(*memory.0.lock().unwrap(), ["msg=shown"]);
//! ```

mod capability;
mod config;
mod dispatch;
mod engine;
mod error;
mod level;
mod mode;
mod pipeline;
mod record;
mod registry;
mod signal;
mod state;
#[cfg(test)]
mod testing;

pub use capability::{BoxError, FilterFn, Filterer, Serializer, SerializerFn, Writer};
pub use config::{LOGMODE_CONFIG, LogModeConfig};
pub use dispatch::{DispatchTable, LevelDispatch};
pub use engine::Engine;
pub use error::{DisposalError, Error, PipelineError, ValidationError};
pub use level::Level;
pub use mode::{Mode, PipelineTuple, validate};
pub use pipeline::LogFn;
pub use record::{Field, Record, Value};
pub use registry::{
    Collection, Factory, FilterFactory, Registry, SerializerFactory, WriterFactory,
    filter_factory, serializer_factory, writer_factory,
};
#[cfg(unix)]
pub use signal::OsSignals;
pub use signal::{ControlSignal, ManualSignals, SignalSource};
