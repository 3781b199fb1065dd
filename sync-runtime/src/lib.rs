//! # Sync Runtime Module
//!
//! Runtime infrastructure shared by the sync engine and its hosts:
//! - Event bus for phase-transition notifications
//! - Logging and tracing bootstrap
//!
//! The engine itself only emits events and `tracing` records; installing a
//! subscriber and consuming the bus is the host's job.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
pub use events::{EventBus, EventSeverity, SyncEvent, DEFAULT_EVENT_BUFFER_SIZE};
pub use logging::{init_logging, LogFormat, LoggingConfig};
