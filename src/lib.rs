//! Workspace placeholder crate.
//!
//! This crate exists so host applications can depend on `zonesync` and reach
//! the individual workspace crates (`sync-engine`, `sync-runtime`,
//! `sync-traits`) without wiring each one individually.

pub use sync_engine as engine;
pub use sync_runtime as runtime;
pub use sync_traits as traits;
