//! In-memory drivers.
//!
//! Reference implementations of the three driver traits. They fire the same
//! instrumentation callbacks a real driver would, in the same order, and can
//! be made to misbehave through a [`faults::FaultInjector`]: failing calls,
//! lost start events, duplicated completions. Used by the tests and the demo
//! binary.

pub mod document;
pub mod faults;
pub mod kv;
pub mod relational;

pub use document::MemoryDocumentDriver;
pub use faults::{FaultConfig, FaultInjector};
pub use kv::MemoryKvDriver;
pub use relational::MemorySqlDriver;
