//! Dynamic watch-fanout backup controller.
//!
//! Watches cluster object kinds discovered at runtime, hashes each
//! annotated instance, and persists a canonical copy whenever the content
//! changes, with soft-delete tombstones reconciled by a standing garbage
//! collector.

pub mod cancel;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod external;
pub mod gc;
pub mod hash;
pub mod mock;
pub mod store;
pub mod types;
pub mod worker;
