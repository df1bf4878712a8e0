//! facegate-store — persistent gallery, access event log and alert log.
//!
//! A single SQLite file holds all three tables. The decision daemon reads
//! identities and appends events; enrollment appends identities.

pub mod codec;
pub mod store;

pub use store::{AlertRecord, EventRecord, GalleryStore};
