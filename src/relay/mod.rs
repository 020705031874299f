//! Resource lifecycle for relayed uploads.
//!
//! - [`ResourceStore`]: code → metadata, code generation, quota accounting
//! - [`ExpirySweeper`]: periodic eviction of expired entries and their files

mod code;
mod entry;
mod store;
mod sweeper;

pub use code::CodeGenerator;
pub use entry::ResourceEntry;
pub use store::ResourceStore;
pub use sweeper::{BackingStore, ExpirySweeper, StoredItem, SweepReport};
