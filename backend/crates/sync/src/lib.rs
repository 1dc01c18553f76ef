//! Resumable, time-boxed mirroring of paginated upstream collections.
//!
//! A [`driver::SyncDriver`] pulls pages from a [`source::PageSource`],
//! upserts them into an `EntityStore`, and checkpoints its offset in a
//! `SyncJobRepository` so a scheduler can re-invoke it until the collection
//! is fully mirrored.

pub mod advbox;
pub mod clock;
pub mod driver;
pub mod error;
pub mod job;
pub mod runner;
pub mod settings;
pub mod sink;
pub mod source;

pub use driver::{SyncDriver, SyncSummary};
pub use job::JobType;
pub use runner::{run_job, run_until_settled, SyncContext};
pub use settings::SyncSettings;
