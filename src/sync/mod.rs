//! Server-state synchronization: polled read views and the mutation gateway.
//!
//! Reads flow through `PollingView`, a periodic-refresh cache per collection.
//! Writes flow through `MutationGateway`, which settles every mutation with a
//! forced re-fetch so the views converge on server truth.

pub mod mutations;
pub mod poller;

pub use mutations::{MutationGateway, MIN_JOB_CREDITS};
pub use poller::{Fetcher, PollingView, Snapshot};
