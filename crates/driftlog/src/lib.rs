//! Append-only, eventually-consistent replicated log.
//!
//! A [`Log`] is a grow-only set of content-addressed [`Entry`] values
//! forming a DAG (like Git's commit graph): each appended entry references
//! the head entries it observed. Independent replicas extend their logs
//! without coordination and converge by exchanging entries through
//! [`Log::join`]; a Lamport `(id, time)` clock makes the converged order
//! deterministic on every replica.
//!
//! Entries are optionally ed25519-signed; incoming entries are checked
//! against an allowed-key set on join. Persistence goes through the
//! content-addressed [`BlockStore`](driftlog_store::BlockStore), and the
//! [`io`] module reconstructs logs from a stored root pointer with depth
//! bounds and progress reporting.

mod entry;
mod error;
pub mod io;
mod log;

#[cfg(test)]
mod tests;

pub use entry::{Entry, ENTRY_VERSION};
pub use error::LogError;
pub use io::RecoveredLog;
pub use log::{Log, LogJson, LogOptions, LogSnapshot, ALLOW_ANY};
