//! Watch-set side of the switchboard: unit registry, reconciliation, and
//! the OS-backed notification source.
//!
//! # Architecture
//!
//! ```text
//! Units (registry) ──poll──> Synchronizer ──create/remove files──> base_dir
//!                                 |
//!                          watch / unwatch
//!                                 v
//!                            WatchHandle ── inotify (IN_OPEN | IN_CLOSE)
//!                                                   |
//!                                          open / close events
//!                                                   v
//!                                            InotifySource ──> Switchboard
//! ```
//!
//! The flow is one-directional: nothing here reads switchboard state.

mod error;
mod inotify_source;
mod registrar;
mod registry;
mod synchronizer;

pub use error::WatchError;
pub use inotify_source::{DEFAULT_EVENT_CAPACITY, InotifySource, WatchHandle, classify};
pub use registrar::WatchRegistrar;
pub use registry::{UnitRegistry, Units};
pub use synchronizer::{DEFAULT_SYNC_INTERVAL, ReconcileReport, Synchronizer};
