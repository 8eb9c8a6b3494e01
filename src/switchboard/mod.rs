//! Reference-counted producers driven by open/close notifications.
//!
//! # Architecture
//!
//! ```text
//! NotificationSource ──(Open|Close, path)──> Switchboard
//!                                              - open counts per path
//!                                              - producer handles per path
//!                                                   |
//!                                        spawn / stop (capacity-1 channel)
//!                                                   |
//!                                              Producer task
//!                                              - append record every tick
//!                                              - truncate + close on stop
//! ```
//!
//! The producer's own append handle shows up in the notification stream as
//! an open, so a path counts as idle once its count falls to
//! [`PRODUCER_OWN_OPENS`].

mod board;
mod error;
mod notification;
mod producer;

pub use board::{PRODUCER_OWN_OPENS, Switchboard, Transition};
pub use error::SwitchboardError;
pub use notification::{ChannelSource, Notification, NotificationSource, Operation};
pub use producer::{ActivationId, DEFAULT_TICK, Producer, ProducerSummary, format_record};
