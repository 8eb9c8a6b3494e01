pub mod cli;
pub mod config;
pub mod logging;
pub mod reader;
pub mod switchboard;
pub mod watcher;

pub use config::Settings;
pub use switchboard::{
    ChannelSource, Notification, NotificationSource, Operation, Switchboard, Transition,
};
pub use watcher::{InotifySource, Synchronizer, UnitRegistry, Units, WatchError, WatchRegistrar};
