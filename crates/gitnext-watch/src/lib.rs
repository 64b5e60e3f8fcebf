mod debounce;
mod tree_monitor;

pub use tree_monitor::{TreeMonitor, WatchError};
