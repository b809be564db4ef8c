pub mod blocklist;
pub mod config;
pub mod logger;
pub mod proxy;

pub use blocklist::{BlocklistStore, DEFAULT_RELOAD_INTERVAL};
pub use config::Config;
pub use logger::{ConnectionLogger, ConnectionRecord, ConnectionStatus};
pub use proxy::{Listener, ListenerStats, Route, ACCEPT_BACKLOG, DEFAULT_DIAL_TIMEOUT};
