//! TCP relay engine.
//!
//! This module provides:
//! - Per-route TCP listeners
//! - Blocklist enforcement at accept time
//! - Bidirectional byte forwarding with per-direction accounting
//! - Terminal connection records
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Blocklist check -> Backend dial -> two pumps
//!                                                             |
//!                                          one record per terminated connection
//! ```

mod forward;
mod listener;
mod route;

pub use forward::{pump, BUFFER_SIZE};
pub use listener::{Listener, ListenerStats, ACCEPT_BACKLOG, DEFAULT_DIAL_TIMEOUT};
pub use route::Route;
