//! # driftlink-bonding
//!
//! The link-bonding manager and per-role event loop that sit on top of
//! `driftlink-transport`'s wire codec and reliability loop: active/standby
//! failover over two UDP paths, and the single-threaded cooperative runtime
//! that drives both the reliability loop and the bonding manager for one
//! role (client or server).

pub mod health;
pub mod link;
pub mod manager;
pub mod runtime;
pub mod stdio_host;
