//! # driftlink-transport
//!
//! The driftlink v2 wire protocol and its runtime: a framed UDP datagram
//! format with CRC-protected headers, authenticated encryption, Brotli
//! compression, a sliding-window reliability layer (cumulative ACK +
//! selective NAK + bounded retransmit queue), an MTU-aware smart batcher,
//! and an AIMD congestion controller.
//!
//! Link bonding and the role executors live in `driftlink-bonding`, which
//! depends on this crate for the wire protocol itself.
//!
//! ## Crate structure
//!
//! - [`wire`] — packet header encode/decode, control packet payloads, CRC16
//! - [`seq`] — circular 32-bit sequence arithmetic
//! - [`tracker`] — receive-side sequence classification and NAK scheduling
//! - [`retransmit`] — bounded FIFO retransmit queue
//! - [`reliability`] — TX/RX halves of the reliability loop
//! - [`batcher`] — MTU-aware smart batching of outgoing deltas
//! - [`congestion`] — AIMD congestion controller
//! - [`crypto`] — AES-256-GCM framing for DATA payloads
//! - [`compress`] — Brotli compression glue
//! - [`stats`] — shared EMA helper and per-role counters
//! - [`config`] — immutable, validated configuration
//! - [`error`] — the error taxonomy
//! - [`host`] — the host contract trait
//! - [`delta`] — the delta envelope data model

pub mod batcher;
pub mod compress;
pub mod config;
pub mod congestion;
pub mod crypto;
pub mod delta;
pub mod error;
pub mod host;
pub mod reliability;
pub mod retransmit;
pub mod seq;
pub mod stats;
pub mod tracker;
pub mod wire;

pub use error::DriftlinkError;
