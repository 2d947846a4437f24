//! # Stdio Host
//!
//! A minimal [`Host`] implementation for the `driftlink-client`/
//! `driftlink-server` binaries: outbound deltas are read as NDJSON lines,
//! inbound delivered deltas are written as NDJSON lines to stdout. A real
//! deployment (e.g. a SignalK plugin) implements its own `Host` against its
//! own delta bus; this one exists so the binaries are runnable standalone.
//!
//! Reading stdin is blocking, and the role runtime's loop is cooperative, so
//! a dedicated reader thread forwards lines into a bounded channel that
//! `poll_outbound_deltas` drains non-blockingly — the one OS thread this
//! crate spawns outside the single-threaded runtime itself (spec §5 reserves
//! a worker only for I/O/compute the cooperative loop can't do without
//! blocking; stdin framing is exactly that).

use std::io::{self, BufRead, Write};
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};

use driftlink_transport::delta::DeltaEnvelope;
use driftlink_transport::host::Host;

const CHANNEL_CAPACITY: usize = 4096;

pub struct StdioHost {
    inbox: Receiver<DeltaEnvelope>,
    stdout: io::Stdout,
}

impl StdioHost {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        thread::Builder::new()
            .name("driftlink-stdin-reader".into())
            .spawn(move || {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<DeltaEnvelope>(&line) {
                        Ok(delta) => {
                            if tx.send(delta).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!(target: "driftlink::host", "bad outbound delta json: {e}");
                        }
                    }
                }
            })
            .expect("failed to spawn stdin reader thread");

        StdioHost {
            inbox: rx,
            stdout: io::stdout(),
        }
    }
}

impl Default for StdioHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for StdioHost {
    fn emit_delta_to_host(&mut self, delta: DeltaEnvelope) {
        match serde_json::to_string(&delta) {
            Ok(line) => {
                let _ = writeln!(self.stdout, "{line}");
            }
            Err(e) => tracing::error!(target: "driftlink::host", "failed to serialize delivered delta: {e}"),
        }
    }

    fn poll_outbound_deltas(&mut self, max: usize) -> Vec<DeltaEnvelope> {
        let mut out = Vec::with_capacity(max.min(64));
        while out.len() < max {
            match self.inbox.try_recv() {
                Ok(delta) => out.push(delta),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}
