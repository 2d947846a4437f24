//! # Retransmit Queue
//!
//! Retains framed DATA bytes for possible replay, bounded by size and age.
//! Insertion order is tracked explicitly with a `VecDeque` — eviction must
//! never depend on hash-map iteration order (spec §9).

use std::collections::{HashMap, VecDeque};

use quanta::Instant;

use crate::seq;

/// One retained DATA frame (spec §3 `QueueEntry`).
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub sequence: u32,
    pub packet_bytes: Vec<u8>,
    pub first_sent_at: Instant,
    pub last_sent_at: Instant,
    pub attempts: u32,
}

/// Aggregate statistics over the current queue contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub size: usize,
    pub total_attempts: u64,
    pub max_attempts: u32,
    pub average_attempts: f64,
}

/// Bounded FIFO store of in-flight DATA frames (spec §4.3).
pub struct RetransmitQueue {
    max_size: usize,
    max_retransmits: u32,
    order: VecDeque<u32>,
    entries: HashMap<u32, QueueEntry>,
    last_acked: Option<u32>,
}

impl RetransmitQueue {
    pub fn new(max_size: usize, max_retransmits: u32) -> Self {
        RetransmitQueue {
            max_size,
            max_retransmits,
            order: VecDeque::new(),
            entries: HashMap::new(),
            last_acked: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a newly sent frame. Evicts the oldest entry (by insertion
    /// order, not sequence value) if the queue is already at `max_size`.
    /// Returns `true` if an eviction occurred.
    pub fn add(&mut self, seq: u32, bytes: Vec<u8>, now: Instant) -> bool {
        let evicted = if self.entries.len() >= self.max_size {
            self.evict_oldest();
            true
        } else {
            false
        };
        self.order.push_back(seq);
        self.entries.insert(
            seq,
            QueueEntry {
                sequence: seq,
                packet_bytes: bytes,
                first_sent_at: now,
                last_sent_at: now,
                attempts: 0,
            },
        );
        evicted
    }

    fn evict_oldest(&mut self) {
        while let Some(oldest) = self.order.pop_front() {
            if self.entries.remove(&oldest).is_some() {
                break;
            }
            // already removed via acknowledge/expire; keep popping.
        }
    }

    /// Remove every entry whose sequence is at-or-before `cum_seq`, using
    /// circular-range semantics anchored at the previously acked baseline.
    /// Idempotent: repeating the same `cum_seq` removes nothing further.
    pub fn acknowledge(&mut self, cum_seq: u32) -> usize {
        if let Some(prev) = self.last_acked {
            if !seq::ahead_of(cum_seq, prev) {
                return 0; // stale or repeated ACK: no-op
            }
        }
        self.last_acked = Some(cum_seq);

        let to_remove: Vec<u32> = self
            .entries
            .keys()
            .copied()
            .filter(|&s| seq::at_or_ahead(cum_seq, s))
            .collect();
        for s in &to_remove {
            self.entries.remove(s);
        }
        // order deque is cleaned up lazily by evict_oldest/retransmit/expire
        // skipping removed entries; compact it now to keep it from growing
        // unbounded under a long-running low-loss connection.
        self.order.retain(|s| self.entries.contains_key(s));
        to_remove.len()
    }

    /// Produce retransmit frames for the given sequences. Entries at
    /// `max_retransmits` are dropped and skipped rather than re-emitted;
    /// sequences no longer present are silently skipped.
    pub fn retransmit(&mut self, seqs: &[u32], now: Instant) -> Vec<(u32, Vec<u8>, u32)> {
        let mut out = Vec::with_capacity(seqs.len());
        for &s in seqs {
            let Some(entry) = self.entries.get_mut(&s) else {
                continue;
            };
            if entry.attempts >= self.max_retransmits {
                self.entries.remove(&s);
                continue;
            }
            entry.attempts += 1;
            entry.last_sent_at = now;
            out.push((s, entry.packet_bytes.clone(), entry.attempts));
        }
        out
    }

    /// Remove entries whose `last_sent_at` is older than `max_age`. Returns
    /// the count removed.
    pub fn expire_old(&mut self, max_age: std::time::Duration, now: Instant) -> usize {
        let expired: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_sent_at) > max_age)
            .map(|(&s, _)| s)
            .collect();
        for s in &expired {
            self.entries.remove(s);
        }
        if !expired.is_empty() {
            self.order.retain(|s| self.entries.contains_key(s));
        }
        expired.len()
    }

    /// Drop every entry unconditionally (used by force-drain on long ACK
    /// silence, spec §4.4).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn stats(&self) -> QueueStats {
        let size = self.entries.len();
        let total: u64 = self.entries.values().map(|e| e.attempts as u64).sum();
        let max = self.entries.values().map(|e| e.attempts).max().unwrap_or(0);
        QueueStats {
            size,
            total_attempts: total,
            max_attempts: max,
            average_attempts: if size == 0 { 0.0 } else { total as f64 / size as f64 },
        }
    }
}
