//! Scored priority queue of offers waiting to be posted, with a moderation side list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::config::QueueConfig;
use crate::models::{generate_id, Offer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 1,
    Normal = 2,
    High = 3,
    Urgent = 4,
    Critical = 5,
}

impl Priority {
    /// Historic lows jump the line; everything else is bucketed by score.
    pub fn for_offer(offer: &Offer, score: f64) -> Self {
        if offer.is_lowest_price {
            return Priority::Critical;
        }
        match score {
            s if s >= 0.9 => Priority::Urgent,
            s if s >= 0.75 => Priority::High,
            s if s >= 0.5 => Priority::Normal,
            _ => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Approved,
    Moderation,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOffer {
    pub id: String,
    pub offer: Offer,
    pub score: f64,
    pub priority: Priority,
    pub status: ModerationStatus,
    pub enqueued_at: DateTime<Utc>,
    seq: u64,
}

impl PartialEq for QueuedOffer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedOffer {}

impl PartialOrd for QueuedOffer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedOffer {
    /// Greater pops first: priority, then score, then earlier insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.score.total_cmp(&other.score))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued { id: String },
    HeldForModeration { id: String },
    Rejected,
    /// Queue full and the offer did not outrank anything in it.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproveOutcome {
    Queued,
    NotFound,
    /// Queue full and the offer did not outrank anything in it; it stays held.
    QueueFull,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub dropped: u64,
    pub pending: usize,
    pub in_moderation: usize,
}

pub struct OfferQueue {
    config: QueueConfig,
    heap: BinaryHeap<QueuedOffer>,
    moderation: Vec<QueuedOffer>,
    next_seq: u64,
    stats: QueueStats,
}

impl OfferQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            heap: BinaryHeap::new(),
            moderation: Vec::new(),
            next_seq: 0,
            stats: QueueStats::default(),
        }
    }

    pub fn moderation_status(&self, score: f64) -> ModerationStatus {
        if score <= self.config.auto_reject_threshold {
            ModerationStatus::Rejected
        } else if score >= self.config.auto_approve_threshold || !self.config.moderation_enabled {
            ModerationStatus::Approved
        } else {
            ModerationStatus::Moderation
        }
    }

    pub fn enqueue(&mut self, offer: Offer, score: f64) -> EnqueueOutcome {
        let status = self.moderation_status(score);
        let entry = QueuedOffer {
            id: generate_id(),
            priority: Priority::for_offer(&offer, score),
            offer,
            score,
            status,
            enqueued_at: Utc::now(),
            seq: self.next_seq,
        };
        self.next_seq += 1;

        match status {
            ModerationStatus::Rejected => {
                tracing::debug!(title = %entry.offer.title, score, "Offer below auto-reject threshold");
                self.stats.rejected += 1;
                EnqueueOutcome::Rejected
            }
            ModerationStatus::Moderation => {
                let id = entry.id.clone();
                if self.hold(entry) {
                    EnqueueOutcome::HeldForModeration { id }
                } else {
                    EnqueueOutcome::Dropped
                }
            }
            ModerationStatus::Approved => {
                let id = entry.id.clone();
                if self.push(entry) {
                    EnqueueOutcome::Queued { id }
                } else {
                    EnqueueOutcome::Dropped
                }
            }
        }
    }

    /// Insert, evicting the lowest entry when at capacity and outranked.
    fn push(&mut self, entry: QueuedOffer) -> bool {
        if self.heap.len() >= self.config.max_size {
            let mut entries = std::mem::take(&mut self.heap).into_vec();
            let lowest = entries
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.cmp(b))
                .map(|(idx, _)| idx);

            match lowest {
                Some(idx) if entry > entries[idx] => {
                    let evicted = entries.swap_remove(idx);
                    tracing::debug!(evicted = %evicted.offer.title, "Queue full, evicted lowest offer");
                    self.stats.evicted += 1;
                }
                _ => {
                    self.heap = BinaryHeap::from(entries);
                    self.stats.dropped += 1;
                    return false;
                }
            }
            self.heap = BinaryHeap::from(entries);
        }

        self.heap.push(entry);
        self.stats.enqueued += 1;
        true
    }

    /// Hold for review. The side list shares `max_size`: when full, the
    /// lowest held entry is evicted if outranked, else the new one is dropped.
    fn hold(&mut self, entry: QueuedOffer) -> bool {
        if self.moderation.len() >= self.config.max_size {
            let lowest = self
                .moderation
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.cmp(b))
                .map(|(idx, _)| idx);
            match lowest {
                Some(idx) if entry > self.moderation[idx] => {
                    let evicted = self.moderation.remove(idx);
                    tracing::debug!(evicted = %evicted.offer.title, "Moderation list full, evicted lowest offer");
                    self.stats.evicted += 1;
                }
                _ => {
                    self.stats.dropped += 1;
                    return false;
                }
            }
        }
        self.moderation.push(entry);
        true
    }

    pub fn pop(&mut self) -> Option<QueuedOffer> {
        let entry = self.heap.pop()?;
        self.stats.dequeued += 1;
        Some(entry)
    }

    pub fn pop_many(&mut self, max: usize) -> Vec<QueuedOffer> {
        std::iter::from_fn(|| self.pop()).take(max).collect()
    }

    pub fn peek(&self) -> Option<&QueuedOffer> {
        self.heap.peek()
    }

    /// Move a held offer into the queue. A refused offer stays in moderation.
    pub fn approve(&mut self, id: &str) -> ApproveOutcome {
        let Some(pos) = self.moderation.iter().position(|e| e.id == id) else {
            return ApproveOutcome::NotFound;
        };
        let mut entry = self.moderation[pos].clone();
        entry.status = ModerationStatus::Approved;
        if !self.push(entry) {
            return ApproveOutcome::QueueFull;
        }
        self.moderation.remove(pos);
        ApproveOutcome::Queued
    }

    pub fn reject(&mut self, id: &str) -> bool {
        let Some(pos) = self.moderation.iter().position(|e| e.id == id) else {
            return false;
        };
        self.moderation.remove(pos);
        self.stats.rejected += 1;
        true
    }

    pub fn pending_moderation(&self) -> &[QueuedOffer] {
        &self.moderation
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.heap.len(),
            in_moderation: self.moderation.len(),
            ..self.stats.clone()
        }
    }
}
