//! Deduplication of externally-originated cash operations
//!
//! Keyed by (client id, business id). A hit means the instruction was
//! already committed; the recorded result is replayed to the originator and
//! no delta is re-applied. Records older than the retention horizon may be
//! pruned; that narrows dedup coverage but never affects correctness of
//! committed state.

use std::collections::{HashMap, VecDeque};
use types::ids::{ClientId, MessageId};
use types::instruction::ProcessedMessage;

/// Result of a previously committed cash operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedOperation {
    pub message_id: MessageId,
    pub record_id: String,
    pub timestamp: i64,
}

type DedupKey = (ClientId, String);

/// Lookup table from (client, business id) to the committed result.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    by_key: HashMap<DedupKey, CompletedOperation>,
    /// Insertion order, for retention pruning
    order: VecDeque<(i64, DedupKey)>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed result for a (client, business id) pair, if one is retained.
    pub fn find(&self, client_id: &ClientId, business_id: &str) -> Option<&CompletedOperation> {
        self.by_key.get(&(*client_id, business_id.to_string()))
    }

    /// Record a committed operation. Called only after a successful durable
    /// write.
    pub fn record(
        &mut self,
        client_id: ClientId,
        business_id: impl Into<String>,
        operation: CompletedOperation,
    ) {
        let key = (client_id, business_id.into());
        self.order.push_back((operation.timestamp, key.clone()));
        self.by_key.insert(key, operation);
    }

    /// Rebuild an entry from a recovered processed-message record.
    pub fn restore(&mut self, message: &ProcessedMessage) {
        if let (Some(client_id), Some(business_id), Some(record_id)) = (
            message.client_id,
            message.business_id.as_ref(),
            message.record_id.as_ref(),
        ) {
            self.record(
                client_id,
                business_id.clone(),
                CompletedOperation {
                    message_id: message.message_id,
                    record_id: record_id.clone(),
                    timestamp: message.timestamp,
                },
            );
        }
    }

    /// Drop records older than `cutoff`. Returns how many were removed.
    pub fn prune_older_than(&mut self, cutoff: i64) -> usize {
        let mut removed = 0;
        while let Some((timestamp, key)) = self.order.front() {
            if *timestamp >= cutoff {
                break;
            }
            // Only drop the mapping if it still points at this (old) record
            if self
                .by_key
                .get(key)
                .map(|op| op.timestamp == *timestamp)
                .unwrap_or(false)
            {
                self.by_key.remove(key);
                removed += 1;
            }
            self.order.pop_front();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
