use std::collections::HashMap;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use crate::core::{Result, UploadError, UploadId, UploadPhase};

/// In-flight state for one logical upload
#[derive(Debug)]
pub(crate) struct UploadState {
    pub cancellation_token: CancellationToken,
    pub started_at: Instant,
    pub registered_at: DateTime<Utc>,
    pub phase: UploadPhase,
    /// Distinguishes a fresh attempt from a stale one under the same id
    pub generation: u64,
}

/// Diagnostic view of a registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveUpload {
    pub id: UploadId,
    pub phase: UploadPhase,
    pub registered_at: DateTime<Utc>,
    pub age: Duration,
}

/// Registry owned by the executor actor, at most one entry per id
#[derive(Debug, Default)]
pub(crate) struct UploadRegistry {
    entries: HashMap<UploadId, UploadState>,
    next_generation: u64,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, id: &UploadId) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert a fresh entry, rejecting ids that are already in flight
    pub fn register(&mut self, id: UploadId, now: Instant) -> Result<(CancellationToken, u64)> {
        if self.entries.contains_key(&id) {
            return Err(UploadError::AlreadyInFlight(id));
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let cancellation_token = CancellationToken::new();

        self.entries.insert(id, UploadState {
            cancellation_token: cancellation_token.clone(),
            started_at: now,
            registered_at: Utc::now(),
            phase: UploadPhase::Validating,
            generation,
        });

        Ok((cancellation_token, generation))
    }

    pub fn set_phase(&mut self, id: &UploadId, generation: u64, phase: UploadPhase) {
        if let Some(state) = self.entries.get_mut(id) {
            if state.generation == generation {
                state.phase = phase;
            }
        }
    }

    /// Remove the entry only if it still belongs to `generation`
    pub fn finish(&mut self, id: &UploadId, generation: u64) -> bool {
        match self.entries.get(id) {
            Some(state) if state.generation == generation => {
                self.entries.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Signal and drop the entry, if any
    pub fn cancel(&mut self, id: &UploadId) -> bool {
        match self.entries.remove(id) {
            Some(state) => {
                state.cancellation_token.cancel();
                true
            }
            None => false,
        }
    }

    /// Evict every entry older than `ttl`, signalling its token
    pub fn sweep(&mut self, now: Instant, ttl: Duration) -> Vec<UploadId> {
        let expired: Vec<UploadId> = self.entries
            .iter()
            .filter(|(_, state)| now.saturating_duration_since(state.started_at) > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.cancel(id);
        }

        expired
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, state) in self.entries.drain() {
            state.cancellation_token.cancel();
        }
        count
    }

    pub fn snapshot(&self, now: Instant) -> Vec<ActiveUpload> {
        let mut uploads: Vec<_> = self.entries
            .iter()
            .map(|(id, state)| ActiveUpload {
                id: id.clone(),
                phase: state.phase,
                registered_at: state.registered_at,
                age: now.saturating_duration_since(state.started_at),
            })
            .collect();
        uploads.sort_by(|a, b| a.id.cmp(&b.id));
        uploads
    }
}
