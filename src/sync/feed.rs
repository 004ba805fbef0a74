//! Public facility updates pulled during a sync pass

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::ingest::RawFacilityRecord;

/// Source of facility updates published by other field teams
#[async_trait]
pub trait PublicUpdateSource: Send + Sync {
    /// Fetch every update published since the last call
    async fn fetch_updates(&self) -> Result<Vec<RawFacilityRecord>, StorageError>;
}

/// In-process feed: returns whatever was queued since the last fetch
#[derive(Default)]
pub struct SimulatedPublicFeed {
    queued: Mutex<Vec<RawFacilityRecord>>,
}

impl SimulatedPublicFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an update for the next sync pass
    pub fn publish(&self, record: RawFacilityRecord) -> Result<(), StorageError> {
        self.queued
            .lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?
            .push(record);
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.queued.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PublicUpdateSource for SimulatedPublicFeed {
    async fn fetch_updates(&self) -> Result<Vec<RawFacilityRecord>, StorageError> {
        let mut queued = self
            .queued
            .lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(std::mem::take(&mut *queued))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_feed_drains_on_fetch() {
        let feed = SimulatedPublicFeed::new();
        assert!(feed.fetch_updates().await.unwrap().is_empty());

        feed.publish(RawFacilityRecord {
            id: Some("a".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(feed.pending(), 1);

        assert_eq!(feed.fetch_updates().await.unwrap().len(), 1);
        assert!(feed.fetch_updates().await.unwrap().is_empty());
    }
}
