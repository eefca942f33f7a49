use std::sync::Arc;

use dashmap::DashMap;
use marquee_core::ShowtimeId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One exclusive lock per showtime. Showtimes are the contention boundary:
/// purchases for different showtimes never wait on each other.
#[derive(Default)]
pub struct ShowtimeLocks {
    locks: DashMap<ShowtimeId, Arc<Mutex<()>>>,
}

impl ShowtimeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, showtime_id: ShowtimeId) -> Arc<Mutex<()>> {
        let entry = self.locks.entry(showtime_id).or_default();
        Arc::clone(entry.value())
    }

    /// Waits for the showtime's lock. The guard releases it on drop.
    pub async fn acquire(&self, showtime_id: ShowtimeId) -> OwnedMutexGuard<()> {
        self.handle(showtime_id).lock_owned().await
    }

    pub fn try_acquire(&self, showtime_id: ShowtimeId) -> Option<OwnedMutexGuard<()>> {
        self.handle(showtime_id).try_lock_owned().ok()
    }

    /// Drops locks nobody holds or waits on. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        // Holders and waiters each keep a clone, so a count of one means idle.
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    /// Removes the showtime's lock if nobody holds or waits on it. The count
    /// is checked under the map's shard lock, so no new waiter can slip in.
    pub fn release_if_idle(&self, showtime_id: ShowtimeId) -> bool {
        self.locks
            .remove_if(&showtime_id, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
