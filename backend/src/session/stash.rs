use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::SessionId;

struct StashEntry<T> {
    value: T,
    expires_at: Instant,
}

/// One pending value per session, handed out at most once.
pub struct ResultStash<T> {
    entries: Mutex<HashMap<SessionId, StashEntry<T>>>,
    ttl: Duration,
}

impl<T> ResultStash<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn put(&self, session: SessionId, value: T) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            session,
            StashEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn take(&self, session: &SessionId) -> Option<T> {
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session)?;
        if entry.expires_at <= Instant::now() {
            log::debug!("Dropping expired stash entry for {:?}", session);
            return None;
        }
        Some(entry.value)
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_read_once() {
        let stash = ResultStash::new(Duration::from_secs(60));
        let session = SessionId::generate();
        stash.put(session, "result");
        assert_eq!(stash.take(&session), Some("result"));
        assert_eq!(stash.take(&session), None);
    }

    #[test]
    fn sessions_do_not_see_each_other() {
        let stash = ResultStash::new(Duration::from_secs(60));
        let alice = SessionId::generate();
        let bob = SessionId::generate();
        stash.put(alice, 1);
        assert_eq!(stash.take(&bob), None);
        assert_eq!(stash.take(&alice), Some(1));
    }

    #[test]
    fn newer_value_replaces_pending_one() {
        let stash = ResultStash::new(Duration::from_secs(60));
        let session = SessionId::generate();
        stash.put(session, 1);
        stash.put(session, 2);
        assert_eq!(stash.take(&session), Some(2));
        assert_eq!(stash.len(), 0);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let stash = ResultStash::new(Duration::ZERO);
        let session = SessionId::generate();
        stash.put(session, "stale");
        assert_eq!(stash.take(&session), None);

        stash.put(SessionId::generate(), "a");
        stash.put(SessionId::generate(), "b");
        assert_eq!(stash.purge_expired(), 1);
        assert_eq!(stash.len(), 0);
    }
}
