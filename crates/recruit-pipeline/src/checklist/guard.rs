use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use super::domain::{ItemId, RecruitId};

type Key = (RecruitId, ItemId);

/// Serializes evaluations per (recruit, item) so concurrent writers cannot both observe
/// an incomplete item and each emit a completion.
#[derive(Debug, Default)]
pub struct CompletionGuard {
    in_flight: Mutex<HashSet<Key>>,
}

impl CompletionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Key>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claim the pair. Returns `None` while another evaluation holds it.
    pub fn try_acquire(&self, recruit_id: &RecruitId, item_id: &ItemId) -> Option<InFlight<'_>> {
        let key = (recruit_id.clone(), item_id.clone());
        let mut in_flight = self.lock();
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(InFlight { guard: self, key })
    }

    pub fn is_held(&self, recruit_id: &RecruitId, item_id: &ItemId) -> bool {
        self.lock()
            .contains(&(recruit_id.clone(), item_id.clone()))
    }
}

/// Releases its pair when dropped.
#[derive(Debug)]
pub struct InFlight<'a> {
    guard: &'a CompletionGuard,
    key: Key,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.guard.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn second_claim_fails_until_release() {
        let guard = CompletionGuard::new();
        let recruit = RecruitId::new("r-1");
        let item = ItemId::new("i-1");

        let first = guard.try_acquire(&recruit, &item).expect("first claim succeeds");
        assert!(guard.try_acquire(&recruit, &item).is_none());
        assert!(guard.try_acquire(&recruit, &ItemId::new("i-2")).is_some());

        drop(first);
        assert!(!guard.is_held(&recruit, &item));
        assert!(guard.try_acquire(&recruit, &item).is_some());
    }

    #[test]
    fn claims_from_other_threads_fail_fast_while_held() {
        let guard = Arc::new(CompletionGuard::new());
        let recruit = RecruitId::new("r-1");
        let item = ItemId::new("i-1");

        let held = guard.try_acquire(&recruit, &item).expect("claim succeeds");
        let contender = {
            let guard = Arc::clone(&guard);
            let (recruit, item) = (recruit.clone(), item.clone());
            thread::spawn(move || guard.try_acquire(&recruit, &item).is_some())
        };
        assert!(!contender.join().expect("contender thread completes"));

        drop(held);
        assert!(!guard.is_held(&recruit, &item));
    }
}
