use ahash::AHashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use super::clock::{Clock, SystemClock};
use crate::config::SlotConfig;
use crate::fingerprint::{Fingerprint, Fingerprinter};

pub type UserId = i64;

/// Sentinel handle for the ends of the recency list.
const NIL: usize = usize::MAX;

/// What `record_task` did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// An owned slot was within the similarity threshold and was refreshed.
    Matched { slot: usize },
    /// A new slot was allocated.
    Allocated { slot: usize },
    /// The user was at the per-user cap; their oldest slot was reused.
    ReusedOwn { slot: usize },
    /// The store was at the global cap; the least recently touched slot was
    /// taken over, possibly from another user.
    ReusedGlobal { slot: usize, previous_owner: UserId },
}

impl RecordOutcome {
    pub fn slot(&self) -> usize {
        match *self {
            RecordOutcome::Matched { slot }
            | RecordOutcome::Allocated { slot }
            | RecordOutcome::ReusedOwn { slot }
            | RecordOutcome::ReusedGlobal { slot, .. } => slot,
        }
    }

    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Matched { .. } => "matched",
            RecordOutcome::Allocated { .. } => "allocated",
            RecordOutcome::ReusedOwn { .. } => "reused_own",
            RecordOutcome::ReusedGlobal { .. } => "reused_global",
        }
    }
}

/// Read-only copy of a slot, without its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub slot: usize,
    pub user_id: UserId,
    pub username: String,
    pub updated_at: i64,
}

#[derive(Debug)]
pub(super) struct SlotCell {
    pub(super) user_id: UserId,
    pub(super) username: String,
    pub(super) updated_at: i64,
    pub(super) fingerprint: Fingerprint,
    // recency list links, towards the least / most recently touched end
    prev: usize,
    next: usize,
}

/// Arena plus the two indexes kept alongside it.
///
/// - `members` maps each user to the handles they own, in the order they
///   acquired them. Users without slots have no entry.
/// - `head..tail` is a doubly linked list through every allocated cell,
///   least recently touched first.
#[derive(Debug)]
pub(super) struct Inner {
    pub(super) cells: Vec<SlotCell>,
    pub(super) members: AHashMap<UserId, Vec<usize>>,
    head: usize,
    tail: usize,
}

impl Inner {
    fn with_capacity(capacity: usize) -> Self {
        Self { cells: Vec::with_capacity(capacity), members: AHashMap::new(), head: NIL, tail: NIL }
    }

    fn record(
        &mut self,
        limits: &SlotConfig,
        user_id: UserId,
        username: &str,
        fingerprint: Fingerprint,
        now: i64,
    ) -> RecordOutcome {
        if let Some(slot) = self.find_match(user_id, fingerprint, limits.similarity_threshold) {
            let cell = &mut self.cells[slot];
            cell.fingerprint = fingerprint;
            cell.updated_at = now;
            set_name(&mut cell.username, username);
            self.touch(slot);
            return RecordOutcome::Matched { slot };
        }

        let owned = self.members.get(&user_id).map_or(0, Vec::len);
        if owned >= limits.per_user_capacity {
            if let Some(slot) = self.oldest_owned(user_id) {
                self.reuse(slot, user_id, username, fingerprint, now);
                return RecordOutcome::ReusedOwn { slot };
            }
        }

        if self.cells.len() >= limits.global_capacity && self.head != NIL {
            let slot = self.head;
            let previous_owner = self.cells[slot].user_id;
            self.reuse(slot, user_id, username, fingerprint, now);
            return RecordOutcome::ReusedGlobal { slot, previous_owner };
        }

        let slot = self.cells.len();
        self.cells.push(SlotCell {
            user_id,
            username: username.to_string(),
            updated_at: now,
            fingerprint,
            prev: NIL,
            next: NIL,
        });
        self.members.entry(user_id).or_default().push(slot);
        self.push_back(slot);
        RecordOutcome::Allocated { slot }
    }

    /// First owned slot (in membership order) within `threshold`.
    fn find_match(&self, user_id: UserId, fingerprint: Fingerprint, threshold: u32) -> Option<usize> {
        self.members.get(&user_id)?.iter().copied().find(|&slot| {
            self.cells[slot]
                .fingerprint
                .is_similar(fingerprint, threshold)
        })
    }

    /// Owned slot with the smallest timestamp; the earliest acquired wins ties.
    fn oldest_owned(&self, user_id: UserId) -> Option<usize> {
        self.members
            .get(&user_id)?
            .iter()
            .copied()
            .min_by_key(|&slot| self.cells[slot].updated_at)
    }

    fn reuse(
        &mut self,
        slot: usize,
        user_id: UserId,
        username: &str,
        fingerprint: Fingerprint,
        now: i64,
    ) {
        let previous_owner = self.cells[slot].user_id;
        if previous_owner != user_id {
            self.release_membership(previous_owner, slot);
            self.members.entry(user_id).or_default().push(slot);
        }

        let cell = &mut self.cells[slot];
        cell.user_id = user_id;
        set_name(&mut cell.username, username);
        cell.updated_at = now;
        cell.fingerprint = fingerprint;

        self.touch(slot);
    }

    fn release_membership(&mut self, user_id: UserId, slot: usize) {
        if let Some(owned) = self.members.get_mut(&user_id) {
            owned.retain(|&s| s != slot);
            if owned.is_empty() {
                self.members.remove(&user_id);
            }
        }
    }

    fn touch(&mut self, slot: usize) {
        if self.tail == slot {
            return;
        }
        self.unlink(slot);
        self.push_back(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.cells[slot].prev, self.cells[slot].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.cells[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.cells[next].prev = prev;
        }
        self.cells[slot].prev = NIL;
        self.cells[slot].next = NIL;
    }

    fn push_back(&mut self, slot: usize) {
        self.cells[slot].prev = self.tail;
        self.cells[slot].next = NIL;
        if self.tail == NIL {
            self.head = slot;
        } else {
            self.cells[self.tail].next = slot;
        }
        self.tail = slot;
    }

    fn view(&self, slot: usize) -> SlotView {
        let cell = &self.cells[slot];
        SlotView {
            slot,
            user_id: cell.user_id,
            username: cell.username.clone(),
            updated_at: cell.updated_at,
        }
    }

    /// Handles from least to most recently touched.
    fn recency(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.cells.len());
        let mut cursor = self.head;
        while cursor != NIL {
            order.push(cursor);
            cursor = self.cells[cursor].next;
        }
        order
    }
}

fn set_name(target: &mut String, name: &str) {
    if target != name {
        target.clear();
        target.push_str(name);
    }
}

/// Bounded store of active task slots.
///
/// Construct one per process and share it behind an `Arc`.
///
/// # Example
/// ```ignore
/// use slotwatch_lib::config::SlotConfig;
/// use slotwatch_lib::slots::SlotStore;
///
/// let store = SlotStore::new(&SlotConfig::default());
/// store.record_task(42, "alice", r#"{"messages":[{"role":"user","content":"hi"}]}"#);
/// assert_eq!(store.user_slot_count(42), 1);
/// ```
pub struct SlotStore {
    pub(super) inner: RwLock<Inner>,
    pub(super) limits: SlotConfig,
    fingerprinter: Fingerprinter,
    clock: Arc<dyn Clock>,
}

impl SlotStore {
    /// Store with a fresh random salt and the wall clock.
    pub fn new(limits: &SlotConfig) -> Self {
        Self::with_parts(limits, Fingerprinter::new(), Arc::new(SystemClock))
    }

    /// Store with a fresh random salt and the given clock.
    pub fn with_clock(limits: &SlotConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(limits, Fingerprinter::new(), clock)
    }

    /// Both capacities are raised to at least one slot; a store that holds
    /// nothing cannot place a request.
    pub fn with_parts(limits: &SlotConfig, fingerprinter: Fingerprinter, clock: Arc<dyn Clock>) -> Self {
        let mut limits = limits.clone();
        limits.global_capacity = limits.global_capacity.max(1);
        limits.per_user_capacity = limits.per_user_capacity.clamp(1, limits.global_capacity);

        Self {
            inner: RwLock::new(Inner::with_capacity(limits.global_capacity)),
            limits,
            fingerprinter,
            clock,
        }
    }

    /// Assign one request to a slot.
    ///
    /// Matches the user's first slot within the similarity threshold, else
    /// reuses the user's oldest slot at the per-user cap, else the globally
    /// least recently touched slot at the global cap, else allocates. The
    /// whole sequence runs under the exclusive lock. Callers are expected to
    /// drop non-positive user ids and to substitute a stand-in text (e.g. the
    /// model name) when the payload is unavailable.
    pub fn record_task(&self, user_id: UserId, username: &str, text: &str) -> RecordOutcome {
        let fingerprint = self.fingerprinter.fingerprint(text);
        let mut inner = self.write();
        let now = self.clock.now_secs();
        inner.record(&self.limits, user_id, username, fingerprint, now)
    }

    pub fn now_secs(&self) -> i64 {
        self.clock.now_secs()
    }

    pub fn limits(&self) -> &SlotConfig {
        &self.limits
    }

    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    /// Number of allocated slots.
    pub fn len(&self) -> usize {
        self.read().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn user_slot_count(&self, user_id: UserId) -> usize {
        self.read().members.get(&user_id).map_or(0, Vec::len)
    }

    /// Number of users owning at least one slot.
    pub fn user_count(&self) -> usize {
        self.read().members.len()
    }

    /// Slots owned by `user_id`, in the order they were acquired.
    pub fn user_slots(&self, user_id: UserId) -> Vec<SlotView> {
        let inner = self.read();
        inner
            .members
            .get(&user_id)
            .map(|owned| owned.iter().map(|&slot| inner.view(slot)).collect())
            .unwrap_or_default()
    }

    /// All slots from least to most recently touched.
    pub fn recency_order(&self) -> Vec<SlotView> {
        let inner = self.read();
        inner
            .recency()
            .into_iter()
            .map(|slot| inner.view(slot))
            .collect()
    }

    pub(super) fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("Slot store lock poisoned, continuing with current state");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("Slot store lock poisoned, continuing with current state");
            poisoned.into_inner()
        })
    }
}

impl std::fmt::Debug for SlotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotStore")
            .field("limits", &self.limits)
            .field("slots", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::ManualClock;
    use std::collections::HashSet;

    fn limits(global: usize, per_user: usize) -> SlotConfig {
        SlotConfig { global_capacity: global, per_user_capacity: per_user, ..SlotConfig::default() }
    }

    fn store(global: usize, per_user: usize, clock: Arc<ManualClock>) -> SlotStore {
        SlotStore::with_parts(
            &limits(global, per_user),
            Fingerprinter::with_salt(*b"slot-store-tests"),
            clock,
        )
    }

    /// Every structural invariant of the arena and its indexes.
    fn assert_consistent(store: &SlotStore) {
        let inner = store.read();
        let limits = &store.limits;
        assert!(inner.cells.len() <= limits.global_capacity);

        let mut owned = HashSet::new();
        for (user, slots) in &inner.members {
            assert!(!slots.is_empty(), "user {user} kept an empty membership entry");
            assert!(slots.len() <= limits.per_user_capacity);
            for &slot in slots {
                assert!(slot < inner.cells.len(), "orphan handle {slot}");
                assert_eq!(inner.cells[slot].user_id, *user);
                assert!(owned.insert(slot), "slot {slot} listed twice");
            }
        }
        assert_eq!(owned.len(), inner.cells.len());

        let order = inner.recency();
        assert_eq!(order.len(), inner.cells.len());
        assert_eq!(order.iter().copied().collect::<HashSet<_>>().len(), order.len());
        for pair in order.windows(2) {
            assert!(inner.cells[pair[0]].updated_at <= inner.cells[pair[1]].updated_at);
        }
        if let (Some(first), Some(last)) = (order.first(), order.last()) {
            assert_eq!(inner.head, *first);
            assert_eq!(inner.tail, *last);
        }
    }

    #[test]
    fn test_recency_list_tracks_touches() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = store(10, 10, clock.clone());
        let a = store.record_task(1, "u", "alpha").slot();
        clock.advance(1);
        let b = store.record_task(1, "u", "beta").slot();
        clock.advance(1);
        let c = store.record_task(1, "u", "gamma").slot();
        assert_eq!(store.read().recency(), vec![a, b, c]);

        clock.advance(1);
        assert_eq!(store.record_task(1, "u", "alpha"), RecordOutcome::Matched { slot: a });
        assert_eq!(store.read().recency(), vec![b, c, a]);

        clock.advance(1);
        store.record_task(1, "u", "gamma");
        assert_eq!(store.read().recency(), vec![b, a, c]);
        assert_consistent(&store);
    }

    #[test]
    fn test_global_reuse_moves_membership() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = store(3, 3, clock.clone());
        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            store.record_task(1 + i as UserId % 2, "u", text);
            clock.advance(1);
        }
        // user 1 owns slots 0 and 2, user 2 owns slot 1
        let outcome = store.record_task(7, "new", "four");
        assert_eq!(outcome, RecordOutcome::ReusedGlobal { slot: 0, previous_owner: 1 });
        assert_eq!(store.read().members.get(&1), Some(&vec![2]));
        assert_eq!(store.read().members.get(&7), Some(&vec![0]));
        assert_consistent(&store);

        clock.advance(1);
        let outcome = store.record_task(7, "new", "five");
        assert_eq!(outcome, RecordOutcome::ReusedGlobal { slot: 1, previous_owner: 2 });
        assert!(!store.read().members.contains_key(&2));
        assert_consistent(&store);
    }

    #[test]
    fn test_invariants_under_mixed_load() {
        let clock = Arc::new(ManualClock::new(50_000));
        let store = store(40, 6, clock.clone());
        // deterministic pseudo-random walk over users and vocabularies
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        for _ in 0..2_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let user = (state % 17) as UserId + 1;
            let topic = (state >> 8) % 12;
            store.record_task(user, "user", &format!("topic-{topic}"));
            if state % 3 == 0 {
                clock.advance(1);
            }
            assert_consistent(&store);
        }
        assert_eq!(store.len(), 40);
    }

    #[test]
    fn test_concurrent_writers_keep_invariants() {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = Arc::new(store(100, 8, clock));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let user = (worker * 3 + i % 5) as UserId + 1;
                        store.record_task(user, "w", &format!("w{worker}-req{}", i % 40));
                    }
                })
            })
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                panic!("writer thread panicked");
            }
        }
        assert_consistent(&store);
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn test_zero_capacities_are_raised_to_one() {
        let clock = Arc::new(ManualClock::new(1));
        let store = store(0, 0, clock);
        assert_eq!(store.limits().global_capacity, 1);
        assert_eq!(store.limits().per_user_capacity, 1);

        store.record_task(1, "a", "first");
        let outcome = store.record_task(2, "b", "second");
        assert_eq!(outcome, RecordOutcome::ReusedGlobal { slot: 0, previous_owner: 1 });
        assert_eq!(store.len(), 1);

        let outcome = store.record_task(2, "b", "third");
        assert_eq!(outcome, RecordOutcome::ReusedOwn { slot: 0 });
        assert_eq!(store.len(), 1);
        assert_consistent(&store);
    }

    #[test]
    fn test_username_is_last_write_wins() {
        let clock = Arc::new(ManualClock::new(1));
        let store = store(10, 10, clock);
        store.record_task(5, "old-name", "same text");
        store.record_task(5, "new-name", "same text");
        let slots = store.user_slots(5);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].username, "new-name");
    }
}
