use ahash::AHashMap;
use serde::Serialize;

use super::store::{SlotStore, UserId};

/// Active slot count of one user within a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserActivity {
    pub user_id: UserId,
    pub username: String,
    pub active_slots: usize,
}

/// Point-in-time summary of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub total_slots: usize,
    /// Slots touched within `window_seconds`
    pub active_slots: usize,
    pub max_global_slots: usize,
    pub max_user_slots: usize,
    /// Users owning at least one slot
    pub active_users: usize,
    pub window_seconds: i64,
}

impl SlotStore {
    /// Users ranked by the number of their slots touched in the trailing
    /// window, most active first, ties by ascending user id.
    ///
    /// A non-positive window falls back to the configured default window.
    /// Each slot counts once however often it was touched.
    pub fn active_task_rank(&self, window_secs: i64) -> Vec<UserActivity> {
        let window_secs = self.effective_window(window_secs);

        let mut counts: AHashMap<UserId, UserActivity> = AHashMap::new();
        {
            let inner = self.read();
            let cutoff = self.now_secs().saturating_sub(window_secs);
            for cell in inner.cells.iter().filter(|c| c.updated_at >= cutoff) {
                counts
                    .entry(cell.user_id)
                    .or_insert_with(|| UserActivity {
                        user_id: cell.user_id,
                        username: cell.username.clone(),
                        active_slots: 0,
                    })
                    .active_slots += 1;
            }
        }

        let mut rank: Vec<UserActivity> = counts.into_values().collect();
        rank.sort_unstable_by(|a, b| {
            b.active_slots
                .cmp(&a.active_slots)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        rank
    }

    /// Ranking entries with at least `threshold` active slots.
    pub fn high_active_users(&self, window_secs: i64, threshold: usize) -> Vec<UserActivity> {
        let mut rank = self.active_task_rank(window_secs);
        rank.retain(|u| u.active_slots >= threshold);
        rank
    }

    pub fn stats(&self) -> SlotStats {
        let window_seconds = self.limits.default_window_secs;
        let inner = self.read();
        let cutoff = self.now_secs().saturating_sub(window_seconds);
        let active_slots = inner
            .cells
            .iter()
            .filter(|c| c.updated_at >= cutoff)
            .count();

        SlotStats {
            total_slots: inner.cells.len(),
            active_slots,
            max_global_slots: self.limits.global_capacity,
            max_user_slots: self.limits.per_user_capacity,
            active_users: inner.members.len(),
            window_seconds,
        }
    }

    fn effective_window(&self, window_secs: i64) -> i64 {
        if window_secs <= 0 {
            self.limits.default_window_secs
        } else {
            window_secs
        }
    }
}
