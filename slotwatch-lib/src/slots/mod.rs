//! Active task slots.
//!
//! A slot is "the most recent activity believed to belong to one task". The
//! [`SlotStore`] keeps a fixed-capacity arena of them, bounded per user and
//! globally, and reuses the least recently touched slot when a bound is hit.
//! Memory use is proportional to the global capacity, never to traffic.
//!
//! Reporting (`active_task_rank`, `high_active_users`, `stats`) runs under the
//! shared side of the same lock, so it never observes a half-applied eviction.

mod clock;
mod rank;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rank::{SlotStats, UserActivity};
pub use store::{RecordOutcome, SlotStore, SlotView, UserId};
