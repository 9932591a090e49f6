use std::sync::Arc;

use slotwatch_lib::config::SlotConfig;
use slotwatch_lib::slots::{ManualClock, SlotStore};

fn store(now: i64) -> (SlotStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    (SlotStore::with_clock(&SlotConfig::default(), clock.clone()), clock)
}

fn record_n(store: &SlotStore, user_id: i64, username: &str, n: usize) {
    for i in 0..n {
        store.record_task(user_id, username, &format!("{username}-task-{i}"));
    }
}

#[test]
fn rank_orders_by_count_then_user_id() {
    let (store, _clock) = store(10_000);
    record_n(&store, 30, "zoe", 2);
    record_n(&store, 10, "amy", 5);
    record_n(&store, 20, "bea", 2);

    let rank = store.active_task_rank(30);
    let order: Vec<(i64, usize)> = rank.iter().map(|u| (u.user_id, u.active_slots)).collect();
    assert_eq!(order, vec![(10, 5), (20, 2), (30, 2)]);
    assert_eq!(rank[0].username, "amy");
}

#[test]
fn rank_uses_latest_username() {
    let (store, _clock) = store(10_000);
    store.record_task(10, "amy", "task-1");
    store.record_task(10, "amy.w", "task-2");

    let rank = store.active_task_rank(30);
    assert_eq!(rank.len(), 1);
    assert_eq!(rank[0].username, "amy.w");
}

#[test]
fn non_positive_window_falls_back_to_default() {
    let (store, clock) = store(10_000);
    clock.set(9_950);
    record_n(&store, 1, "old", 1);
    clock.set(10_000);
    record_n(&store, 2, "new", 1);

    let ids = |window| {
        store
            .active_task_rank(window)
            .into_iter()
            .map(|u| u.user_id)
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(0), vec![2]);
    assert_eq!(ids(-5), vec![2]);
    assert_eq!(ids(60), vec![1, 2]);
}

#[test]
fn empty_store_ranks_nobody() {
    let (store, _clock) = store(0);
    assert!(store.active_task_rank(30).is_empty());
    assert!(store.high_active_users(30, 1).is_empty());
}

#[test]
fn high_active_users_applies_threshold() {
    let (store, _clock) = store(10_000);
    record_n(&store, 1, "busy", 6);
    record_n(&store, 2, "edge", 5);
    record_n(&store, 3, "calm", 4);

    let users = store.high_active_users(600, 5);
    let ids: Vec<i64> = users.iter().map(|u| u.user_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn stats_reflect_store_state() {
    let (store, clock) = store(10_000);
    clock.set(9_000);
    record_n(&store, 1, "old", 3);
    clock.set(10_000);
    record_n(&store, 2, "new", 2);

    let stats = store.stats();
    assert_eq!(stats.total_slots, 5);
    assert_eq!(stats.active_slots, 2);
    assert_eq!(stats.active_users, 2);
    assert_eq!(stats.max_global_slots, 1_000);
    assert_eq!(stats.max_user_slots, 50);
    assert_eq!(stats.window_seconds, 30);
}
