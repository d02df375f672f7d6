//! End-to-end scenarios, each driving two or more components together
//! the way the demo binary does.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use admission_core::capacity::{CapacityGuardian, CapacityLimits};
use admission_core::clock::FixedClock;
use admission_core::priority::{MatchType, PriorityResolver, ResolverConfig, TenantType};
use admission_core::quota::{QuotaManager, QuotaManagerConfig, QuotaType, WindowType};
use admission_core::request::{reasons, Request};
use admission_core::rules::{RuleEngine, TimeWindow};
use admission_core::scheduler::{DispatchPolicy, PriorityScheduler, SchedulerConfig};
use admission_core::store::{InMemoryMappingStore, InMemoryQuotaStore, PriorityClassSeed};
use chrono::{TimeZone, Utc};
use futures::future::{self, FutureExt};
use uuid::Uuid;

/// Scenario 1: P0 routing via a prefix mapping, default P7.
#[tokio::test]
async fn scenario_p0_routing() {
    let store = Arc::new(InMemoryMappingStore::new());
    let now = Utc::now();
    store.seed(
        "tok_prod*",
        MatchType::Prefix,
        PriorityClassSeed(0),
        Uuid::new_v4(),
        "prod-tenant",
        TenantType::Internal,
        now,
    );
    store.seed(
        "tok_ext_free*",
        MatchType::Prefix,
        PriorityClassSeed(9),
        Uuid::new_v4(),
        "free-tenant",
        TenantType::External,
        now,
    );
    let resolver = PriorityResolver::new(
        store,
        admission_core::clock::system(),
        ResolverConfig {
            default_priority: 7,
            ..ResolverConfig::default()
        },
    );
    resolver.reload().await.unwrap();
    assert_eq!(resolver.resolve("tok_prodABC").await, 0);

    let capacity = CapacityGuardian::spawn(CapacityLimits::default());
    let scheduler = PriorityScheduler::new(SchedulerConfig::default(), capacity, admission_core::clock::system());
    scheduler.start();

    let (request, rx) = Request::new(
        "r1",
        resolver.resolve("tok_prodABC").await,
        10,
        "acct",
        "gpt",
        chrono::Duration::seconds(5),
        now,
    );
    let ack = scheduler.submit(request).await.unwrap();
    assert!(ack.accepted);
    assert_eq!(ack.reason, "capacity available");
    assert_eq!(rx.await.unwrap().reason, "capacity available");

    let stats = scheduler.get_detailed_stats().await;
    assert_eq!(stats.counters.total_scheduled, 1);
}

/// Scenario 2: reload picks up a priority change within one reload cycle.
#[tokio::test]
async fn scenario_dynamic_priority_reload() {
    let store = Arc::new(InMemoryMappingStore::new());
    let now = Utc::now();
    let id = store.seed(
        "tok_ml*",
        MatchType::Prefix,
        PriorityClassSeed(1),
        Uuid::new_v4(),
        "ml-tenant",
        TenantType::Internal,
        now,
    );
    let resolver = PriorityResolver::new(
        store.clone(),
        admission_core::clock::system(),
        ResolverConfig {
            cache_ttl: StdDuration::from_millis(0),
            ..ResolverConfig::default()
        },
    );
    resolver.reload().await.unwrap();
    assert_eq!(resolver.resolve("tok_ml_42").await, 1);

    let mut updated = store.list().await.unwrap().into_iter().find(|m| m.id == id).unwrap();
    updated.priority = 0;
    resolver.update_mapping(updated).await.unwrap();

    assert_eq!(resolver.resolve("tok_ml_42").await, 0);
}

/// Scenario 3: a hard quota at 950/1000 rejects a 100-token request without
/// mutating `used_value`.
#[tokio::test]
async fn scenario_hard_quota_enforcement() {
    let store = Arc::new(InMemoryQuotaStore::new());
    store.seed(
        "dept-a",
        QuotaType::Hard,
        "tokens_per_month",
        1000,
        950,
        WindowType::Monthly,
        Utc::now(),
    );
    let manager = QuotaManager::new(store.clone(), admission_core::clock::system(), QuotaManagerConfig::default());
    manager.reload().await.unwrap();

    let result = manager.check_and_reserve("dept-a", None, None, 100).await;
    assert!(!result.allowed);
    assert_eq!(result.rejection_code, reasons::HARD_LIMIT);

    let rows = store.list().await.unwrap();
    assert_eq!(rows[0].used_value, 950);
}

/// Scenario 5: single-request overflows are fatal and never queued.
#[tokio::test]
async fn scenario_fatal_vs_transient_capacity() {
    let capacity = CapacityGuardian::spawn(CapacityLimits::new(2000, 0, 0, 4096));

    let over_tokens = capacity.check_and_reserve(5000).await;
    assert!(!over_tokens.accepted);
    assert!(over_tokens.fatal);
    assert!(over_tokens.reason.contains("tokens"));

    let over_context = capacity.check_and_reserve(4097).await;
    assert!(!over_context.accepted);
    assert!(over_context.fatal);
    assert!(over_context.reason.contains("context"));

    capacity.shutdown();
}

/// Scenario 6: day/night weight rules switch the scheduler's active weights,
/// and reverting out of both windows returns to the baseline.
#[tokio::test]
async fn scenario_time_based_day_night_switch() {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 3, 14, 30, 0).unwrap()); // Wed 14:30 UTC
    let shared_clock: admission_core::SharedClock = Arc::new(clock.clone());

    let capacity = CapacityGuardian::spawn(CapacityLimits::default());
    let scheduler = PriorityScheduler::new(SchedulerConfig::default(), capacity, shared_clock.clone());

    let engine = RuleEngine::new(shared_clock.clone());
    engine.attach_scheduler(scheduler.clone()).await;

    let mut weekdays = std::collections::HashSet::new();
    for d in [
        chrono::Weekday::Mon,
        chrono::Weekday::Tue,
        chrono::Weekday::Wed,
        chrono::Weekday::Thu,
        chrono::Weekday::Fri,
    ] {
        weekdays.insert(d);
    }
    let daytime_weights = vec![256, 128, 64, 32, 16, 8, 4, 2, 1, 1];
    engine.add_weight_rule(
        "daytime",
        "daytime weights",
        TimeWindow::new(8, 0, 18, 0, weekdays.clone(), chrono_tz::UTC),
        daytime_weights.clone(),
    );
    let nighttime_weights = vec![32, 32, 32, 32, 32, 64, 64, 64, 32, 16];
    engine.add_weight_rule(
        "nighttime",
        "nighttime weights",
        TimeWindow::new(18, 0, 8, 0, weekdays, chrono_tz::UTC),
        nighttime_weights.clone(),
    );

    // 14:30 Wed: daytime window active.
    engine.apply_rules_now().await;
    assert_eq!(scheduler.current_weights(), daytime_weights);

    // 22:00 Wed: nighttime window active.
    clock.set(Utc.with_ymd_and_hms(2024, 1, 3, 22, 0, 0).unwrap());
    engine.apply_rules_now().await;
    assert_eq!(scheduler.current_weights(), nighttime_weights);

    // 10:00 Sat: outside both weekday sets, reverts to baseline.
    let baseline = admission_core::scheduler::default_weights(10);
    clock.set(Utc.with_ymd_and_hms(2024, 1, 6, 10, 0, 0).unwrap());
    engine.apply_rules_now().await;
    assert_eq!(scheduler.current_weights(), baseline);
}

/// Scenario 4: hybrid dispatch under backlog. `L=10`, weights
/// `[256,128,64,32,16,8,4,2,1,1]`, `maxConcurrent=1`, 10 class-0 requests
/// followed by 10 class-9 requests. Strict priority must fully drain class 0
/// before class 9 ever sees the capacity slot, even though both classes are
/// backlogged the entire time.
#[tokio::test]
async fn scenario_hybrid_backlog_fairness() {
    let weights = vec![256u64, 128, 64, 32, 16, 8, 4, 2, 1, 1];
    let capacity = CapacityGuardian::spawn(CapacityLimits::new(0, 0, 1, 0));
    let scheduler = PriorityScheduler::new(
        SchedulerConfig {
            num_priority_levels: 10,
            max_queue_depth: 1000,
            policy: DispatchPolicy::Hybrid,
            tick_interval: StdDuration::from_millis(5),
            ..SchedulerConfig::default()
        },
        capacity,
        admission_core::clock::system(),
    );
    scheduler.update_weights(weights).unwrap();
    scheduler.start();

    let now = Utc::now();
    let mut receivers = Vec::new();
    for i in 0..10u8 {
        let (request, rx) = Request::new(format!("c0-{i}"), 0, 10, "acct", "gpt", chrono::Duration::seconds(30), now);
        let ack = scheduler.submit(request).await.unwrap();
        assert!(ack.accepted);
        receivers.push((i as usize, rx));
    }
    for i in 0..10u8 {
        let (request, rx) = Request::new(format!("c9-{i}"), 9, 10, "acct", "gpt", chrono::Duration::seconds(30), now);
        let ack = scheduler.submit(request).await.unwrap();
        assert!(ack.accepted);
        receivers.push((10 + i as usize, rx));
    }

    let mut futs: Vec<_> = receivers
        .into_iter()
        .map(|(idx, rx)| async move { (idx, rx.await.unwrap()) }.boxed())
        .collect();
    let mut completion_order = Vec::new();
    while !futs.is_empty() {
        let ((idx, result), _done_idx, remaining) = future::select_all(futs).await;
        futs = remaining;
        assert!(result.accepted);
        completion_order.push(idx);
        scheduler.release(10).await;
    }

    assert_eq!(completion_order.len(), 20);
    let last_class0 = completion_order.iter().rposition(|&i| i < 10).unwrap();
    let first_class9 = completion_order.iter().position(|&i| i >= 10).unwrap();
    assert!(
        last_class0 < first_class9,
        "a class-9 request completed before class 0's backlog drained: {completion_order:?}"
    );

    scheduler.shutdown();
}
