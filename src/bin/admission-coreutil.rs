//! A small demo binary wiring the priority resolver, capacity guardian,
//! quota manager, scheduler, and rule engine together over the in-memory
//! store, for local exercising of the admission path end to end.

use std::sync::Arc;

use admission_core::capacity::{CapacityGuardian, CapacityLimits};
use admission_core::clock;
use admission_core::priority::{MatchType, PriorityResolver, ResolverConfig, TenantType};
use admission_core::quota::{QuotaManager, QuotaManagerConfig, QuotaType, WindowType};
use admission_core::request::Request;
use admission_core::rules::RuleEngine;
use admission_core::scheduler::{DispatchPolicy, PriorityScheduler, SchedulerConfig};
use admission_core::store::{InMemoryMappingStore, InMemoryQuotaStore, PriorityClassSeed};
use chrono::Utc;
use clap::Parser;

/// Run a scripted demo of the admission core against an in-memory store.
#[derive(Parser, Debug)]
#[command(name = "admission-coreutil", about = "Demo driver for the admission/scheduling core")]
struct Cli {
    /// Dispatch policy: strict, wfq, or hybrid.
    #[arg(long, default_value = "hybrid")]
    policy: String,

    /// Global max concurrent in-flight requests.
    #[arg(long, default_value_t = 4)]
    max_concurrent: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    admission_core::telemetry::init();
    let cli = Cli::parse();
    let policy = match cli.policy.as_str() {
        "strict" => DispatchPolicy::Strict,
        "wfq" => DispatchPolicy::Wfq,
        _ => DispatchPolicy::Hybrid,
    };

    let clock = clock::system();

    let mapping_store = Arc::new(InMemoryMappingStore::new());
    let now = Utc::now();
    mapping_store.seed(
        "tok_prod*",
        MatchType::Prefix,
        PriorityClassSeed(0),
        uuid::Uuid::new_v4(),
        "prod-tenant",
        TenantType::Internal,
        now,
    );
    mapping_store.seed(
        "tok_ext_free*",
        MatchType::Prefix,
        PriorityClassSeed(9),
        uuid::Uuid::new_v4(),
        "free-tenant",
        TenantType::External,
        now,
    );
    let resolver = PriorityResolver::new(mapping_store, clock.clone(), ResolverConfig::default());
    resolver.reload().await?;

    let quota_store = Arc::new(InMemoryQuotaStore::new());
    quota_store.seed(
        "dept-a",
        QuotaType::Hard,
        "tokens_per_month",
        1_000_000,
        0,
        WindowType::Monthly,
        now,
    );
    let quota_manager = QuotaManager::new(quota_store, clock.clone(), QuotaManagerConfig::default());
    quota_manager.reload().await?;
    quota_manager.spawn_sync_loop();

    let capacity = CapacityGuardian::spawn(CapacityLimits::new(0, 0, cli.max_concurrent, 0));
    let scheduler = PriorityScheduler::new(
        SchedulerConfig {
            policy,
            ..SchedulerConfig::default()
        },
        capacity,
        clock.clone(),
    );
    scheduler.start();

    let rule_engine = RuleEngine::new(clock.clone());
    rule_engine.attach_scheduler(scheduler.clone()).await;
    rule_engine.attach_quota_manager(quota_manager.clone());
    rule_engine.start();

    let priority = resolver.resolve("tok_prodABC").await;
    let quota_check = quota_manager
        .check_and_reserve("dept-a", None, None, 100)
        .await;
    tracing::info!(priority, allowed = quota_check.allowed, "quota check for demo account");

    let (request, rx) = Request::new(
        "demo-1",
        priority,
        100,
        "dept-a",
        "gpt-4",
        chrono::Duration::seconds(30),
        now,
    );
    let ack = scheduler.submit(request).await?;
    tracing::info!(?ack, "submit acknowledged");
    let result = rx.await?;
    tracing::info!(?result, "final schedule result");

    let stats = scheduler.get_detailed_stats().await;
    tracing::info!(counters = ?stats.counters, depths = ?stats.queue_depths, "scheduler stats");

    scheduler.shutdown();
    rule_engine.shutdown();
    quota_manager.shutdown();
    Ok(())
}
