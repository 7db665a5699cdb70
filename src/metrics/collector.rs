//! Metrics collection using Prometheus
//!
//! Engine counters are exported from [`LfgManagerStats`] snapshots taken
//! once per tick; request and notification traffic is recorded as it
//! happens.

use crate::manager::{LfgManagerStats, TickReport};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Main metrics collector for the dungeon finder service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue and join metrics
    queue_metrics: QueueMetrics,

    /// Role check, proposal and vote kick metrics
    group_metrics: GroupMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,

    /// Last exported engine snapshot, counters are advanced by the difference
    last_stats: Arc<Mutex<LfgManagerStats>>,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Notifications handed to the publisher
    pub notifications_total: IntCounterVec,
}

/// Queue and join metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Join requests by result
    pub joins_total: IntCounterVec,

    /// Queue entries (players and groups) waiting
    pub queued_entries: IntGauge,

    /// Players waiting across all queues
    pub queued_players: IntGauge,

    /// Compatibility cache lookups by result
    pub cache_lookups_total: IntCounterVec,

    /// Candidate sets evaluated by the matcher
    pub compatibility_evaluations_total: IntCounter,
}

/// Role check, proposal and vote kick metrics
#[derive(Clone)]
pub struct GroupMetrics {
    pub role_checks_total: IntCounterVec,
    pub active_role_checks: IntGauge,
    pub proposals_total: IntCounterVec,
    pub active_proposals: IntGauge,
    pub groups_formed_total: IntCounter,
    pub boots_total: IntCounterVec,
    pub active_boots: IntGauge,
    pub dungeons_finished_total: IntCounter,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Request handling time by request type
    pub request_processing_duration: HistogramVec,

    /// Scheduler tick time
    pub tick_duration: Histogram,

    /// Proposals created per tick
    pub proposals_per_tick: Histogram,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let group_metrics = GroupMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            group_metrics,
            performance_metrics,
            last_stats: Arc::new(Mutex::new(LfgManagerStats::default())),
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn groups(&self) -> &GroupMetrics {
        &self.group_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Export an engine snapshot
    ///
    /// Counters move by the difference to the previous snapshot, so calling
    /// this on every tick never double counts.
    pub fn update_from_lfg_stats(&self, stats: &LfgManagerStats) {
        let Ok(mut last) = self.last_stats.lock() else {
            return;
        };
        let delta = |now: u64, before: u64| now.saturating_sub(before);

        let q = &self.queue_metrics;
        q.joins_total
            .with_label_values(&["accepted"])
            .inc_by(delta(stats.joins_accepted, last.joins_accepted));
        q.joins_total
            .with_label_values(&["rejected"])
            .inc_by(delta(stats.joins_rejected, last.joins_rejected));
        q.cache_lookups_total
            .with_label_values(&["hit"])
            .inc_by(delta(stats.cache_hits, last.cache_hits));
        q.cache_lookups_total
            .with_label_values(&["miss"])
            .inc_by(delta(stats.cache_misses, last.cache_misses));
        q.compatibility_evaluations_total
            .inc_by(delta(stats.cache_evaluations, last.cache_evaluations));
        q.queued_entries.set(stats.queued_entries as i64);
        q.queued_players.set(stats.queued_players as i64);

        let g = &self.group_metrics;
        g.role_checks_total
            .with_label_values(&["started"])
            .inc_by(delta(stats.role_checks_started, last.role_checks_started));
        g.role_checks_total
            .with_label_values(&["failed"])
            .inc_by(delta(stats.role_checks_failed, last.role_checks_failed));
        g.proposals_total
            .with_label_values(&["created"])
            .inc_by(delta(stats.proposals_created, last.proposals_created));
        g.proposals_total
            .with_label_values(&["succeeded"])
            .inc_by(delta(stats.proposals_succeeded, last.proposals_succeeded));
        g.proposals_total
            .with_label_values(&["failed"])
            .inc_by(delta(stats.proposals_failed, last.proposals_failed));
        g.groups_formed_total
            .inc_by(delta(stats.groups_formed, last.groups_formed));
        g.boots_total
            .with_label_values(&["started"])
            .inc_by(delta(stats.boots_started, last.boots_started));
        g.boots_total
            .with_label_values(&["kicked"])
            .inc_by(delta(stats.kicks_completed, last.kicks_completed));
        g.dungeons_finished_total
            .inc_by(delta(stats.dungeons_finished, last.dungeons_finished));
        g.active_role_checks.set(stats.active_role_checks as i64);
        g.active_proposals.set(stats.active_proposals as i64);
        g.active_boots.set(stats.active_boots as i64);

        *last = stats.clone();
    }

    /// Record one scheduler tick
    pub fn record_tick(&self, report: &TickReport, duration: Duration) {
        self.performance_metrics
            .tick_duration
            .observe(duration.as_secs_f64());
        self.performance_metrics
            .proposals_per_tick
            .observe(report.new_proposals as f64);
    }

    /// Record a request being handled
    pub fn record_request(&self, kind: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };
        self.performance_metrics
            .request_processing_duration
            .with_label_values(&[kind, status])
            .observe(duration.as_secs_f64());
    }

    /// Record a notification leaving the service
    pub fn record_notification(&self, kind: &str) {
        self.service_metrics
            .notifications_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("dungeon_finder_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "dungeon_finder_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("dungeon_finder_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "dungeon_finder_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("dungeon_finder_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "dungeon_finder_notifications_total",
                "Notifications published to clients",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
            notifications_total,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let joins_total = IntCounterVec::new(
            Opts::new("dungeon_finder_joins_total", "Join requests by result"),
            &["result"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let queued_entries = IntGauge::new(
            "dungeon_finder_queued_entries",
            "Players and groups waiting in queue",
        )?;
        registry.register(Box::new(queued_entries.clone()))?;

        let queued_players = IntGauge::new(
            "dungeon_finder_queued_players",
            "Players waiting in queue",
        )?;
        registry.register(Box::new(queued_players.clone()))?;

        let cache_lookups_total = IntCounterVec::new(
            Opts::new(
                "dungeon_finder_compatibility_cache_lookups_total",
                "Compatibility cache lookups",
            ),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups_total.clone()))?;

        let compatibility_evaluations_total = IntCounter::new(
            "dungeon_finder_compatibility_evaluations_total",
            "Candidate sets evaluated",
        )?;
        registry.register(Box::new(compatibility_evaluations_total.clone()))?;

        Ok(Self {
            joins_total,
            queued_entries,
            queued_players,
            cache_lookups_total,
            compatibility_evaluations_total,
        })
    }
}

impl GroupMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let role_checks_total = IntCounterVec::new(
            Opts::new("dungeon_finder_role_checks_total", "Role checks by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(role_checks_total.clone()))?;

        let active_role_checks =
            IntGauge::new("dungeon_finder_active_role_checks", "Role checks in progress")?;
        registry.register(Box::new(active_role_checks.clone()))?;

        let proposals_total = IntCounterVec::new(
            Opts::new("dungeon_finder_proposals_total", "Proposals by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(proposals_total.clone()))?;

        let active_proposals =
            IntGauge::new("dungeon_finder_active_proposals", "Proposals awaiting answers")?;
        registry.register(Box::new(active_proposals.clone()))?;

        let groups_formed_total =
            IntCounter::new("dungeon_finder_groups_formed_total", "Groups formed")?;
        registry.register(Box::new(groups_formed_total.clone()))?;

        let boots_total = IntCounterVec::new(
            Opts::new("dungeon_finder_boots_total", "Vote kicks by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(boots_total.clone()))?;

        let active_boots = IntGauge::new("dungeon_finder_active_boots", "Vote kicks in progress")?;
        registry.register(Box::new(active_boots.clone()))?;

        let dungeons_finished_total = IntCounter::new(
            "dungeon_finder_dungeons_finished_total",
            "Dungeons completed by finder groups",
        )?;
        registry.register(Box::new(dungeons_finished_total.clone()))?;

        Ok(Self {
            role_checks_total,
            active_role_checks,
            proposals_total,
            active_proposals,
            groups_formed_total,
            boots_total,
            active_boots,
            dungeons_finished_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let request_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "dungeon_finder_request_processing_duration_seconds",
                "Request processing time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["request", "status"],
        )?;
        registry.register(Box::new(request_processing_duration.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "dungeon_finder_tick_duration_seconds",
                "Scheduler tick duration",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let proposals_per_tick = Histogram::with_opts(
            HistogramOpts::new(
                "dungeon_finder_proposals_per_tick",
                "Proposals created by one tick",
            )
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0]),
        )?;
        registry.register(Box::new(proposals_per_tick.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "dungeon_finder_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            request_processing_duration,
            tick_duration,
            proposals_per_tick,
            amqp_operation_duration,
        })
    }
}
