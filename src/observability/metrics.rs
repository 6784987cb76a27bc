//! Thread-safe metrics collection system
//!
//! Provides atomic counters and a mutex-protected per-pattern table for
//! tracking broker connectivity, publishing and user creation.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Broker connectivity
    broker_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    reconnect_exhaustions: AtomicU64,
    connection_start_time: AtomicU64,

    // Publishing
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    published_by_pattern: Mutex<HashMap<String, u64>>,

    // Service
    users_created: AtomicU64,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            broker_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            reconnect_exhaustions: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            published_by_pattern: Mutex::new(HashMap::new()),
            users_created: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Broker metrics
    pub fn broker_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broker_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.broker_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn broker_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broker_connection_lost(&self) {
        self.broker_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn broker_reconnect_exhausted(&self) {
        self.reconnect_exhaustions.fetch_add(1, Ordering::Relaxed);
        self.broker_connection_lost();
    }

    pub fn message_published(&self, pattern: &str) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut patterns) = self.published_by_pattern.lock() {
            *patterns.entry(pattern.to_string()).or_insert(0) += 1;
        }
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn user_created(&self) {
        self.users_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Calculate connection duration (pure function)
    fn calculate_connection_duration(&self, now: u64) -> u64 {
        if !self.broker_connected.load(Ordering::Relaxed) {
            return 0;
        }
        let start_time = self.connection_start_time.load(Ordering::Relaxed);
        if start_time > 0 {
            now.saturating_sub(start_time)
        } else {
            0
        }
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let published_by_pattern = self
            .published_by_pattern
            .lock()
            .map(|patterns| patterns.clone())
            .unwrap_or_default();

        MetricsSnapshot {
            timestamp: now,
            broker: BrokerMetrics {
                connected: self.broker_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                reconnect_exhaustions: self.reconnect_exhaustions.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
            },
            publishing: PublishingMetrics {
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                published_by_pattern,
            },
            service: ServiceMetrics {
                users_created: self.users_created.load(Ordering::Relaxed),
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            },
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.broker_connected.store(false, Ordering::Relaxed);
        self.connection_attempts.store(0, Ordering::Relaxed);
        self.connections_established.store(0, Ordering::Relaxed);
        self.connection_failures.store(0, Ordering::Relaxed);
        self.reconnect_exhaustions.store(0, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
        self.messages_published.store(0, Ordering::Relaxed);
        self.publish_failures.store(0, Ordering::Relaxed);
        self.users_created.store(0, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut patterns) = self.published_by_pattern.lock() {
            patterns.clear();
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete metrics snapshot for export
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub broker: BrokerMetrics,
    pub publishing: PublishingMetrics,
    pub service: ServiceMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub reconnect_exhaustions: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishingMetrics {
    pub messages_published: u64,
    pub publish_failures: u64,
    pub published_by_pattern: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetrics {
    pub users_created: u64,
    pub uptime_seconds: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
