use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

/// Outcome classes the announce path reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnStatus {
    Ok,
    Unauthorized,
    InvalidInfoHash,
    Malformed,
}

/// Request-path counters.
///
/// `ann_total` and `store_write_errors` are monotonic; the per-status
/// `ann_*` counters and the announce-time samples swap to zero each time the
/// metrics endpoint reads them, so successive scrapes see per-window values.
pub struct Metrics {
    ann_total: AtomicI64,
    ann_ok: AtomicI64,
    ann_unauthorized: AtomicI64,
    ann_invalid_infohash: AtomicI64,
    ann_malformed: AtomicI64,
    store_write_errors: AtomicU64,
    ann_times_ns: Mutex<Vec<i64>>,
}

/// Point-in-time values, taken with the reset-on-read rules applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cache_torrents: usize,
    pub cache_peers: usize,
    pub cache_users: usize,
    pub ann_total: i64,
    pub ann_status_ok: i64,
    pub ann_status_unauthorized: i64,
    pub ann_status_invalid_infohash: i64,
    pub ann_status_malformed: i64,
    pub ann_time_ns_avg: i64,
    pub store_write_errors: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ann_total: AtomicI64::new(0),
            ann_ok: AtomicI64::new(0),
            ann_unauthorized: AtomicI64::new(0),
            ann_invalid_infohash: AtomicI64::new(0),
            ann_malformed: AtomicI64::new(0),
            store_write_errors: AtomicU64::new(0),
            ann_times_ns: Mutex::new(Vec::new()),
        }
    }

    pub fn record_announce(&self) {
        self.ann_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status(&self, status: AnnStatus) {
        let counter = match status {
            AnnStatus::Ok => &self.ann_ok,
            AnnStatus::Unauthorized => &self.ann_unauthorized,
            AnnStatus::InvalidInfoHash => &self.ann_invalid_infohash,
            AnnStatus::Malformed => &self.ann_malformed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_announce_time(&self, nanos: i64) {
        self.ann_times_ns
            .lock()
            .expect("metrics lock poisoned")
            .push(nanos);
    }

    pub fn record_store_write_error(&self) {
        self.store_write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot. Cache gauges are passed in by the caller, which owns
    /// the index and caches.
    pub fn snapshot(
        &self,
        cache_torrents: usize,
        cache_peers: usize,
        cache_users: usize,
    ) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_torrents,
            cache_peers,
            cache_users,
            ann_total: self.ann_total.load(Ordering::Relaxed),
            ann_status_ok: self.ann_ok.swap(0, Ordering::Relaxed),
            ann_status_unauthorized: self.ann_unauthorized.swap(0, Ordering::Relaxed),
            ann_status_invalid_infohash: self.ann_invalid_infohash.swap(0, Ordering::Relaxed),
            ann_status_malformed: self.ann_malformed.swap(0, Ordering::Relaxed),
            ann_time_ns_avg: self.drain_avg_announce_time(),
            store_write_errors: self.store_write_errors.load(Ordering::Relaxed),
        }
    }

    fn drain_avg_announce_time(&self) -> i64 {
        let mut times = self.ann_times_ns.lock().expect("metrics lock poisoned");
        if times.is_empty() {
            return 0;
        }
        let sum: i64 = times.iter().sum();
        let avg = sum / times.len() as i64;
        times.clear();
        avg
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSnapshot {
    /// Render in the text exposition format: `# HELP`, `# TYPE`, then
    /// `name value`, one triplet per metric.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024);

        let rows: [(&str, &str, &str, i64); 10] = [
            ("cache_torrents", "gauge", "total count of cached torrents", self.cache_torrents as i64),
            ("cache_peers", "gauge", "total count of cached peers", self.cache_peers as i64),
            ("cache_users", "gauge", "total count of cached users", self.cache_users as i64),
            ("ann_total", "counter", "total count of announces", self.ann_total),
            ("ann_status_ok", "gauge", "successful announces since last read", self.ann_status_ok),
            ("ann_status_unauthorized", "gauge", "unauthorized announces since last read", self.ann_status_unauthorized),
            ("ann_status_invalid_infohash", "gauge", "unknown info hash announces since last read", self.ann_status_invalid_infohash),
            ("ann_status_malformed", "gauge", "malformed announces since last read", self.ann_status_malformed),
            ("ann_time_ns_avg", "gauge", "average announce handling time in nanoseconds", self.ann_time_ns_avg),
            ("store_write_errors", "counter", "failed batch writes to the store", self.store_write_errors as i64),
        ];

        for (name, kind, help, value) in rows {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} {}", name, kind);
            let _ = writeln!(out, "{} {}", name, value);
        }

        out
    }
}
