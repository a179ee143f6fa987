use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Instant,
};

use once_cell::sync::Lazy;

pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));

#[derive(Debug)]
pub struct Metrics {
    start: Instant,
    ready: AtomicBool,
    connected_guilds: AtomicUsize,
    queued_clips: AtomicUsize,
    clips_played: AtomicU64,
    clips_skipped: AtomicU64,
    playback_errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl Metrics {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            ready: AtomicBool::new(false),
            connected_guilds: AtomicUsize::new(0),
            queued_clips: AtomicUsize::new(0),
            clips_played: AtomicU64::new(0),
            clips_skipped: AtomicU64::new(0),
            playback_errors: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    pub fn set_ready(&self, v: bool) {
        self.ready.store(v, Ordering::Relaxed);
    }
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn inc_connections(&self) {
        self.connected_guilds.fetch_add(1, Ordering::Relaxed);
    }
    pub fn dec_connections(&self) {
        let _ = self
            .connected_guilds
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }

    pub fn inc_queue(&self, n: usize) {
        self.queued_clips.fetch_add(n, Ordering::Relaxed);
    }
    pub fn dec_queue(&self, n: usize) {
        let _ = self
            .queued_clips
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(n))
            });
    }

    pub fn inc_played(&self) {
        self.clips_played.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_skipped(&self) {
        self.clips_skipped.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_playback_error(&self) {
        self.playback_errors.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start.elapsed().as_secs(),
            ready: self.is_ready(),
            connected_guilds: self.connected_guilds.load(Ordering::Relaxed),
            queued_clips: self.queued_clips.load(Ordering::Relaxed),
            clips_played: self.clips_played.load(Ordering::Relaxed),
            clips_skipped: self.clips_skipped.load(Ordering::Relaxed),
            playback_errors: self.playback_errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub ready: bool,
    pub connected_guilds: usize,
    pub queued_clips: usize,
    pub clips_played: u64,
    pub clips_skipped: u64,
    pub playback_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl MetricsSnapshot {
    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut metric = |name: &str, kind: &str, help: &str, value: u64| {
            out.push_str(&format!(
                "# HELP hotspring_{name} {help}\n# TYPE hotspring_{name} {kind}\nhotspring_{name} {value}\n"
            ));
        };
        metric("uptime_seconds", "counter", "Seconds since process start", self.uptime_secs);
        metric("ready", "gauge", "1 if ready, 0 otherwise", u64::from(self.ready));
        metric("connected_guilds", "gauge", "Guilds with a voice connection", self.connected_guilds as u64);
        metric("queued_clips", "gauge", "Clips waiting across all guild queues", self.queued_clips as u64);
        metric("clips_played_total", "counter", "Clips handed to the voice sink", self.clips_played);
        metric("clips_skipped_total", "counter", "Queued clips skipped for a missing file", self.clips_skipped);
        metric("playback_errors_total", "counter", "Playback failures that cleared a queue", self.playback_errors);
        metric("message_cache_hits_total", "counter", "Message lookups served from cache", self.cache_hits);
        metric("message_cache_misses_total", "counter", "Message lookups that went upstream", self.cache_misses);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_exposes_every_counter() {
        let snap = Metrics::new().snapshot();
        let text = snap.render();
        assert!(text.contains("hotspring_ready 0\n"));
        assert!(text.contains("# TYPE hotspring_clips_played_total counter\n"));
        assert_eq!(text.lines().filter(|l| l.starts_with("# HELP")).count(), 9);
    }
}
