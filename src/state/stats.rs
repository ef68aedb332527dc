use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for one scan
///
/// Only the engine mutates this, under its stats lock; everyone else gets
/// snapshot clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlStats {
    pub urls_discovered: u64,
    pub urls_crawled: u64,
    pub forms_found: u64,
    pub technologies_detected: u64,
    pub errors: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self {
            urls_discovered: 0,
            urls_crawled: 0,
            forms_found: 0,
            technologies_detected: 0,
            errors: 0,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Wall-clock duration so far, or of the finished scan
    pub fn elapsed(&self) -> chrono::Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }

    /// Pages crawled per second of elapsed time
    pub fn pages_per_second(&self) -> f64 {
        let secs = self.elapsed().num_milliseconds() as f64 / 1000.0;
        if secs <= 0.0 {
            return 0.0;
        }
        self.urls_crawled as f64 / secs
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_stats_are_zero() {
        let stats = CrawlStats::new();
        assert_eq!(stats.urls_discovered, 0);
        assert_eq!(stats.errors, 0);
        assert!(!stats.is_finished());
    }

    #[test]
    fn test_pages_per_second() {
        let mut stats = CrawlStats::new();
        stats.urls_crawled = 20;
        stats.end_time = Some(stats.start_time + Duration::seconds(10));
        assert!((stats.pages_per_second() - 2.0).abs() < f64::EPSILON);
        assert!(stats.is_finished());
    }

    #[test]
    fn test_pages_per_second_zero_elapsed() {
        let mut stats = CrawlStats::new();
        stats.urls_crawled = 5;
        stats.end_time = Some(stats.start_time);
        assert_eq!(stats.pages_per_second(), 0.0);
    }

    #[test]
    fn test_serializes_timestamps() {
        let stats = CrawlStats::new();
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json["start_time"].is_string());
        assert!(json["end_time"].is_null());
    }
}
