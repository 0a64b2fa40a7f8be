use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub total_response_time: Duration,
    pub last_request_time: Option<SystemTime>,
    pub requests_by_route: BTreeMap<String, RouteMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_response_time: Duration,
    pub max_response_time: Duration,
}

/// One finished request. `route` is the endpoint template (`/user/{name}/about`),
/// not the concrete path, so per-user calls share a bucket.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub route: &'static str,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub success: bool,
    pub rate_limited: bool,
}

impl RouteMetrics {
    fn new() -> Self {
        Self {
            request_count: 0,
            success_count: 0,
            error_count: 0,
            total_response_time: Duration::ZERO,
            max_response_time: Duration::ZERO,
        }
    }

    fn update(&mut self, metrics: &RequestMetrics) {
        self.request_count += 1;
        self.total_response_time += metrics.response_time;
        self.max_response_time = self.max_response_time.max(metrics.response_time);

        if metrics.success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
    }

    pub fn average_response_time(&self) -> Duration {
        if self.request_count == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.request_count as u32
        }
    }
}

impl ApiMetrics {
    pub fn average_response_time(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.total_requests as u32
        }
    }

    pub fn summary(&self) -> String {
        let routes = self
            .requests_by_route
            .iter()
            .map(|(route, m)| format!("{}={}", route, m.request_count))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{} requests ({} ok, {} failed, {} rate limited), avg {:?} [{}]",
            self.total_requests,
            self.successful_requests,
            self.failed_requests,
            self.rate_limited_requests,
            self.average_response_time(),
            routes
        )
    }
}

#[derive(Debug)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ApiMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(ApiMetrics::default())),
        }
    }

    pub async fn record_request(&self, request_metrics: RequestMetrics) {
        let mut metrics = self.metrics.write().await;

        metrics.total_requests += 1;
        metrics.last_request_time = Some(SystemTime::now());
        metrics.total_response_time += request_metrics.response_time;

        if request_metrics.success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }

        if request_metrics.rate_limited {
            metrics.rate_limited_requests += 1;
        }

        metrics
            .requests_by_route
            .entry(request_metrics.route.to_string())
            .or_insert_with(RouteMetrics::new)
            .update(&request_metrics);
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn get_route_metrics(&self, route: &str) -> Option<RouteMetrics> {
        let metrics = self.metrics.read().await;
        metrics.requests_by_route.get(route).cloned()
    }

    pub async fn reset_metrics(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = ApiMetrics::default();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(route: &'static str, millis: u64, success: bool) -> RequestMetrics {
        RequestMetrics {
            route,
            status_code: Some(if success { 200 } else { 500 }),
            response_time: Duration::from_millis(millis),
            success,
            rate_limited: false,
        }
    }

    #[tokio::test]
    async fn test_metrics_collection() {
        let collector = MetricsCollector::new();

        collector.record_request(request("/api/info", 150, true)).await;
        collector.record_request(request("/api/info", 50, false)).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.average_response_time(), Duration::from_millis(100));
        assert!(metrics.last_request_time.is_some());
    }

    #[tokio::test]
    async fn test_route_metrics() {
        let collector = MetricsCollector::new();

        collector
            .record_request(request("/user/{name}/about", 100, true))
            .await;
        collector
            .record_request(request("/user/{name}/about", 300, true))
            .await;

        let route = collector
            .get_route_metrics("/user/{name}/about")
            .await
            .unwrap();
        assert_eq!(route.request_count, 2);
        assert_eq!(route.success_count, 2);
        assert_eq!(route.average_response_time(), Duration::from_millis(200));
        assert_eq!(route.max_response_time, Duration::from_millis(300));

        assert!(collector.get_route_metrics("/api/info").await.is_none());
    }

    #[tokio::test]
    async fn test_summary_and_reset() {
        let collector = MetricsCollector::new();
        collector.record_request(request("/r/{sub}/new", 20, true)).await;

        let summary = collector.get_metrics().await.summary();
        assert!(summary.starts_with("1 requests"));
        assert!(summary.contains("/r/{sub}/new=1"));

        collector.reset_metrics().await;
        assert_eq!(collector.get_metrics().await.total_requests, 0);
    }
}
