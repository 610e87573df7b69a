use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cloudcost_core::{
    CostQuery, CostQueryEngine, CostResult, EndpointResolver, ErrorKind, Normalizer,
    QueryStrategyChain, QueryWindow, ResolvedEndpoint, Resolution, ResponseShape,
    StaticResolver,
};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn engine(server: &MockServer) -> CostQueryEngine {
    CostQueryEngine::new(
        Arc::new(StaticResolver::new(server.uri(), "test-token")),
        QueryStrategyChain::new(
            Client::new(),
            ResponseShape::PRIORITY.to_vec(),
            Duration::from_secs(5),
        ),
        Normalizer::new("USD"),
        Duration::from_secs(5),
    )
}

async fn serve_summary(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/v2/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn two_day_body() -> Value {
    json!({
        "total": 3,
        "columns": ["begin", "end", "qty", "rate"],
        "results": [
            ["2026-01-01T00:30:00Z", "2026-01-01T01:00:00Z", 1, 1.0],
            ["2026-01-01T23:00:00", "2026-01-02T00:00:00", 1, "2.0"],
            ["2026-01-02T01:00:00+00:00", "2026-01-02T02:00:00+00:00", 1, 3.0]
        ]
    })
}

fn two_day_window() -> QueryWindow {
    QueryWindow::new(utc(2026, 1, 1, 0), utc(2026, 1, 3, 0)).unwrap()
}

mod run {
    use super::*;

    #[tokio::test]
    async fn test_daily_series_end_to_end() {
        let server = MockServer::start().await;
        serve_summary(&server, two_day_body()).await;

        let query = CostQuery::new("p1", two_day_window())
            .with_resolution(Resolution::Day)
            .with_series(true);
        let report = engine(&server).run(query).await.unwrap();

        assert_eq!(report.aggregate_cost_now.to_string(), "6.0000");
        assert_eq!(report.currency, "USD");
        let series = report.time_series.as_ref().unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp, utc(2026, 1, 1, 0));
        assert_eq!(series[0].cost, Decimal::new(3, 0));
        assert_eq!(series[1].timestamp, utc(2026, 1, 2, 0));
        assert_eq!(series[1].cost, Decimal::new(3, 0));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["aggregate_cost_now"], 6.0);
        assert_eq!(json["resolution"], "day");
        assert_eq!(
            json["time_series"],
            json!([
                { "timestamp": "2026-01-01T00:00:00Z", "cost": 3.0 },
                { "timestamp": "2026-01-02T00:00:00Z", "cost": 3.0 }
            ])
        );
    }

    #[tokio::test]
    async fn test_series_flag_does_not_change_aggregate() {
        let server = MockServer::start().await;
        serve_summary(&server, two_day_body()).await;
        let engine = engine(&server);

        let with_series = engine
            .run(CostQuery::new("p1", two_day_window()).with_series(true))
            .await
            .unwrap();
        let without_series = engine
            .run(CostQuery::new("p1", two_day_window()).with_series(false))
            .await
            .unwrap();

        assert_eq!(with_series.aggregate_cost_now, without_series.aggregate_cost_now);
        assert!(without_series.time_series.is_none());
        let json = serde_json::to_value(&without_series).unwrap();
        assert!(json.get("time_series").is_none());
    }

    #[tokio::test]
    async fn test_currency_comes_from_response() {
        let server = MockServer::start().await;
        let mut body = two_day_body();
        body["currency"] = json!("EUR");
        serve_summary(&server, body).await;

        let report = engine(&server)
            .run(CostQuery::new("p1", two_day_window()))
            .await
            .unwrap();

        assert_eq!(report.currency, "EUR");
    }

    #[tokio::test]
    async fn test_hourly_buckets_cover_window() {
        let server = MockServer::start().await;
        serve_summary(&server, two_day_body()).await;

        let report = engine(&server)
            .run(
                CostQuery::new("p1", two_day_window())
                    .with_resolution(Resolution::Hour)
                    .with_series(true),
            )
            .await
            .unwrap();

        let series = report.time_series.unwrap();
        assert_eq!(series.len(), 48);
        let total: Decimal = series.iter().map(|b| b.cost).sum();
        assert_eq!(total, Decimal::new(6, 0));
        assert_eq!(series[23].cost, Decimal::new(2, 0));
    }

    #[tokio::test]
    async fn test_empty_result_is_zero_cost() {
        let server = MockServer::start().await;
        serve_summary(
            &server,
            json!({ "total": 0, "columns": ["begin", "rate"], "results": [] }),
        )
        .await;

        let report = engine(&server)
            .run(CostQuery::new("p1", two_day_window()).with_series(true))
            .await
            .unwrap();

        assert_eq!(report.aggregate_cost_now.to_string(), "0.0000");
        assert!(report
            .time_series
            .unwrap()
            .iter()
            .all(|b| b.cost.is_zero()));
    }

    #[tokio::test]
    async fn test_no_compatible_endpoint_propagates() {
        let server = MockServer::start().await;

        let err = engine(&server)
            .run(CostQuery::new("p1", two_day_window()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoCompatibleEndpoint);
        assert_eq!(err.attempts().len(), 4);
    }
}

mod monthly {
    use super::*;

    #[tokio::test]
    async fn test_completed_months_only() {
        let server = MockServer::start().await;
        serve_summary(
            &server,
            json!({
                "total": 4,
                "columns": ["begin", "rate"],
                "results": [
                    ["2025-11-03T00:00:00Z", "10.5"],
                    ["2025-11-20T00:00:00Z", "1.5"],
                    ["2026-01-15T00:00:00Z", "4"],
                    ["2026-02-05T00:00:00Z", "100"]
                ]
            }),
        )
        .await;

        let report = engine(&server)
            .run_monthly("p1", utc(2026, 2, 10, 12))
            .await
            .unwrap();

        assert_eq!(report.resolution, Resolution::Month);
        assert_eq!(report.start, utc(2025, 11, 1, 0));
        assert_eq!(report.end, utc(2026, 2, 1, 0));
        assert_eq!(report.aggregate_cost_now.to_string(), "16.0000");

        let months: Vec<_> = report
            .time_series
            .unwrap()
            .into_iter()
            .map(|b| (b.timestamp, b.cost))
            .collect();
        assert_eq!(
            months,
            vec![
                (utc(2025, 11, 1, 0), Decimal::new(12, 0)),
                (utc(2025, 12, 1, 0), Decimal::ZERO),
                (utc(2026, 1, 1, 0), Decimal::new(4, 0)),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_history_is_empty_series() {
        let server = MockServer::start().await;
        serve_summary(
            &server,
            json!({ "total": 0, "columns": ["begin", "rate"], "results": [] }),
        )
        .await;

        let report = engine(&server)
            .run_monthly("p1", utc(2026, 2, 10, 12))
            .await
            .unwrap();

        assert!(report.time_series.unwrap().is_empty());
        assert!(report.aggregate_cost_now.is_zero());
    }
}

mod timeouts {
    use super::*;

    /// Answers with a fixed endpoint after sleeping; the delays are per step.
    struct SlowResolver {
        resolve_delay: Duration,
        verify_delay: Duration,
    }

    #[async_trait]
    impl EndpointResolver for SlowResolver {
        fn name(&self) -> &str {
            "slow"
        }

        async fn resolve(&self) -> CostResult<ResolvedEndpoint> {
            tokio::time::sleep(self.resolve_delay).await;
            Ok(ResolvedEndpoint::new("http://127.0.0.1:9", "token"))
        }

        async fn verify_project(&self, _: &ResolvedEndpoint, _: &str) -> CostResult<()> {
            tokio::time::sleep(self.verify_delay).await;
            Ok(())
        }
    }

    fn slow_engine(resolve_delay: Duration, verify_delay: Duration) -> CostQueryEngine {
        CostQueryEngine::new(
            Arc::new(SlowResolver {
                resolve_delay,
                verify_delay,
            }),
            QueryStrategyChain::new(
                Client::new(),
                ResponseShape::PRIORITY.to_vec(),
                Duration::from_secs(5),
            ),
            Normalizer::new("USD"),
            Duration::from_secs(2),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_resolution_is_timeout() {
        let engine = slow_engine(Duration::from_secs(60), Duration::ZERO);

        let err = engine
            .run(CostQuery::new("p1", two_day_window()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("endpoint resolution"), "{}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_project_check_is_timeout() {
        let engine = slow_engine(Duration::ZERO, Duration::from_secs(60));

        let err = engine
            .run_monthly("p1", utc(2026, 2, 10, 12))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("project verification"), "{}", err);
    }

    #[test]
    fn test_query_timeout_saturates() {
        let engine = CostQueryEngine::new(
            Arc::new(StaticResolver::new("http://127.0.0.1:9", "token")),
            QueryStrategyChain::new(
                Client::new(),
                ResponseShape::PRIORITY.to_vec(),
                Duration::MAX,
            ),
            Normalizer::new("USD"),
            Duration::MAX,
        );

        assert_eq!(engine.query_timeout(), Duration::MAX);
    }
}
