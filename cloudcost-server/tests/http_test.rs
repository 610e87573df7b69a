use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cloudcost_core::{
    CostQueryEngine, CostResult, EndpointResolver, Normalizer, QueryStrategyChain,
    ResolvedEndpoint, ResponseShape, ServerConfig, StaticResolver,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves the router on an ephemeral port and returns its base URL.
async fn spawn_app(rating: &MockServer) -> String {
    let engine = CostQueryEngine::new(
        Arc::new(StaticResolver::new(rating.uri(), "test-token")),
        QueryStrategyChain::new(
            Client::new(),
            ResponseShape::PRIORITY.to_vec(),
            Duration::from_secs(5),
        ),
        Normalizer::new("USD"),
        Duration::from_secs(5),
    );
    spawn_engine(engine).await
}

async fn spawn_engine(engine: CostQueryEngine) -> String {
    let app = cloudcost_server::router(Arc::new(engine), &ServerConfig::default());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn get(url: String) -> (StatusCode, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

async fn serve_summary(rating: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 3,
            "columns": ["begin", "rate"],
            "results": [
                ["2026-01-01T00:30:00Z", 1.0],
                ["2026-01-01T23:00:00Z", 2.0],
                ["2026-01-02T01:00:00Z", 3.0]
            ]
        })))
        .mount(rating)
        .await;
}

mod costs {
    use super::*;

    #[tokio::test]
    async fn test_window_with_series() {
        let rating = MockServer::start().await;
        serve_summary(&rating).await;
        let base = spawn_app(&rating).await;

        let (status, body) = get(format!(
            "{}/api/projects/p1/costs?start=2026-01-01T00:00:00Z&end=2026-01-03T00:00:00Z&resolution=day&include_series=yes",
            base
        ))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["project_id"], "p1");
        assert_eq!(body["aggregate_cost_now"], 6.0);
        assert_eq!(body["currency"], "USD");
        assert_eq!(body["resolution"], "day");
        assert_eq!(
            body["time_series"],
            json!([
                { "timestamp": "2026-01-01T00:00:00Z", "cost": 3.0 },
                { "timestamp": "2026-01-02T00:00:00Z", "cost": 3.0 }
            ])
        );
    }

    #[tokio::test]
    async fn test_series_omitted_by_default() {
        let rating = MockServer::start().await;
        serve_summary(&rating).await;
        let base = spawn_app(&rating).await;

        let (status, body) = get(format!(
            "{}/api/projects/p1/costs?start=2026-01-01T00:00:00Z&end=2026-01-03T00:00:00Z",
            base
        ))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.get("time_series").is_none());
    }

    #[tokio::test]
    async fn test_calendar_month() {
        let rating = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/summary"))
            .and(query_param("begin", "2026-01-01T00:00:00+00:00"))
            .and(query_param("end", "2026-02-01T00:00:00+00:00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 1,
                "columns": ["begin", "rate"],
                "results": [["2026-01-20T00:00:00Z", "9.5"]]
            })))
            .mount(&rating)
            .await;
        let base = spawn_app(&rating).await;

        let (status, body) = get(format!("{}/api/projects/p1/costs/2026-01", base)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["aggregate_cost_now"], 9.5);
        assert_eq!(body["start"], "2026-01-01T00:00:00Z");
        assert_eq!(body["end"], "2026-02-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_monthly_route_is_not_a_month() {
        let rating = MockServer::start().await;
        serve_summary(&rating).await;
        let base = spawn_app(&rating).await;

        let (status, body) = get(format!("{}/api/projects/p1/costs/monthly", base)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resolution"], "month");
        assert!(body["time_series"].is_array());
    }
}

mod errors {
    use super::*;

    #[tokio::test]
    async fn test_bad_month() {
        let rating = MockServer::start().await;
        let base = spawn_app(&rating).await;

        for month in ["2026-13", "26-01", "january"] {
            let (status, body) = get(format!("{}/api/projects/p1/costs/{}", base, month)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", month);
            assert_eq!(body, json!({ "error": "Month must be in YYYY-MM format" }));
        }
    }

    #[tokio::test]
    async fn test_bad_query_parameters() {
        let rating = MockServer::start().await;
        let base = spawn_app(&rating).await;

        let (status, body) =
            get(format!("{}/api/projects/p1/costs?resolution=minute", base)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("resolution"));

        let (status, _) = get(format!("{}/api/projects/p1/costs?start=soon", base)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(format!(
            "{}/api/projects/p1/costs?start=2026-01-02T00:00:00Z&end=2026-01-01T00:00:00Z",
            base
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_no_compatible_endpoint() {
        let rating = MockServer::start().await;
        let base = spawn_app(&rating).await;

        let (status, body) = get(format!(
            "{}/api/projects/p1/costs?start=2026-01-01T00:00:00Z&end=2026-01-02T00:00:00Z",
            base
        ))
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("v2.summary"));
        assert!(message.contains("v1.report.summary"));
    }

    /// Never answers within the engine's resolver timeout.
    struct StalledResolver;

    #[async_trait]
    impl EndpointResolver for StalledResolver {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn resolve(&self) -> CostResult<ResolvedEndpoint> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ResolvedEndpoint::new("http://127.0.0.1:9", "token"))
        }
    }

    #[tokio::test]
    async fn test_timeout_is_gateway_timeout() {
        let engine = CostQueryEngine::new(
            Arc::new(StalledResolver),
            QueryStrategyChain::new(
                Client::new(),
                ResponseShape::PRIORITY.to_vec(),
                Duration::from_secs(1),
            ),
            Normalizer::new("USD"),
            Duration::from_millis(200),
        );
        let base = spawn_engine(engine).await;

        let (status, body) = get(format!("{}/api/projects/p1/costs/2026-01", base)).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("Timed out"), "{}", message);
        assert!(message.contains("endpoint resolution"), "{}", message);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let rating = MockServer::start().await;
        let engine = CostQueryEngine::new(
            Arc::new(StaticResolver::new(rating.uri(), "test-token")),
            QueryStrategyChain::with_default_shapes(Client::new(), Duration::from_secs(5)),
            Normalizer::new("USD"),
            Duration::from_secs(5),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            cloudcost_server::serve_until(
                listener,
                Arc::new(engine),
                &ServerConfig::default(),
                async {
                    let _ = stop_rx.await;
                },
            )
            .await
        });

        let (status, _) = get(format!("{}/healthz", base)).await;
        assert_eq!(status, StatusCode::OK);

        stop_tx.send(()).unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(finished.is_ok());
    }
}

mod pages {
    use super::*;

    #[tokio::test]
    async fn test_healthz() {
        let rating = MockServer::start().await;
        let base = spawn_app(&rating).await;

        let (status, body) = get(format!("{}/healthz", base)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_index_page() {
        let rating = MockServer::start().await;
        let base = spawn_app(&rating).await;

        let response = reqwest::get(format!("{}/", base)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = response.text().await.unwrap();
        assert!(html.contains("<title>cloudcost</title>"));
    }
}
