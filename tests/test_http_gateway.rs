//! Integration tests for the HTTP gateway
//!
//! Requests are driven straight through the axum router with
//! `tower::ServiceExt::oneshot`, no socket involved.

#[cfg(test)]
mod http_gateway_tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use rtanalytics::api::{router, AppState};
    use rtanalytics::bucket::{round_to_hour, FixedClock};
    use rtanalytics::store::{ColdStore, MemoryHotStore, SqliteColdStore};
    use rtanalytics::{Aggregator, Metric};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    const NOW: i64 = 1_700_000_000;

    struct TestApp {
        _dir: TempDir,
        hot: Arc<MemoryHotStore>,
        cold: Arc<SqliteColdStore>,
        app: Router,
    }

    fn test_app() -> TestApp {
        let dir = tempdir().unwrap();
        let hot = Arc::new(MemoryHotStore::new());
        let cold = Arc::new(SqliteColdStore::new(dir.path().join("cold.db")).unwrap());
        let aggregator = Aggregator::new(hot.clone(), cold.clone())
            .with_clock(Arc::new(FixedClock::new(NOW)));
        let app = router(AppState::new(Arc::new(aggregator)));
        TestApp {
            _dir: dir,
            hot,
            cold,
            app,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    /// Durable writes finish in the background; poll until the cold tier has them
    async fn wait_for_cold_clicks(cold: &SqliteColdStore, timestamp: i64, expected: i64) {
        let bucket = round_to_hour(timestamp).unwrap();
        for _ in 0..100 {
            if cold.read_counter(bucket, Metric::Clicks).await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("durable write for bucket {} never landed", bucket);
    }

    /// Live-hour writes also land in the background; poll until the body matches
    async fn wait_for_body(app: &Router, uri: &str, expected: &str) {
        let mut last = String::new();
        for _ in 0..100 {
            let (status, body) = send(app, "GET", uri).await;
            if status == StatusCode::OK && body == expected {
                return;
            }
            last = body;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("GET {} never returned {:?}, last body {:?}", uri, expected, last);
    }

    #[tokio::test]
    async fn test_ingest_then_query_current_hour() {
        let t = test_app();

        let (status, body) = send(
            &t.app,
            "POST",
            &format!("/analytics?timestamp={}&user=alice&click=2&impression=5", NOW),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.is_empty());

        let (status, _) = send(
            &t.app,
            "POST",
            &format!("/analytics?timestamp={}&user=alice&click=1&impression=0", NOW),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        wait_for_body(
            &t.app,
            &format!("/analytics?timestamp={}", NOW),
            "unique_users,1 \nclicks,3 \nimpressions,5",
        )
        .await;
    }

    #[tokio::test]
    async fn test_query_json_format() {
        let t = test_app();
        let past = NOW - 7200;

        let (status, _) = send(
            &t.app,
            "POST",
            &format!("/analytics?timestamp={}&user=bob&click=1&impression=1", past),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        wait_for_cold_clicks(&t.cold, past, 1).await;

        let (status, body) = send(
            &t.app,
            "GET",
            &format!("/analytics?timestamp={}&format=json", past),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["unique_users"], 1);
        assert_eq!(parsed["clicks"], 1);
        assert_eq!(parsed["impressions"], 1);
    }

    #[tokio::test]
    async fn test_empty_history_returns_zeros() {
        let t = test_app();

        let (status, body) = send(&t.app, "GET", "/analytics?timestamp=3600").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "unique_users,0 \nclicks,0 \nimpressions,0");
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let t = test_app();

        for uri in [
            "/analytics?timestamp=abc".to_string(),
            "/analytics?timestamp=-1".to_string(),
            "/analytics".to_string(),
        ] {
            let (status, _) = send(&t.app, "GET", &uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "GET {}", uri);
        }

        for uri in [
            "/analytics?timestamp=abc&user=a&click=1&impression=1".to_string(),
            format!("/analytics?timestamp={}&click=1&impression=1", NOW),
            format!("/analytics?timestamp={}&user=a&click=x&impression=1", NOW),
            format!("/analytics?timestamp={}&user=a&click=1", NOW),
            format!("/analytics?timestamp={}&user=a&click=-1&impression=1", NOW),
        ] {
            let (status, _) = send(&t.app, "POST", &uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "POST {}", uri);
        }

        assert!(t.hot.is_empty());
    }

    #[tokio::test]
    async fn test_hot_outage() {
        let t = test_app();
        t.hot.set_available(false);

        // Ingestion is still accepted and reaches the durable tier
        let (status, _) = send(
            &t.app,
            "POST",
            &format!("/analytics?timestamp={}&user=carol&click=4&impression=1", NOW),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        wait_for_cold_clicks(&t.cold, NOW, 4).await;

        // Live-hour reads fail without a partial body
        let (status, body) = send(&t.app, "GET", &format!("/analytics?timestamp={}", NOW)).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_cold_outage_on_history_read() {
        let t = test_app();
        t.cold.set_available(false);

        let (status, body) = send(&t.app, "GET", "/analytics?timestamp=3600").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let t = test_app();

        let (status, body) = send(&t.app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
