//! # Admission Pipeline Integration
//!
//! Drives the assembled router (resolver, access log, verifier, limiter and
//! bundle handler) without a network listener.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use tower::ServiceExt;

    use reseed_gateway::domain::error::{
        headers, BACKEND_FAILURE_BODY, FORBIDDEN_BODY, RATE_LIMITED_BODY,
    };
    use reseed_gateway::domain::types::{ClientAddr, RateKey};
    use reseed_gateway::middleware::ACCESS_LOG_TARGET;
    use reseed_gateway::test_utils::{ManualClock, StubReseeder};
    use reseed_gateway::{AdmissionLimiter, ReseedConfig, ReseedService};

    use crate::integration::LogCapture;

    const AGENT: &str = "Wget/1.11.4";
    const PATH: &str = "/i2pseeds.su3";

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Gateway {
        router: Router,
        limiter: Arc<AdmissionLimiter>,
        reseeder: Arc<StubReseeder>,
        clock: Arc<ManualClock>,
    }

    fn gateway_with(max_requests: u32, max_clients: usize, reseeder: StubReseeder) -> Gateway {
        let mut config = ReseedConfig::default();
        config.rate_limit.max_requests = max_requests;
        config.rate_limit.max_clients = max_clients;

        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(AdmissionLimiter::with_clock(
            config.rate_limit.clone(),
            clock.clone(),
        ));
        let reseeder = Arc::new(reseeder);
        let service =
            ReseedService::with_limiter(config, reseeder.clone(), Arc::clone(&limiter)).unwrap();

        Gateway {
            router: service.router(),
            limiter,
            reseeder,
            clock,
        }
    }

    fn gateway(max_requests: u32) -> Gateway {
        gateway_with(max_requests, 10_000, StubReseeder::with_bundle(&b"bundle"[..]))
    }

    /// Request arriving on a connection from `transport`, optionally forwarded.
    fn request(transport: &str, forwarded: Option<&str>, agent: &str) -> Request<Body> {
        let mut builder = Request::builder().uri(PATH).header(header::USER_AGENT, agent);
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        let addr: SocketAddr = transport.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    async fn send(router: &Router, req: Request<Body>) -> Response {
        router.clone().oneshot(req).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn key(addr: &str) -> RateKey {
        RateKey::from(&ClientAddr::new(addr))
    }

    // =============================================================================
    // QUOTA
    // =============================================================================

    /// N admitted requests, then a 429 carrying the fixed body and retry hint
    #[tokio::test]
    async fn test_request_past_quota_is_rejected() {
        let gw = gateway(5);

        for _ in 0..5 {
            let response = send(&gw.router, request("192.0.2.1:1000", None, AGENT)).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = send(&gw.router, request("192.0.2.1:1001", None, AGENT)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3600");
        assert_eq!(response.headers()[headers::REMAINING], "0");
        assert_eq!(body_bytes(response).await, RATE_LIMITED_BODY.as_bytes());
        assert_eq!(gw.reseeder.peer_calls(), 5);
    }

    /// Source ports are not part of the rate key
    #[tokio::test]
    async fn test_quota_is_shared_across_ports() {
        let gw = gateway(2);
        send(&gw.router, request("192.0.2.2:1000", None, AGENT)).await;
        send(&gw.router, request("192.0.2.2:2000", None, AGENT)).await;

        let response = send(&gw.router, request("192.0.2.2:3000", None, AGENT)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(gw.limiter.entry(&key("192.0.2.2")).map(|e| e.count), Some(2));
    }

    /// Wrong agent gets 403 and leaves the quota untouched
    #[tokio::test]
    async fn test_wrong_agent_never_consumes_quota() {
        let gw = gateway(1);

        for agent in ["Wget/1.12", "curl/8.4.0", "Mozilla/5.0"] {
            let response = send(&gw.router, request("192.0.2.3:1000", None, agent)).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(body_bytes(response).await, FORBIDDEN_BODY.as_bytes());
        }
        assert!(gw.limiter.entry(&key("192.0.2.3")).is_none());

        let missing = Request::builder()
            .uri(PATH)
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&gw.router, missing).await.status(), StatusCode::FORBIDDEN);

        let response = send(&gw.router, request("192.0.2.3:1000", None, AGENT)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&gw.router, request("192.0.2.3:1000", None, AGENT)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(gw.limiter.entry(&key("192.0.2.3")).map(|e| e.count), Some(1));

        // Exhausted client with a bad agent is still refused as forbidden
        let response = send(&gw.router, request("192.0.2.3:1000", None, "curl/8.4.0")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_bytes(response).await, FORBIDDEN_BODY.as_bytes());
        assert_eq!(gw.limiter.entry(&key("192.0.2.3")).map(|e| e.count), Some(1));
    }

    #[tokio::test]
    async fn test_window_reset_admits_again() {
        let gw = gateway(1);

        assert_eq!(
            send(&gw.router, request("192.0.2.4:1", None, AGENT)).await.status(),
            StatusCode::OK
        );
        assert_eq!(
            send(&gw.router, request("192.0.2.4:1", None, AGENT)).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        gw.clock.advance(Duration::from_secs(3600));

        let response = send(&gw.router, request("192.0.2.4:1", None, AGENT)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(gw.limiter.entry(&key("192.0.2.4")).map(|e| e.count), Some(1));
    }

    /// Two simultaneous requests for the last unit: one 200, one 429
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_for_last_unit() {
        for _ in 0..20 {
            let gw = gateway(3);
            for _ in 0..2 {
                send(&gw.router, request("192.0.2.5:1", None, AGENT)).await;
            }

            let a = tokio::spawn(gw.router.clone().oneshot(request("192.0.2.5:2", None, AGENT)));
            let b = tokio::spawn(gw.router.clone().oneshot(request("192.0.2.5:3", None, AGENT)));
            let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

            let mut statuses = [a.status().as_u16(), b.status().as_u16()];
            statuses.sort_unstable();
            assert_eq!(statuses, [200, 429]);
            assert_eq!(gw.reseeder.peer_calls(), 3);
        }
    }

    // =============================================================================
    // ADDRESS RESOLUTION
    // =============================================================================

    /// Forwarded value is the rate key and the logged client, not the transport
    #[tokio::test]
    async fn test_forwarded_address_drives_key_and_log() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let gw = gateway(2);
        let response = send(
            &gw.router,
            request("192.0.2.200:5555", Some("203.0.113.50, 10.0.0.1"), AGENT),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(gw.limiter.entry(&key("203.0.113.50")).map(|e| e.count), Some(1));
        assert!(gw.limiter.entry(&key("192.0.2.200")).is_none());
        assert_eq!(gw.reseeder.clients()[0].as_str(), "203.0.113.50");

        let lines = capture.lines_for(ACCESS_LOG_TARGET);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("203.0.113.50 - - ["));
        assert!(lines[0].contains("\"GET /i2pseeds.su3 HTTP/1.1\" 200 6"));
        assert!(!lines[0].contains("192.0.2.200 - -"));
    }

    /// Rejected requests are logged too, under the resolved address
    #[tokio::test]
    async fn test_rejections_are_logged() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let gw = gateway(1);
        send(&gw.router, request("192.0.2.6:1", Some("198.51.100.6"), "curl/8")).await;
        send(&gw.router, request("192.0.2.6:1", Some("198.51.100.6"), AGENT)).await;
        send(&gw.router, request("192.0.2.6:1", Some("198.51.100.6"), AGENT)).await;

        let lines = capture.lines_for(ACCESS_LOG_TARGET);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\" 403 "));
        assert!(lines[1].contains("\" 200 "));
        assert!(lines[2].contains("\" 429 "));
        assert!(lines.iter().all(|l| l.contains("198.51.100.6 - - [")));
    }

    #[tokio::test]
    async fn test_empty_forwarded_header_uses_transport() {
        let gw = gateway(2);
        send(&gw.router, request("192.0.2.7:9", Some(""), AGENT)).await;
        assert!(gw.limiter.entry(&key("192.0.2.7")).is_some());
    }

    // =============================================================================
    // STORE BOUNDS
    // =============================================================================

    #[tokio::test]
    async fn test_full_store_evicts_least_recently_seen() {
        let gw = gateway_with(10, 3, StubReseeder::with_bundle(&b"x"[..]));

        for addr in ["198.51.100.1", "198.51.100.2", "198.51.100.3"] {
            send(&gw.router, request("192.0.2.8:1", Some(addr), AGENT)).await;
        }
        // Refresh the first so the second is least recently seen
        send(&gw.router, request("192.0.2.8:1", Some("198.51.100.1"), AGENT)).await;

        let response = send(&gw.router, request("192.0.2.8:1", Some("198.51.100.4"), AGENT)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(gw.limiter.tracked_clients(), 3);
        assert!(gw.limiter.entry(&key("198.51.100.2")).is_none());
        assert!(gw.limiter.entry(&key("198.51.100.4")).is_some());
    }

    // =============================================================================
    // BUNDLE RESPONSES
    // =============================================================================

    #[tokio::test]
    async fn test_content_length_matches_body() {
        for size in [0usize, 1, 65_536] {
            let bytes = vec![0x5a; size];
            let gw = gateway_with(5, 10, StubReseeder::with_bundle(bytes.clone()));

            let response = send(&gw.router, request("192.0.2.9:1", None, AGENT)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[header::CONTENT_LENGTH],
                size.to_string().as_str()
            );
            assert_eq!(body_bytes(response).await, bytes);
        }
    }

    /// A reseeder failure yields the fixed 500 body and nothing else
    #[tokio::test]
    async fn test_backend_failure_has_no_partial_body() {
        for reseeder in [StubReseeder::failing_peer(), StubReseeder::failing_bundle()] {
            let gw = gateway_with(5, 10, reseeder);

            let response = send(&gw.router, request("192.0.2.10:1", None, AGENT)).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
            assert_eq!(body_bytes(response).await, BACKEND_FAILURE_BODY.as_bytes());
            // Admission was still recorded
            assert_eq!(gw.limiter.entry(&key("192.0.2.10")).map(|e| e.count), Some(1));
        }
    }

    #[tokio::test]
    async fn test_unknown_paths_skip_pipeline() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let gw = gateway(1);
        for path in ["/", "/i2pseeds.su3/extra", "/netDb"] {
            let req = Request::builder()
                .uri(path)
                .header(header::USER_AGENT, AGENT)
                .body(Body::empty())
                .unwrap();
            assert_eq!(send(&gw.router, req).await.status(), StatusCode::NOT_FOUND);
        }

        assert_eq!(gw.limiter.tracked_clients(), 0);
        assert!(capture.lines_for(ACCESS_LOG_TARGET).is_empty());
    }
}
