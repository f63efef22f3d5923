//! HTTP routing
//!
//! `GET /mdns` serves the registry; every other path is handed to the
//! forwarding proxy. All responses carry `Access-Control-Allow-Origin: *`.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue},
    response::Response,
    routing::get,
    Json, Router,
};
use elrs_proxy_discovery::RegistrySnapshot;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::proxy::{preflight, proxy_handler};
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mdns", get(mdns_handler).options(preflight_handler))
        .fallback(proxy_handler)
        // Firmware uploads exceed axum's default limit
        .layer(DefaultBodyLimit::disable())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// List the devices currently in the registry
async fn mdns_handler(State(state): State<Arc<AppState>>) -> Json<RegistrySnapshot> {
    Json(state.registry.snapshot())
}

async fn preflight_handler(State(state): State<Arc<AppState>>) -> Response {
    preflight(&state.config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{app_state, register_device, RecordingUpstream};
    use crate::upstream::ReqwestUpstream;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use elrs_proxy_core::ForwardPolicy;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn assert_allow_origin(response: &Response) {
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_mdns_empty_registry() {
        let upstream = RecordingUpstream::replying(StatusCode::OK, "");
        let router = create_router(app_state(upstream, ForwardPolicy::default()));

        let response = router.oneshot(request(Method::GET, "/mdns")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_allow_origin(&response);
        assert_eq!(body_string(response).await, "{}");
    }

    #[tokio::test]
    async fn test_mdns_lists_registered_device() {
        let upstream = RecordingUpstream::replying(StatusCode::OK, "");
        let state = app_state(upstream, ForwardPolicy::default());
        register_device(&state.registry, "dev1", "10.0.0.5", 80);
        let router = create_router(state);

        let response = router.oneshot(request(Method::GET, "/mdns")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_allow_origin(&response);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "dev1": {
                    "name": "dev1",
                    "address": "10.0.0.5",
                    "port": 80,
                    "properties": {"vendor": "elrs"}
                }
            })
        );
    }

    #[tokio::test]
    async fn test_options_never_forwards() {
        let upstream = RecordingUpstream::replying(StatusCode::OK, "");
        let router = create_router(app_state(upstream.clone(), ForwardPolicy::Any));

        for uri in ["/anything", "/10.0.0.5/update", "/mdns", "/"] {
            let response = router
                .clone()
                .oneshot(request(Method::OPTIONS, uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_allow_origin(&response);
            assert_eq!(
                response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
                "GET, POST, OPTIONS"
            );
            assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
            assert!(body_string(response).await.is_empty());
        }

        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_relays_upstream_answer() {
        let upstream = RecordingUpstream::replying(StatusCode::CREATED, "ok");
        let router = create_router(app_state(upstream.clone(), ForwardPolicy::Any));

        let response = router
            .oneshot(request(Method::GET, "/example.com/status?x=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_allow_origin(&response);
        assert_eq!(body_string(response).await, "ok");

        let calls = upstream.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::GET);
        assert_eq!(calls[0].url, "http://example.com/status?x=1");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let upstream = RecordingUpstream::failing();
        let router = create_router(app_state(upstream, ForwardPolicy::Any));

        for method in [Method::GET, Method::POST] {
            let response = router
                .clone()
                .oneshot(request(method, "/10.0.0.99/"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
            assert_allow_origin(&response);
            assert!(!body_string(response).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_error_responses_allow_any_origin() {
        let upstream = RecordingUpstream::replying(StatusCode::OK, "");
        let router = create_router(app_state(upstream.clone(), ForwardPolicy::default()));

        let cases = [
            (Method::PUT, "/10.0.0.5/", StatusCode::METHOD_NOT_ALLOWED),
            (Method::POST, "/mdns", StatusCode::METHOD_NOT_ALLOWED),
            (Method::GET, "/", StatusCode::BAD_REQUEST),
            (Method::GET, "/example.com/", StatusCode::FORBIDDEN),
        ];
        for (method, uri, status) in cases {
            let response = router.clone().oneshot(request(method, uri)).await.unwrap();
            assert_eq!(response.status(), status, "{}", uri);
            assert_allow_origin(&response);
        }

        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_forwards_to_discovered_device_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .and(query_param("x", "1"))
            .respond_with(ResponseTemplate::new(201).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let upstream = Arc::new(ReqwestUpstream::new(Duration::from_secs(5)).unwrap());
        let state = app_state(upstream, ForwardPolicy::default());
        let authority = server.address().to_string();
        register_device(&state.registry, "dev1", &server.address().ip().to_string(), 80);
        let router = create_router(state);

        let response = router
            .oneshot(request(Method::GET, &format!("/{}/status?x=1", authority)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_allow_origin(&response);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn test_device_redirect_is_relayed_not_followed() {
        // Reachable only through the redirect, never allowed directly
        let forbidden = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("SECRET"))
            .expect(0)
            .mount(&forbidden)
            .await;
        let target = format!("http://localhost:{}/secret", forbidden.address().port());

        let device = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/go"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", target.as_str()))
            .expect(1)
            .mount(&device)
            .await;

        let upstream = Arc::new(ReqwestUpstream::new(Duration::from_secs(5)).unwrap());
        let state = app_state(upstream, ForwardPolicy::default());
        register_device(&state.registry, "dev1", &device.address().ip().to_string(), 80);
        let router = create_router(state);

        let direct = router
            .clone()
            .oneshot(request(
                Method::GET,
                &format!("/localhost:{}/secret", forbidden.address().port()),
            ))
            .await
            .unwrap();
        assert_eq!(direct.status(), StatusCode::FORBIDDEN);

        let response = router
            .oneshot(request(Method::GET, &format!("/{}/go", device.address())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_allow_origin(&response);
        assert_eq!(response.headers()[header::LOCATION], target.as_str());
        assert!(forbidden.received_requests().await.unwrap().is_empty());
    }
}
