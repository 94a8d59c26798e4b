//! HTTP API handler
//!
//! - GET  /health                liveness and version
//! - GET  /status                node state and peer count
//! - GET  /peers                 connected peer ids
//! - GET  /self                  local peer id and listen addresses
//! - GET  /shards                admitted ids
//! - GET  /received              shards received via relay
//! - GET  /ulx-received          ethical metadata received via relay
//! - GET  /representations/:id   redacted bundle for an admitted shard
//! - POST /shard                 submit a shard or wrapping packet

use super::error::BoundaryError;
use super::server::ShardNode;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the node router
pub fn router(node: Arc<ShardNode>) -> Router {
    let cors = build_cors(&node.config().daemon.cors_origins);
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/peers", get(get_peers))
        .route("/self", get(get_self))
        .route("/shards", get(list_shards))
        .route("/received", get(get_received))
        .route("/ulx-received", get(get_ulx_received))
        .route("/representations/:id", get(get_representation))
        .route("/shard", post(submit_shard))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(node)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static(super::server::ROLE_HEADER),
            header::HeaderName::from_static(super::server::PUBKEY_HEADER),
            header::HeaderName::from_static(super::server::SIGNATURE_HEADER),
        ]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn get_status(State(node): State<Arc<ShardNode>>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "status": node.status().await,
    }))
}

async fn get_peers(State(node): State<Arc<ShardNode>>) -> impl IntoResponse {
    let peers = node.transport().peers().await;
    Json(json!({
        "ok": true,
        "count": peers.len(),
        "peers": peers,
    }))
}

async fn get_self(State(node): State<Arc<ShardNode>>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "peer_id": node.transport().local_peer_id(),
        "listen_multiaddrs": node.transport().listen_addrs().await,
    }))
}

async fn list_shards(State(node): State<Arc<ShardNode>>) -> impl IntoResponse {
    let ids = node.admissions().ids().await;
    Json(json!({
        "ok": true,
        "count": ids.len(),
        "ids": ids,
    }))
}

async fn get_received(State(node): State<Arc<ShardNode>>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "count": node.received().shard_count().await,
    }))
}

async fn get_ulx_received(State(node): State<Arc<ShardNode>>) -> impl IntoResponse {
    let items = node.received().ulx_items().await;
    Json(json!({
        "ok": true,
        "count": items.len(),
        "items": items,
    }))
}

async fn get_representation(
    State(node): State<Arc<ShardNode>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BoundaryError> {
    match node.representation(&id).await? {
        Some(bundle) => Ok(Json(json!({
            "ok": true,
            "representation": bundle,
        }))),
        None => Err(BoundaryError::NotFound(format!(
            "no live representation for '{}'",
            id
        ))),
    }
}

async fn submit_shard(
    State(node): State<Arc<ShardNode>>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, BoundaryError> {
    let response = node.ingest(&headers, body).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::SigningKeyPair;
    use crate::daemon::server::tests::{make_node, NOW};
    use crate::daemon::server::{PUBKEY_HEADER, ROLE_HEADER, SIGNATURE_HEADER};
    use crate::ethics::{EthicalColor, EthicalScore};
    use crate::gossip::GossipHub;
    use crate::shard::tests::sample_shard;
    use crate::shard::EmoShard;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        app: Router,
        node: Arc<ShardNode>,
        clock: Arc<ManualClock>,
        keys: SigningKeyPair,
        _dir: TempDir,
    }

    async fn make_app(insecure: bool) -> TestApp {
        let (node, clock, dir) = make_node(insecure, GossipHub::new()).await;
        let node = Arc::new(node);
        node.start().await.unwrap();
        TestApp {
            app: router(node.clone()),
            node,
            clock,
            keys: SigningKeyPair::from_seed(&[7u8; 32]),
            _dir: dir,
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 64)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn signed_request(keys: &SigningKeyPair, role: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/shard")
            .header("content-type", "application/json")
            .header(ROLE_HEADER, role)
            .header(PUBKEY_HEADER, keys.public_key_der_base64().unwrap())
            .header(SIGNATURE_HEADER, keys.sign_base64(&body))
            .body(Body::from(body))
            .unwrap()
    }

    fn shard_body(shard: &EmoShard) -> Vec<u8> {
        serde_json::to_vec(shard).unwrap()
    }

    async fn get(app: &Router, uri: &str) -> serde_json::Value {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp).await
    }

    #[tokio::test]
    async fn test_health() {
        let t = make_app(false).await;
        let json = get(&t.app, "/health").await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_status_peers_self() {
        let t = make_app(false).await;
        let status = get(&t.app, "/status").await;
        assert_eq!(status["status"]["started"], true);
        assert_eq!(status["status"]["peers_connected"], 0);
        assert_eq!(status["status"]["timestamp"], NOW);

        let peers = get(&t.app, "/peers").await;
        assert_eq!(peers["count"], 0);

        let me = get(&t.app, "/self").await;
        assert_eq!(me["peer_id"], t.node.transport().local_peer_id());
        assert_eq!(me["listen_multiaddrs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ghost_filtered_founder_stored() {
        let t = make_app(false).await;
        let body = shard_body(&sample_shard());

        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "ghost", body.clone()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["stored"], false);
        assert!((json["gate_score"].as_f64().unwrap() - 0.01).abs() < 1e-9);
        assert_eq!(get(&t.app, "/shards").await["count"], 0);

        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "founder", body))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["stored"], true);
        assert_eq!(json["gate_score"], 1.0);

        let shards = get(&t.app, "/shards").await;
        assert_eq!(shards["count"], 1);
        assert_eq!(shards["ids"][0], json["id"]);
    }

    #[tokio::test]
    async fn test_exact_threshold_is_not_stored() {
        let t = make_app(false).await;
        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "member", shard_body(&sample_shard())))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["gate_score"], 0.5);
        assert_eq!(json["stored"], false);
    }

    #[tokio::test]
    async fn test_guardian_caution_is_stored() {
        let t = make_app(false).await;
        let mut shard = sample_shard();
        shard.ethical_score = Some(EthicalScore::new(EthicalColor::YellowCaution, 0.3));
        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "guardian", shard_body(&shard)))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert!(json["gate_score"].as_f64().unwrap() > 0.5);
        assert_eq!(json["stored"], true);
    }

    #[tokio::test]
    async fn test_missing_score_is_denied_by_default() {
        let t = make_app(false).await;
        let mut shard = sample_shard();
        shard.ethical_score = None;
        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "founder", shard_body(&shard)))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["gate_score"], 0.0);
        assert_eq!(json["stored"], false);
    }

    #[tokio::test]
    async fn test_tampered_signature_is_rejected() {
        let t = make_app(false).await;
        let mut req = signed_request(&t.keys, "founder", shard_body(&sample_shard()));
        let mut tampered = sample_shard();
        tampered.intention_core = "seek revenge".into();
        *req.body_mut() = Body::from(shard_body(&tampered));

        let resp = t.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(resp).await;
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "SIGNATURE_INVALID");
        assert_eq!(get(&t.app, "/shards").await["count"], 0);
    }

    #[tokio::test]
    async fn test_pem_and_raw_keys_are_accepted() {
        let t = make_app(false).await;
        let body = shard_body(&sample_shard());
        for key in [
            t.keys.public_key_pem().unwrap(),
            t.keys.public_key_raw_base64(),
        ] {
            let req = Request::builder()
                .method("POST")
                .uri("/shard")
                .header(ROLE_HEADER, "founder")
                .header(PUBKEY_HEADER, key.replace('\n', "\\n"))
                .header(SIGNATURE_HEADER, t.keys.sign_base64(&body))
                .body(Body::from(body.clone()))
                .unwrap();
            let resp = t.app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_role_and_signature_headers_required() {
        let t = make_app(false).await;
        let body = shard_body(&sample_shard());

        let no_role = Request::builder()
            .method("POST")
            .uri("/shard")
            .body(Body::from(body.clone()))
            .unwrap();
        let resp = t.app.clone().oneshot(no_role).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"], "ROLE_INVALID");

        let bad_role = Request::builder()
            .method("POST")
            .uri("/shard")
            .header(ROLE_HEADER, "admin")
            .body(Body::from(body.clone()))
            .unwrap();
        let resp = t.app.clone().oneshot(bad_role).await.unwrap();
        assert_eq!(body_json(resp).await["error"], "ROLE_INVALID");

        let no_sig = Request::builder()
            .method("POST")
            .uri("/shard")
            .header(ROLE_HEADER, "founder")
            .header(PUBKEY_HEADER, t.keys.public_key_raw_base64())
            .body(Body::from(body))
            .unwrap();
        let resp = t.app.clone().oneshot(no_sig).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"], "SIGNATURE_MISSING");
    }

    #[tokio::test]
    async fn test_bad_json_and_invalid_shard() {
        let t = make_app(false).await;
        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "founder", b"{oops".to_vec()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "BAD_JSON");

        let mut shard = sample_shard();
        shard.bips_envelope.as_mut().unwrap().similarity_score = 0.2;
        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "founder", shard_body(&shard)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "SHARD_INVALID");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let t = make_app(false).await;
        let max = t.node.config().daemon.max_body_bytes;
        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "founder", vec![b' '; max + 1]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(resp).await["error"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_declared_content_length_is_rejected_before_reading() {
        let t = make_app(false).await;
        let max = t.node.config().daemon.max_body_bytes;
        let mut req = signed_request(&t.keys, "founder", shard_body(&sample_shard()));
        req.headers_mut()
            .insert("content-length", (max + 1).to_string().parse().unwrap());

        let resp = t.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(resp).await["error"], "PAYLOAD_TOO_LARGE");
        assert!(t.node.admissions().is_empty().await);
    }

    #[tokio::test]
    async fn test_stopped_node_answers_unavailable() {
        let t = make_app(false).await;
        t.node.stop().await.unwrap();
        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "founder", shard_body(&sample_shard())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "NODE_UNAVAILABLE");
        assert!(t.node.admissions().is_empty().await);
    }

    #[tokio::test]
    async fn test_stale_timestamp_is_rejected() {
        let t = make_app(false).await;
        t.clock.advance(t.node.config().daemon.max_skew_ms + 1);
        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "founder", shard_body(&sample_shard())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "TIMESTAMP_INVALID");
    }

    #[tokio::test]
    async fn test_identical_bytes_resolve_to_same_id() {
        let t = make_app(false).await;
        let body = shard_body(&sample_shard());
        let mut ids = Vec::new();
        for _ in 0..2 {
            let resp = t
                .app
                .clone()
                .oneshot(signed_request(&t.keys, "founder", body.clone()))
                .await
                .unwrap();
            ids.push(body_json(resp).await["id"].clone());
        }
        assert_eq!(ids[0], ids[1]);
        assert_eq!(get(&t.app, "/shards").await["count"], 1);
    }

    #[tokio::test]
    async fn test_packet_submission_uses_packet_id_and_upstream_color() {
        let t = make_app(false).await;
        let mut shard = sample_shard();
        shard.ethical_score = Some(EthicalScore::new(EthicalColor::RedRisk, 0.9));
        let packet = json!({
            "protocol": "HGI/1.0",
            "packet_id": "0123456789abcdef0123456789abcdef",
            "ethical_metadata": {"ethical_color": "GREEN_SAFE", "toxicity_score": 0.1},
            "states": [{"layer": "L5_SHARD", "payload": shard}],
        });
        let resp = t
            .app
            .clone()
            .oneshot(signed_request(
                &t.keys,
                "founder",
                serde_json::to_vec(&packet).unwrap(),
            ))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["id"], "0123456789abcdef0123456789abcdef");
        assert_eq!(json["stored"], true);

        let ulx = get(&t.app, "/ulx-received").await;
        assert_eq!(ulx["count"], 1);
        assert_eq!(ulx["items"][0]["ethical_color"], "GREEN_SAFE");
        assert_eq!(get(&t.app, "/received").await["count"], 0);
    }

    #[tokio::test]
    async fn test_insecure_mode_skips_auth_but_not_timestamp() {
        let t = make_app(true).await;
        let body = shard_body(&sample_shard());
        let req = Request::builder()
            .method("POST")
            .uri("/shard")
            .header(ROLE_HEADER, "founder")
            .body(Body::from(body.clone()))
            .unwrap();
        let resp = t.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["stored"], true);

        // no role header falls back to the lowest weight
        let req = Request::builder()
            .method("POST")
            .uri("/shard")
            .body(Body::from(body.clone()))
            .unwrap();
        let json = body_json(t.app.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(json["stored"], false);

        t.clock.advance(t.node.config().daemon.max_skew_ms + 1);
        let req = Request::builder()
            .method("POST")
            .uri("/shard")
            .header(ROLE_HEADER, "founder")
            .body(Body::from(body))
            .unwrap();
        let resp = t.app.clone().oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await["error"], "TIMESTAMP_INVALID");
    }

    #[tokio::test]
    async fn test_representation_endpoint() {
        let t = make_app(false).await;
        let resp = t
            .app
            .clone()
            .oneshot(signed_request(&t.keys, "founder", shard_body(&sample_shard())))
            .await
            .unwrap();
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let json = get(&t.app, &format!("/representations/{}", id)).await;
        let bundle = &json["representation"];
        assert_eq!(bundle["shard_id"], "bips-0011aabb");
        assert!(bundle.get("intention_core").is_none());

        t.clock.advance(t.node.store().ttl_ms());
        let resp = t
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/representations/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "NOT_FOUND");
    }
}
