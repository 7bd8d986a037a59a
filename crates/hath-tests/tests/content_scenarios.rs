//! End-to-end content path scenarios: local hit, stale keystamp, and
//! fetch-through from a peer on a static-range miss.

use axum::http::StatusCode;
use hath_core::mac::{keystamp_mac, KEYSTAMP_TAG_LEN};
use hath_core::{unix_now, FileId};
use hath_tests::{TestCoordinator, TestNode, TEST_CLIENT_KEY};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn local_hit_serves_stored_bytes() {
    let coordinator = TestCoordinator::start().await;
    coordinator.mount_server_stat().await;
    coordinator.mount_settings(7777, "aaaa").await;

    let node = TestNode::start(&coordinator).await;
    let data = b"local jpeg bytes".to_vec();
    let fid = node.seed_blob(&data);

    let (status, body, content_type) = node.get_parts(&node.content_uri(&fid)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, data);
    assert_eq!(content_type.as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn stale_keystamp_is_forbidden() {
    let coordinator = TestCoordinator::start().await;
    coordinator.mount_server_stat().await;
    coordinator.mount_settings(7777, "aaaa").await;

    let node = TestNode::start(&coordinator).await;
    let data = b"local jpeg bytes".to_vec();
    let fid = node.seed_blob(&data);

    // A keystamp minted 1000 seconds ago is outside the 900 second window.
    let stamp_time = unix_now() - 1000;
    let tag = &keystamp_mac(stamp_time, &fid, TEST_CLIENT_KEY)[..KEYSTAMP_TAG_LEN];
    let uri = format!("/h/{fid}/fileindex=1;xres=org;keystamp={stamp_time}-{tag}/x.jpg");

    let resp = node.get(&uri).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn static_range_miss_fetches_through_peer() {
    let data = b"bytes served by a peer node".to_vec();
    let fid = TestNode::blob_id(&data);
    let range = FileId::parse(&fid).unwrap().static_range().to_string();

    // A peer that serves the blob with the right length.
    let peer = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
        .mount(&peer)
        .await;

    let coordinator = TestCoordinator::start().await;
    coordinator.mount_server_stat().await;
    coordinator.mount_settings(7777, &range).await;
    coordinator
        .mount_srfetch(&[format!("{}/h/{fid}/token/x.jpg", peer.uri())])
        .await;

    let node = TestNode::start(&coordinator).await;
    assert!(node.client.settings().in_static_range(&range));

    let (status, body, content_type) = node.get_parts(&node.content_uri(&fid)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, data);
    assert_eq!(content_type.as_deref(), Some("image/jpeg"));

    // Write-back: a second request is served without another peer fetch.
    let peer_hits = peer.received_requests().await.unwrap().len();
    let (status, body, _) = node.get_parts(&node.content_uri(&fid)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, data);
    assert_eq!(peer.received_requests().await.unwrap().len(), peer_hits);
}

#[tokio::test]
async fn miss_outside_static_range_is_not_found() {
    let coordinator = TestCoordinator::start().await;
    coordinator.mount_server_stat().await;
    coordinator.mount_settings(7777, "ffff").await;

    let node = TestNode::start(&coordinator).await;
    let fid = TestNode::blob_id(b"nobody has this");

    let resp = node.get(&node.content_uri(&fid)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    // No srfetch was attempted.
    assert_eq!(coordinator.requests_for("srfetch").await, 0);
}

#[tokio::test]
async fn peer_exhaustion_is_not_found() {
    let data = b"unreachable blob".to_vec();
    let fid = TestNode::blob_id(&data);
    let range = FileId::parse(&fid).unwrap().static_range().to_string();

    let coordinator = TestCoordinator::start().await;
    coordinator.mount_server_stat().await;
    coordinator.mount_settings(7777, &range).await;
    coordinator
        .mount_srfetch(&["http://127.0.0.1:1/h/dead".to_string()])
        .await;

    let node = TestNode::start(&coordinator).await;
    let resp = node.get(&node.content_uri(&fid)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
