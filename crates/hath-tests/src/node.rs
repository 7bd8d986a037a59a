//! A fully assembled node for scenario tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use hath_core::mac::{command_mac, keystamp_mac, KEYSTAMP_TAG_LEN};
use hath_core::{unix_now, ClientIdentity, FileId};
use hath_gateway::{router, Gateway};
use hath_rpc::RpcClient;
use hath_store::BlobStore;
use tempfile::TempDir;
use tokio::sync::watch;
use tower::util::ServiceExt;

use crate::{TestCoordinator, TEST_CLIENT_ID, TEST_CLIENT_KEY};

/// A booted node: logged-in client, open store, routed gateway.
pub struct TestNode {
    /// Coordinator client, logged in against the test double.
    pub client: Arc<RpcClient>,
    /// Local blob store on a temp directory.
    pub store: Arc<BlobStore>,
    /// The node's router, probed with `oneshot`.
    pub router: Router,
    shutdown_tx: watch::Sender<bool>,
    _dir: TempDir,
}

impl TestNode {
    /// Boots a node against the coordinator double: syncs the clock, logs
    /// in, opens a store, and assembles the router.
    pub async fn start(coordinator: &TestCoordinator) -> Self {
        let identity = ClientIdentity::new(TEST_CLIENT_ID, TEST_CLIENT_KEY).unwrap();
        let client = Arc::new(
            RpcClient::with_bootstrap_host(identity, coordinator.host()).unwrap(),
        );

        client.sync_time_delta().await.expect("sync time");
        client.fetch_settings(false).await.expect("login");

        let dir = TempDir::new().unwrap();
        let store = Arc::new(BlobStore::open(dir.path()).unwrap());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let gateway = Arc::new(
            Gateway::new(Arc::clone(&client), Arc::clone(&store), true, shutdown_rx).unwrap(),
        );

        Self {
            client,
            store,
            router: router(gateway),
            shutdown_tx,
            _dir: dir,
        }
    }

    /// Signals shutdown to in-flight work.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Sends one GET through the router.
    pub async fn get(&self, uri: &str) -> Response {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    /// Sends one GET and returns status, body, and content type.
    pub async fn get_parts(&self, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
        let resp = self.get(uri).await;
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec(), content_type)
    }

    /// Builds a currently valid content URI for the file id.
    pub fn content_uri(&self, file_id: &str) -> String {
        let stamp_time = unix_now();
        let tag = &keystamp_mac(stamp_time, file_id, TEST_CLIENT_KEY)[..KEYSTAMP_TAG_LEN];
        format!("/h/{file_id}/fileindex=1;xres=org;keystamp={stamp_time}-{tag}/x.jpg")
    }

    /// Builds a signed command URI.
    pub fn command_uri(&self, cmd: &str, addendum: &str) -> String {
        let time = unix_now();
        let key = command_mac(cmd, addendum, TEST_CLIENT_ID, time, TEST_CLIENT_KEY);
        format!("/servercmd/{cmd}/{addendum}/{time}/{key}")
    }

    /// Stores a blob and returns its file id string.
    pub fn seed_blob(&self, data: &[u8]) -> String {
        let id = format!(
            "{}-{}-800-600-jpg",
            hath_core::mac::sha1_hex_bytes(data),
            data.len()
        );
        self.store.put(&FileId::parse(&id).unwrap(), data).unwrap();
        id
    }

    /// Returns the file id a blob of these bytes would have, without
    /// storing it.
    pub fn blob_id(data: &[u8]) -> String {
        format!(
            "{}-{}-800-600-jpg",
            hath_core::mac::sha1_hex_bytes(data),
            data.len()
        )
    }
}
