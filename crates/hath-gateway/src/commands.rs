//! Coordinator command dispatch.
//!
//! Commands arrive MAC-authenticated on `/servercmd` and either poke the
//! node (health, settings, certs) or run the fan-out throughput probe
//! against another host.

use std::collections::HashMap;

use axum::response::{IntoResponse, Response};
use rand::RngCore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::{Gateway, GatewayError};

/// Default body size for `speed_test`.
const SPEED_TEST_DEFAULT: usize = 1_000_000;

/// Upper bound on generated test bodies.
pub(crate) const MAX_TEST_BODY: usize = 100_000_000;

/// Returns `size` bytes of throwaway random data.
pub(crate) fn random_body(size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Runs a verified command and renders its response body.
pub(crate) async fn execute_command(
    gw: &Gateway,
    cmd: &str,
    params: &HashMap<String, String>,
) -> Result<Response, GatewayError> {
    match cmd {
        "still_alive" => Ok("I feel FANTASTIC and I'm still alive".into_response()),

        "threaded_proxy_test" => {
            let result = proxy_test(gw, params).await?;
            Ok(result.into_response())
        }

        "speed_test" => {
            let size = params
                .get("testsize")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&s| s > 0)
                .unwrap_or(SPEED_TEST_DEFAULT)
                .min(MAX_TEST_BODY);
            Ok(random_body(size).into_response())
        }

        "refresh_settings" => {
            gw.client().fetch_settings(true).await.map_err(|err| {
                warn!(%err, "settings refresh failed");
                GatewayError::internal()
            })?;
            Ok(().into_response())
        }

        // The downloader is always running; acknowledged for protocol
        // compatibility.
        "start_downloader" => Ok(().into_response()),

        "refresh_certs" => {
            gw.client().refresh_certificate().await.map_err(|err| {
                warn!(%err, "certificate refresh failed");
                GatewayError::internal()
            })?;
            Ok(().into_response())
        }

        other => {
            warn!(cmd = other, "unknown command");
            Err(GatewayError::bad_request("INVALID_COMMAND"))
        }
    }
}

/// Fans out `testcount` concurrent probe downloads against the target named
/// in the addendum and reports `OK:<successes>-<total_ms>`.
///
/// Successes start at the full count and drop on any per-request failure;
/// only successful durations are summed. The wait is cancelable so shutdown
/// stays bounded.
async fn proxy_test(gw: &Gateway, params: &HashMap<String, String>) -> Result<String, GatewayError> {
    let hostname = params.get("hostname").map(String::as_str).unwrap_or("");
    let port = params.get("port").map(String::as_str).unwrap_or("");
    let protocol = params
        .get("protocol")
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .unwrap_or("http");
    let test_size = params.get("testsize").map(String::as_str).unwrap_or("0");
    let test_count: usize = params.get("testcount").and_then(|v| v.parse().ok()).unwrap_or(0);
    let test_time = params.get("testtime").map(String::as_str).unwrap_or("");
    let test_key = params.get("testkey").map(String::as_str).unwrap_or("");

    let mut tasks = JoinSet::new();
    for _ in 0..test_count {
        let nonce: u32 = rand::random();
        let url = format!("{protocol}://{hostname}:{port}/t/{test_size}/{test_time}/{test_key}/{nonce}");
        let downloader = gw.downloader().clone();
        tasks.spawn(async move { downloader.discard_download(&url).await });
    }

    let mut successes = test_count as i64;
    let mut total_ms: i64 = 0;
    let mut shutdown = gw.shutdown();

    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok(Ok(elapsed))) => total_ms += elapsed.as_millis() as i64,
                Some(_) => successes -= 1,
                None => break,
            },
            _ = shutdown.changed() => {
                warn!("shutdown during throughput probe, aborting");
                tasks.abort_all();
                return Err(GatewayError::internal());
            }
        }
    }

    info!(successes, total_ms, count = test_count, "throughput probe finished");
    Ok(format!("OK:{successes}-{total_ms}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hath_core::ClientIdentity;
    use hath_rpc::RpcClient;
    use hath_store::BlobStore;
    use tempfile::TempDir;
    use tokio::sync::watch;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(shutdown: watch::Receiver<bool>) -> (Arc<Gateway>, TempDir) {
        let identity = ClientIdentity::new("1", "abcdefghijklmnopqrst").unwrap();
        let client = Arc::new(RpcClient::with_bootstrap_host(identity, "127.0.0.1:1").unwrap());
        let dir = TempDir::new().unwrap();
        let store = Arc::new(BlobStore::open(dir.path()).unwrap());
        let gw = Arc::new(Gateway::new(client, store, true, shutdown).unwrap());
        (gw, dir)
    }

    fn probe_params(server: &MockServer, count: usize) -> HashMap<String, String> {
        let addr: std::net::SocketAddr = server.address().to_owned();
        let mut params = HashMap::new();
        params.insert("hostname".to_string(), addr.ip().to_string());
        params.insert("port".to_string(), addr.port().to_string());
        params.insert("protocol".to_string(), "http".to_string());
        params.insert("testsize".to_string(), "1000".to_string());
        params.insert("testcount".to_string(), count.to_string());
        params.insert("testtime".to_string(), "1".to_string());
        params.insert("testkey".to_string(), "k".to_string());
        params
    }

    #[tokio::test]
    async fn test_proxy_test_counts_successes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/t/1000/1/k/\d+$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1000]))
            .mount(&server)
            .await;

        let (_tx, rx) = watch::channel(false);
        let (gw, _dir) = gateway(rx);

        let result = proxy_test(&gw, &probe_params(&server, 3)).await.unwrap();
        assert!(result.starts_with("OK:3-"), "got {result}");
    }

    #[tokio::test]
    async fn test_proxy_test_decrements_on_failure() {
        // Nothing is listening on the target port; every sub-request fails.
        let (_tx, rx) = watch::channel(false);
        let (gw, _dir) = gateway(rx);

        let mut params = HashMap::new();
        params.insert("hostname".to_string(), "127.0.0.1".to_string());
        params.insert("port".to_string(), "1".to_string());
        params.insert("testsize".to_string(), "10".to_string());
        params.insert("testcount".to_string(), "2".to_string());
        params.insert("testtime".to_string(), "1".to_string());
        params.insert("testkey".to_string(), "k".to_string());

        let result = proxy_test(&gw, &params).await.unwrap();
        assert_eq!(result, "OK:0-0");
    }

    #[tokio::test]
    async fn test_proxy_test_zero_count() {
        let (_tx, rx) = watch::channel(false);
        let (gw, _dir) = gateway(rx);
        let result = proxy_test(&gw, &HashMap::new()).await.unwrap();
        assert_eq!(result, "OK:0-0");
    }

    #[tokio::test]
    async fn test_proxy_test_cancels_on_shutdown() {
        let server = MockServer::start().await;
        // A slow responder keeps the probe in flight while we signal
        // shutdown.
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 10])
                    .set_delay(std::time::Duration::from_secs(4)),
            )
            .mount(&server)
            .await;

        let (tx, rx) = watch::channel(false);
        let (gw, _dir) = gateway(rx);
        let params = probe_params(&server, 2);

        let probe = tokio::spawn(async move { proxy_test(&gw, &params).await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), probe)
            .await
            .expect("probe wait must be cancelable")
            .unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_random_body_size() {
        assert_eq!(random_body(0).len(), 0);
        assert_eq!(random_body(4096).len(), 4096);
    }
}
