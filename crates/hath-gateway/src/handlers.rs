//! Request handlers for the three HTTPS surfaces.
//!
//! Routes are wildcard-matched and split on `/` in the handler, so segment
//! counts (including empty addenda like `/servercmd/still_alive//...`) are
//! checked in one place. GET routes also answer HEAD.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Router};
use hath_core::mac::{keystamp_mac, KEYSTAMP_TAG_LEN};
use hath_core::{parse_addendum, unix_now, FileId, KEYSTAMP_WINDOW_SECS};
use hath_store::StoreError;
use tracing::{info, warn};

use crate::commands::{execute_command, random_body, MAX_TEST_BODY};
use crate::{Gateway, GatewayError};

/// Source address of the connection, injected per connection by the
/// listener.
#[derive(Debug, Clone, Copy)]
pub struct RemoteAddr(pub SocketAddr);

/// Builds the router over a shared gateway.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/h/{*rest}", get(content))
        .route("/servercmd/{*rest}", get(server_cmd))
        .route("/t/{*rest}", get(test_echo))
        .with_state(gateway)
}

/// `GET /h/<file_id>/<addendum>/<filename>` — the content path.
async fn content(
    State(gw): State<Arc<Gateway>>,
    Path(rest): Path<String>,
) -> Result<Response, GatewayError> {
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() != 3 {
        return Err(GatewayError::bad_request("malformed path"));
    }
    let (file_id, addendum) = (parts[0], parts[1]);

    let fid = FileId::parse(file_id).map_err(|err| {
        warn!(file_id, %err, "rejected file id");
        GatewayError::not_found()
    })?;
    let params = parse_addendum(addendum);

    // The keystamp authorizes this specific file id for a 15 minute window.
    let keystamp_ok = params
        .get("keystamp")
        .and_then(|stamp| stamp.split_once('-'))
        .and_then(|(time, tag)| time.parse::<i64>().ok().map(|t| (t, tag)))
        .map(|(stamp_time, tag)| {
            let expected = keystamp_mac(stamp_time, file_id, gw.client().identity().key());
            (unix_now() - stamp_time).abs() < KEYSTAMP_WINDOW_SECS
                && tag.to_lowercase() == expected[..KEYSTAMP_TAG_LEN]
        })
        .unwrap_or(false);

    if !keystamp_ok {
        warn!(file_id, "keystamp rejected");
        return Err(GatewayError::forbidden());
    }

    let fileindex = params.get("fileindex").and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
    let xres = params.get("xres").map(String::as_str).unwrap_or("");
    if fileindex == 0 || xres.is_empty() {
        return Err(GatewayError::not_found());
    }

    match gw.store().get(&fid) {
        Ok(data) => Ok(blob_response(&fid, data)),
        Err(StoreError::NotFound) => {
            if !gw.client().settings().in_static_range(fid.static_range()) {
                return Err(GatewayError::not_found());
            }
            fetch_through(&gw, &fid, fileindex, xres, file_id).await
        }
        Err(err) => {
            warn!(file_id, %err, "store lookup failed");
            Err(GatewayError::internal())
        }
    }
}

/// Resolves a static-range miss through the peer network.
async fn fetch_through(
    gw: &Gateway,
    fid: &FileId,
    fileindex: u64,
    xres: &str,
    file_id: &str,
) -> Result<Response, GatewayError> {
    let urls = gw
        .client()
        .static_range_urls(&fileindex.to_string(), xres, file_id)
        .await
        .map_err(|err| {
            warn!(file_id, %err, "static range fetch failed");
            GatewayError::not_found()
        })?;
    if urls.is_empty() {
        return Err(GatewayError::not_found());
    }

    let data = gw
        .downloader()
        .multi_source_download(&urls, fid)
        .await
        .map_err(|err| {
            warn!(file_id, %err, "proxy download failed");
            GatewayError::not_found()
        })?;

    if gw.cache_writeback() {
        if let Err(err) = gw.store().put(fid, &data) {
            warn!(file_id, %err, "write-back failed");
        }
    }

    info!(file_id, bytes = data.len(), "served through from peers");
    Ok(blob_response(fid, data))
}

fn blob_response(fid: &FileId, data: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, fid.mime())], data).into_response()
}

/// `GET /servercmd/<cmd>/<addendum>/<time>/<key>` — coordinator commands.
async fn server_cmd(
    State(gw): State<Arc<Gateway>>,
    remote: Option<Extension<RemoteAddr>>,
    Path(rest): Path<String>,
) -> Result<Response, GatewayError> {
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() != 4 {
        return Err(GatewayError::bad_request("malformed path"));
    }
    let (cmd, addendum, time_str, key) = (parts[0], parts[1], parts[2], parts[3]);

    let source = remote.map(|Extension(RemoteAddr(addr))| addr.to_string()).unwrap_or_default();
    info!(cmd, addendum, time = time_str, source, "coordinator command received");

    // The source address is not checked; the key is the authentication.
    // The window is one-sided on purpose: stale timestamps are retries.
    let server_time: i64 = time_str.parse().unwrap_or(0);
    let expected = hath_core::mac::command_mac(
        cmd,
        addendum,
        gw.client().identity().id(),
        server_time,
        gw.client().identity().key(),
    );
    if server_time - unix_now() > hath_core::MAX_KEY_TIME_DRIFT_SECS || expected != key {
        warn!(cmd, addendum, time = time_str, source, "command auth rejected");
        return Err(GatewayError::forbidden());
    }

    let params = parse_addendum(addendum);
    execute_command(&gw, cmd, &params).await
}

/// `GET /t/<size>/<time>/<key>[/<nonce>]` — throughput test echo.
///
/// Unauthenticated: the commands that originate probes already carry the
/// command MAC.
async fn test_echo(Path(rest): Path<String>) -> Result<Response, GatewayError> {
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err(GatewayError::bad_request("malformed path"));
    }

    let size = parts[0].parse::<usize>().unwrap_or(0).min(MAX_TEST_BODY);
    Ok(random_body(size).into_response())
}
