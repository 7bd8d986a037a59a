//! Signed RPC client for the coordinator.
//!
//! Every call is an HTTP GET whose query carries the action, the client
//! identity, and an action key: SHA-1 over the action, addendum, client id,
//! corrected time, and client key. `server_stat` is the one unauthenticated
//! action; it bootstraps the time delta the signed calls depend on.

use std::sync::Arc;
use std::time::Duration;

use hath_core::mac::action_mac;
use hath_core::{
    ClientIdentity, ServerTimeDelta, CLIENT_BUILD, CLIENT_VERSION, RPC_BOOTSTRAP_HOST,
    RPC_PATH, RPC_PROTOCOL,
};
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::cert::{decode_pkcs12, CertStore};
use crate::response::{parse_body, RpcResponse};
use crate::settings::{HostSet, RemoteSettings, SettingsHolder};
use crate::RpcError;

/// Overall timeout for a coordinator call.
const RPC_TIMEOUT: Duration = Duration::from_secs(60);

/// Attempts per call at the transport level. All actions are GETs, so
/// replaying a connection failure is safe.
const TRANSPORT_ATTEMPTS: usize = 3;

/// Actions the node issues against the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Unauthenticated server probe; source of the time delta
    ServerStat,
    /// First settings fetch; clears the server-side session
    ClientLogin,
    /// Settings refresh while running
    ClientSettings,
    /// Announce readiness once the listener is up
    ClientStart,
    /// Announce shutdown before draining
    ClientStop,
    /// Fetch the PKCS#12 workload certificate bundle
    GetCertificate,
    /// Resolve peer URLs for a static-range miss
    StaticRangeFetch,
}

impl Action {
    /// Returns the wire token for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ServerStat => "server_stat",
            Action::ClientLogin => "client_login",
            Action::ClientSettings => "client_settings",
            Action::ClientStart => "client_start",
            Action::ClientStop => "client_stop",
            Action::GetCertificate => "get_cert",
            Action::StaticRangeFetch => "srfetch",
        }
    }
}

/// Client for the coordinator RPC endpoint.
pub struct RpcClient {
    identity: ClientIdentity,
    http: reqwest::Client,
    delta: ServerTimeDelta,
    settings: SettingsHolder,
    hosts: HostSet,
    certs: Arc<CertStore>,
    bootstrap_host: String,
}

impl RpcClient {
    /// Creates a client against the well-known bootstrap host.
    pub fn new(identity: ClientIdentity) -> Result<Self, RpcError> {
        Self::with_bootstrap_host(identity, RPC_BOOTSTRAP_HOST)
    }

    /// Creates a client against a specific bootstrap host (tests point this
    /// at a local double).
    pub fn with_bootstrap_host(
        identity: ClientIdentity,
        bootstrap_host: impl Into<String>,
    ) -> Result<Self, RpcError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        let http = reqwest::Client::builder()
            .user_agent(format!("Hentai@Home {CLIENT_VERSION}"))
            .default_headers(headers)
            .timeout(RPC_TIMEOUT)
            .build()?;

        Ok(Self {
            identity,
            http,
            delta: ServerTimeDelta::new(),
            settings: SettingsHolder::new(),
            hosts: HostSet::new(),
            certs: Arc::new(CertStore::new()),
            bootstrap_host: bootstrap_host.into(),
        })
    }

    /// Returns the client identity.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Returns the local clock corrected to the coordinator's frame.
    pub fn corrected_now(&self) -> i64 {
        self.delta.corrected_now()
    }

    /// Returns the current settings snapshot.
    pub fn settings(&self) -> Arc<RemoteSettings> {
        self.settings.snapshot()
    }

    /// Returns the shared TLS material store.
    pub fn cert_store(&self) -> Arc<CertStore> {
        Arc::clone(&self.certs)
    }

    /// Picks the RPC host for the next call: the issued host set when one
    /// exists, the bootstrap host otherwise.
    fn rpc_host(&self) -> String {
        self.hosts.next().unwrap_or_else(|| self.bootstrap_host.clone())
    }

    /// Builds the request URL for an action. `server_stat` carries only the
    /// build and action; everything else is signed. The addendum is bound
    /// into the action key rather than sent as its own parameter.
    fn rpc_url(&self, action: Action, addendum: &str) -> Result<(Url, String), RpcError> {
        let host = self.rpc_host();
        let base = format!("{RPC_PROTOCOL}://{host}/{RPC_PATH}");
        let build = CLIENT_BUILD.to_string();

        let url = if action == Action::ServerStat {
            Url::parse_with_params(&base, [("clientbuild", build.as_str()), ("act", action.as_str())])
        } else {
            let acttime = self.delta.corrected_now();
            let acttime_str = acttime.to_string();
            let actkey = action_mac(
                action.as_str(),
                addendum,
                self.identity.id(),
                acttime,
                self.identity.key(),
            );
            Url::parse_with_params(
                &base,
                [
                    ("clientbuild", build.as_str()),
                    ("act", action.as_str()),
                    ("cid", self.identity.id()),
                    ("acttime", acttime_str.as_str()),
                    ("actkey", actkey.as_str()),
                ],
            )
        };

        let url = url.map_err(|_| RpcError::Unknown(format!("bad rpc host: {host}")))?;
        Ok((url, host))
    }

    /// Performs one HTTP round trip with a bounded transport retry.
    async fn raw_call(&self, url: Url, host: &str) -> Result<RpcResponse, RpcError> {
        let mut last_err = None;
        for attempt in 1..=TRANSPORT_ATTEMPTS {
            match self.http.get(url.clone()).send().await {
                Ok(resp) => {
                    let http_status = resp.status();
                    let body = resp.text().await?;
                    debug!(%url, %http_status, "rpc round trip");
                    return parse_body(&body, host);
                }
                Err(err) => {
                    warn!(%url, attempt, error = %err, "rpc transport failure");
                    last_err = Some(err);
                }
            }
        }
        Err(RpcError::Transport(last_err.expect("at least one attempt")))
    }

    /// Issues a single call without the key-expiry retry.
    async fn call_once(&self, action: Action, addendum: &str) -> Result<RpcResponse, RpcError> {
        let (url, host) = self.rpc_url(action, addendum)?;
        self.raw_call(url, &host).await
    }

    /// Issues a signed call.
    ///
    /// On `KEY_EXPIRED` the client resyncs the time delta, refetches
    /// settings, and replays the call exactly once; a second expiry
    /// propagates as an error. The retry never recurses.
    pub async fn call(&self, action: Action, addendum: &str) -> Result<RpcResponse, RpcError> {
        match self.call_once(action, addendum).await {
            Err(RpcError::KeyExpired) => {
                warn!(action = action.as_str(), "action key expired, resyncing");
                self.sync_time_delta().await?;
                self.fetch_settings_once(true).await?;
                self.call_once(action, addendum).await
            }
            other => other,
        }
    }

    /// Syncs the server time delta from `server_stat`.
    pub async fn sync_time_delta(&self) -> Result<(), RpcError> {
        let resp = self.call_once(Action::ServerStat, "").await?;
        let kv = resp.payload.key_values();
        let server_time: i64 = kv
            .get("server_time")
            .and_then(|t| t.parse().ok())
            .ok_or(RpcError::MissingField("server_time"))?;

        let delta = server_time - hath_core::unix_now();
        self.delta.set(delta);
        info!(delta, "synced server time delta");
        Ok(())
    }

    /// Fetches remote settings and installs a fresh snapshot.
    ///
    /// Cold boot uses `client_login`, which clears the server-side session;
    /// it must not be issued again once the node has announced readiness,
    /// so every later refresh passes `running = true`.
    pub async fn fetch_settings(&self, running: bool) -> Result<(), RpcError> {
        let action = if running { Action::ClientSettings } else { Action::ClientLogin };
        let resp = self.call(action, "").await?;
        self.apply_settings(&resp);
        Ok(())
    }

    /// Settings fetch used inside the key-expiry retry; never retries
    /// itself.
    async fn fetch_settings_once(&self, running: bool) -> Result<(), RpcError> {
        let action = if running { Action::ClientSettings } else { Action::ClientLogin };
        let resp = self.call_once(action, "").await?;
        self.apply_settings(&resp);
        Ok(())
    }

    fn apply_settings(&self, resp: &RpcResponse) {
        let prev = self.settings.snapshot();
        let next = Arc::new(RemoteSettings::merged(&prev, resp.payload.key_values()));
        self.hosts.rebuild(&next.rpc_hosts);
        self.settings.store(next);
    }

    /// Resolves peer URLs for a static-range fetch.
    pub async fn static_range_urls(
        &self,
        fileindex: &str,
        xres: &str,
        file_id: &str,
    ) -> Result<Vec<String>, RpcError> {
        let addendum = format!("{fileindex};{xres};{file_id}");
        let resp = self.call(Action::StaticRangeFetch, &addendum).await?;
        Ok(resp.payload.urls())
    }

    /// Tells the coordinator the listener is up and reachable.
    pub async fn notify_start(&self) -> Result<(), RpcError> {
        self.call(Action::ClientStart, "").await.map(|_| ())
    }

    /// Tells the coordinator the node is shutting down.
    pub async fn notify_stop(&self) -> Result<(), RpcError> {
        self.call(Action::ClientStop, "").await.map(|_| ())
    }

    /// Fetches the raw PKCS#12 bundle over the signed `get_cert` URL.
    pub async fn fetch_pkcs12(&self) -> Result<Vec<u8>, RpcError> {
        let (url, host) = self.rpc_url(Action::GetCertificate, "")?;
        debug!(%url, host = %host, "fetching workload certificate");
        let resp = self.http.get(url).send().await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Fetches, decodes, and installs fresh TLS material. New handshakes
    /// pick it up immediately; the listener keeps running.
    pub async fn refresh_certificate(&self) -> Result<(), RpcError> {
        let raw = self.fetch_pkcs12().await?;
        let material = decode_pkcs12(&raw, self.identity.key())?;
        self.certs.store(material);
        info!("installed fresh TLS material");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hath_core::mac::action_mac;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const KEY: &str = "abcdefghijklmnopqrst";

    fn identity() -> ClientIdentity {
        ClientIdentity::new("1", KEY).unwrap()
    }

    async fn client_for(server: &MockServer) -> RpcClient {
        let host = server.uri().strip_prefix("http://").unwrap().to_string();
        RpcClient::with_bootstrap_host(identity(), host).unwrap()
    }

    #[tokio::test]
    async fn test_server_stat_is_unauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .and(query_param("act", "server_stat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\nserver_time=123\n"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.sync_time_delta().await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let query: Vec<(String, String)> = requests[0]
            .url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(query.iter().any(|(k, _)| k == "clientbuild"));
        assert!(!query.iter().any(|(k, _)| k == "actkey"));
        assert!(!query.iter().any(|(k, _)| k == "cid"));
    }

    #[tokio::test]
    async fn test_sync_time_delta_stores_offset() {
        let server = MockServer::start().await;
        let future = hath_core::unix_now() + 1000;
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("OK\nserver_time={future}\n")),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.sync_time_delta().await.unwrap();
        // Allow a tick of slack for the two clock reads.
        assert!((client.corrected_now() - future).abs() <= 1);
    }

    fn actkey_of(request: &Request) -> (String, i64) {
        let mut actkey = None;
        let mut acttime = None;
        for (k, v) in request.url.query_pairs() {
            match k.as_ref() {
                "actkey" => actkey = Some(v.to_string()),
                "acttime" => acttime = v.parse().ok(),
                _ => {}
            }
        }
        (actkey.unwrap(), acttime.unwrap())
    }

    #[tokio::test]
    async fn test_signed_call_carries_valid_actkey() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\n"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.call(Action::ClientStart, "").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let (actkey, acttime) = actkey_of(&requests[0]);
        assert_eq!(actkey, action_mac("client_start", "", "1", acttime, KEY));
        assert!((acttime - hath_core::unix_now()).abs() <= 2);
    }

    #[tokio::test]
    async fn test_key_expired_retries_exactly_once() {
        let server = MockServer::start().await;

        // First start attempt: expired. The resync path issues server_stat
        // and client_settings, then the call is replayed and succeeds.
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .and(query_param("act", "client_start"))
            .respond_with(ResponseTemplate::new(200).set_body_string("KEY_EXPIRED\n"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .and(query_param("act", "server_stat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\nserver_time=1\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .and(query_param("act", "client_settings"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .and(query_param("act", "client_start"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\n"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.notify_start().await.unwrap();

        let starts = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.query_pairs().any(|(k, v)| k == "act" && v == "client_start"))
            .count();
        assert_eq!(starts, 2);
    }

    #[tokio::test]
    async fn test_second_key_expired_surfaces_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .and(query_param("act", "server_stat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\nserver_time=1\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .and(query_param("act", "client_settings"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\n"))
            .mount(&server)
            .await;
        // Every start attempt expires; the client must give up after the
        // single replay rather than loop.
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .and(query_param("act", "client_start"))
            .respond_with(ResponseTemplate::new(200).set_body_string("KEY_EXPIRED\n"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.notify_start().await.unwrap_err();
        assert!(matches!(err, RpcError::KeyExpired));

        let starts = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.query_pairs().any(|(k, v)| k == "act" && v == "client_start"))
            .count();
        assert_eq!(starts, 2);
    }

    #[tokio::test]
    async fn test_fatal_statuses_map_to_errors() {
        for (status, check) in [
            ("TEMPORARILY_UNAVAILABLE", RpcError::TemporarilyUnavailable),
            ("FAIL_CONNECT_TEST", RpcError::ConnectTestFailed),
            ("FAIL_OTHER_CLIENT_CONNECTED", RpcError::IpAddressInUse),
            ("FAIL_CID_IN_USE", RpcError::ClientIdInUse),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string(status))
                .mount(&server)
                .await;

            let client = client_for(&server).await;
            let err = client.call(Action::ClientStart, "").await.unwrap_err();
            assert_eq!(
                std::mem::discriminant(&err),
                std::mem::discriminant(&check),
                "status {status}"
            );
        }
    }

    #[tokio::test]
    async fn test_login_installs_settings_and_hosts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "OK\nport=7777\nstatic_ranges=aaaa;bbbb\nrpc-server-ip=9.9.9.9\n",
            ))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.fetch_settings(false).await.unwrap();

        let settings = client.settings();
        assert_eq!(settings.server_port, 7777);
        assert!(settings.in_static_range("aaaa"));
        assert!(settings.in_static_range("bbbb"));
        assert_eq!(settings.rpc_hosts.get("9.9.9.9"), Some(&10));

        // Subsequent calls go to the issued host, not the bootstrap one.
        assert_eq!(client.rpc_host(), "9.9.9.9");
    }

    #[tokio::test]
    async fn test_srfetch_addendum_and_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("OK\nhttp://peer.example/h/a\ngarbage line\n"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let fid = format!("{}-1234-800-600-jpg", "a".repeat(40));
        let urls = client.static_range_urls("1", "org", &fid).await.unwrap();
        assert_eq!(urls, vec!["http://peer.example/h/a".to_string()]);

        // The addendum travels inside the action key, not as a parameter.
        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].url.query_pairs().any(|(k, _)| k == "add"));
        let (actkey, acttime) = actkey_of(&requests[0]);
        assert_eq!(
            actkey,
            action_mac("srfetch", &format!("1;org;{fid}"), "1", acttime, KEY)
        );
    }
}
