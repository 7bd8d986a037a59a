//! A wiremock double of the coordinator RPC endpoint.

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Coordinator double serving `/15/rpc`.
pub struct TestCoordinator {
    /// The underlying mock server.
    pub server: MockServer,
}

impl TestCoordinator {
    /// Starts the double.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Returns the `host:port` the node should use as its bootstrap host.
    pub fn host(&self) -> String {
        self.server
            .uri()
            .strip_prefix("http://")
            .expect("mock server uri")
            .to_string()
    }

    fn rpc(&self, action: &str) -> wiremock::MockBuilder {
        Mock::given(method("GET"))
            .and(path("/15/rpc"))
            .and(query_param("act", action))
    }

    /// Mounts `server_stat` answering with the real current time, so the
    /// node's delta syncs to roughly zero.
    pub async fn mount_server_stat(&self) {
        self.rpc("server_stat")
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "OK\nserver_time={}\n",
                hath_core::unix_now()
            )))
            .mount(&self.server)
            .await;
    }

    /// Mounts `client_login` and `client_settings` with the given port and
    /// static ranges.
    pub async fn mount_settings(&self, server_port: u16, static_ranges: &str) {
        let body = format!("OK\nport={server_port}\nstatic_ranges={static_ranges}\n");
        self.rpc("client_login")
            .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
            .mount(&self.server)
            .await;
        self.rpc("client_settings")
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Mounts `srfetch` answering with the given peer URLs.
    pub async fn mount_srfetch(&self, urls: &[String]) {
        let mut body = String::from("OK\n");
        for url in urls {
            body.push_str(url);
            body.push('\n');
        }
        self.rpc("srfetch")
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Mounts `client_start` and `client_stop`.
    pub async fn mount_lifecycle(&self) {
        self.rpc("client_start")
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\n"))
            .mount(&self.server)
            .await;
        self.rpc("client_stop")
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\n"))
            .mount(&self.server)
            .await;
    }

    /// Counts received requests for a given action.
    pub async fn requests_for(&self, action: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.query_pairs().any(|(k, v)| k == "act" && v == action))
            .count()
    }
}
