//! Broker queue listing over the RabbitMQ management HTTP API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::{
    error::BrokerError,
    ports::BrokerQueryClient,
    types::{QueueList, Secret, VhostName},
};

/// Default port of the management plugin.
pub const DEFAULT_MANAGEMENT_PORT: u16 = 15672;

#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret,
    pub use_tls: bool,
}

impl ConnectionParams {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        let scheme = if self.use_tls { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{}:{}/", self.host, self.port))
    }
}

#[derive(Debug, Deserialize)]
struct QueueEntry {
    name: String,
}

#[derive(Debug, Clone)]
pub struct ManagementClient {
    http: reqwest::Client,
    params: ConnectionParams,
    base: Url,
}

impl ManagementClient {
    pub fn new(
        http: reqwest::Client,
        params: ConnectionParams,
    ) -> Result<Self, url::ParseError> {
        let base = params.base_url()?;
        Ok(Self { http, params, base })
    }

    /// `/api/queues/{vhost}?columns=name`, with the vhost encoded as a single
    /// path segment (`/` becomes `%2F`).
    fn queues_url(&self, vhost: &VhostName) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "queues", vhost.as_str()]);
        }
        url.query_pairs_mut().append_pair("columns", "name");
        url
    }

    fn transport_error(
        &self,
        err: reqwest::Error,
        timeout: Duration,
    ) -> BrokerError {
        if err.is_timeout() {
            BrokerError::Timeout { timeout }
        } else {
            BrokerError::Connect {
                endpoint: self.params.endpoint(),
                source: Box::new(err),
            }
        }
    }
}

#[async_trait]
impl BrokerQueryClient for ManagementClient {
    async fn list_queues(
        &self,
        vhost: &VhostName,
        timeout: Duration,
    ) -> Result<QueueList, BrokerError> {
        let response = self
            .http
            .get(self.queues_url(vhost))
            .basic_auth(&self.params.user, Some(self.params.password.expose()))
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| self.transport_error(err, timeout))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(BrokerError::AccessDenied);
            }
            StatusCode::NOT_FOUND => return Err(BrokerError::VhostNotFound),
            status => {
                return Err(BrokerError::Status {
                    status: status.as_u16(),
                });
            }
        }

        let entries: Vec<QueueEntry> =
            response.json().await.map_err(|err| {
                if err.is_timeout() {
                    BrokerError::Timeout { timeout }
                } else {
                    BrokerError::Decode(Box::new(err))
                }
            })?;

        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::test_support::{serve, unused_port};
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode as AxumStatus, header::AUTHORIZATION},
        response::IntoResponse,
        routing::get,
    };
    use serde_json::json;

    // base64("guest:guest")
    const GUEST_BASIC: &str = "Basic Z3Vlc3Q6Z3Vlc3Q=";

    async fn queues(
        Path(vhost): Path<String>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        if headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
            != Some(GUEST_BASIC)
        {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        match vhost.as_str() {
            "/" => Json(json!([{ "name": "default-q" }])).into_response(),
            "project_1_vhost" => {
                let queues = json!([{ "name": "q1" }, { "name": "q2" }]);
                Json(queues).into_response()
            }
            "empty" => Json(json!([])).into_response(),
            "garbled" => "not json".into_response(),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!([])).into_response()
            }
            "broken" => AxumStatus::INTERNAL_SERVER_ERROR.into_response(),
            _ => AxumStatus::NOT_FOUND.into_response(),
        }
    }

    fn params(port: u16, user: &str) -> ConnectionParams {
        ConnectionParams {
            host: "127.0.0.1".into(),
            port,
            user: user.into(),
            password: Secret::new("guest"),
            use_tls: false,
        }
    }

    async fn client(user: &str) -> ManagementClient {
        let router = Router::new().route("/api/queues/{vhost}", get(queues));
        let addr = serve(router).await;
        ManagementClient::new(reqwest::Client::new(), params(addr.port(), user))
            .unwrap()
    }

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn vhost_is_encoded_as_one_segment() {
        let connection = params(15672, "guest");
        let client =
            ManagementClient::new(reqwest::Client::new(), connection).unwrap();

        assert_eq!(
            client.queues_url(&"/".into()).as_str(),
            "http://127.0.0.1:15672/api/queues/%2F?columns=name"
        );
        assert_eq!(
            client.queues_url(&"project_1_vhost".into()).as_str(),
            "http://127.0.0.1:15672/api/queues/project_1_vhost?columns=name"
        );
    }

    #[tokio::test]
    async fn lists_queue_names_in_broker_order() {
        let client = client("guest").await;

        let queues = client
            .list_queues(&"project_1_vhost".into(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(queues, ["q1", "q2"]);

        let default = client.list_queues(&"/".into(), TIMEOUT).await.unwrap();
        assert_eq!(default, ["default-q"]);
    }

    #[tokio::test]
    async fn empty_vhost_is_a_successful_empty_list() {
        let client = client("guest").await;
        let queues =
            client.list_queues(&"empty".into(), TIMEOUT).await.unwrap();
        assert!(queues.is_empty());
    }

    #[tokio::test]
    async fn status_codes_map_to_broker_errors() {
        let client = client("guest").await;

        let missing = client.list_queues(&"nope".into(), TIMEOUT).await;
        assert!(matches!(missing, Err(BrokerError::VhostNotFound)));

        let broken = client.list_queues(&"broken".into(), TIMEOUT).await;
        assert!(matches!(broken, Err(BrokerError::Status { status: 500 })));

        let garbled = client.list_queues(&"garbled".into(), TIMEOUT).await;
        assert!(matches!(garbled, Err(BrokerError::Decode(_))));
    }

    #[tokio::test]
    async fn wrong_credentials_are_access_denied() {
        let client = client("intruder").await;
        let result =
            client.list_queues(&"project_1_vhost".into(), TIMEOUT).await;
        assert!(matches!(result, Err(BrokerError::AccessDenied)));
    }

    #[tokio::test]
    async fn slow_vhost_times_out_within_budget() {
        let client = client("guest").await;
        let timeout = Duration::from_millis(100);

        let started = std::time::Instant::now();
        let result = client.list_queues(&"slow".into(), timeout).await;

        assert!(matches!(result, Err(BrokerError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn unreachable_broker_is_a_connect_error() {
        let port = unused_port().await;
        let client =
            ManagementClient::new(reqwest::Client::new(), params(port, "guest"))
                .unwrap();

        let result =
            client.list_queues(&"project_1_vhost".into(), TIMEOUT).await;
        match result {
            Err(BrokerError::Connect { endpoint, .. }) => {
                assert_eq!(endpoint, format!("127.0.0.1:{port}"));
            }
            other => panic!("expected connect error, got {other:?}"),
        }
    }
}
