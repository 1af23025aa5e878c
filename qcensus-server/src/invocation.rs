//! One invocation: optional debug pause, a fresh run, and the
//! `{statusCode, body}` response.

use anyhow::Context;
use qcensus_config::{Config, parse_duration};
use qcensus_core::{
    BrokerQueryClient, Deadline, Orchestrator, ReportingSink, RunOutcome,
    RunSettings, TenantDirectory,
    infra::{
        HttpReportingSink, HttpTenantDirectory, ManagementClient,
        build_http_client,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{info, warn};

/// Invocation event, shaped as `[{"debug_sleep": 3}]`. Only the first entry
/// is consulted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct InvocationEvent(Vec<EventEntry>);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventEntry {
    #[serde(default)]
    pub debug_sleep: Option<Value>,
}

impl InvocationEvent {
    pub fn with_debug_sleep(value: Value) -> Self {
        Self(vec![EventEntry {
            debug_sleep: Some(value),
        }])
    }

    /// Debug pause for this invocation. An event with an entry replaces the
    /// configured value entirely, even when the entry carries no delay.
    pub fn debug_sleep(
        event: Option<&Self>,
        configured: Option<Duration>,
    ) -> Option<Duration> {
        let Some(entry) = event.and_then(|event| event.0.first()) else {
            return configured;
        };

        let sleep = match &entry.debug_sleep {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => number
                .as_f64()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
            Some(Value::String(raw)) => parse_duration(raw).ok(),
            Some(_) => None,
        };
        if sleep.is_none()
            && entry.debug_sleep.as_ref().is_some_and(|v| !v.is_null())
        {
            warn!(
                value = ?entry.debug_sleep,
                "ignoring unusable debug_sleep in event"
            );
        }
        sleep.filter(|sleep| !sleep.is_zero())
    }
}

/// Result handed back to the caller: 200 with the aggregate as a JSON string,
/// or 500 with the error description as a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: String,
}

impl InvocationResponse {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        match outcome {
            Ok(report) => match serde_json::to_string(&report.aggregate) {
                Ok(body) => Self {
                    status_code: 200,
                    body,
                },
                Err(err) => Self::failure(&err),
            },
            Err(err) => Self::failure(err),
        }
    }

    pub fn failure(err: &dyn fmt::Display) -> Self {
        Self {
            status_code: 500,
            body: Value::String(err.to_string()).to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Holds the collaborators and settings every run is built from.
#[derive(Clone)]
pub struct Invoker {
    broker: Arc<dyn BrokerQueryClient>,
    directory: Arc<dyn TenantDirectory>,
    sink: Arc<dyn ReportingSink>,
    settings: RunSettings,
    debug_sleep: Option<Duration>,
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("settings", &self.settings)
            .field("debug_sleep", &self.debug_sleep)
            .finish_non_exhaustive()
    }
}

impl Invoker {
    pub fn new(
        broker: Arc<dyn BrokerQueryClient>,
        directory: Arc<dyn TenantDirectory>,
        sink: Arc<dyn ReportingSink>,
        settings: RunSettings,
    ) -> Self {
        Self {
            broker,
            directory,
            sink,
            settings,
            debug_sleep: None,
        }
    }

    pub fn with_debug_sleep(mut self, debug_sleep: Option<Duration>) -> Self {
        self.debug_sleep = debug_sleep;
        self
    }

    /// Wires the HTTP adapters described by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = build_http_client().context("failed to build HTTP client")?;
        let broker =
            ManagementClient::new(http.clone(), config.connection_params())
                .context("invalid broker management address")?;
        let auth = config.auth.auth_token();
        let directory = HttpTenantDirectory::new(
            http.clone(),
            config.endpoints.tenant_directory_url.clone(),
            auth.clone(),
            config.endpoints.http_timeout,
        );
        let sink = HttpReportingSink::new(
            http,
            config.endpoints.sink_url.clone(),
            auth,
            config.endpoints.http_timeout,
        );

        Ok(Self::new(
            Arc::new(broker),
            Arc::new(directory),
            Arc::new(sink),
            config.run_settings(),
        )
        .with_debug_sleep(config.debug.sleep))
    }

    /// Pauses if asked to, then executes one run with fresh run state. The
    /// invocation deadline starts before the pause, so the pause uses up
    /// part of the budget.
    pub async fn run(&self, event: Option<&InvocationEvent>) -> RunOutcome {
        let deadline = Deadline::start(
            self.settings.invocation_timeout,
            self.settings.drain_margin,
        );

        let sleep = InvocationEvent::debug_sleep(event, self.debug_sleep);
        if let Some(sleep) = sleep {
            let sleep = sleep.min(deadline.remaining());
            info!(sleep = ?sleep, "debug sleep before run");
            tokio::time::sleep(sleep).await;
        }

        Orchestrator::new(
            Arc::clone(&self.broker),
            Arc::clone(&self.directory),
            Arc::clone(&self.sink),
            self.settings.clone(),
        )
        .run_with_deadline(&deadline)
        .await
    }

    pub async fn invoke(
        &self,
        event: Option<&InvocationEvent>,
    ) -> InvocationResponse {
        InvocationResponse::from_outcome(&self.run(event).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qcensus_core::{
        AggregateResult, BrokerError, DirectoryError, QueueList,
        ReportingError, TenantId, VhostName,
    };
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers with one queue per vhost, taking `tenant_delay` for every
    /// vhost but the core one.
    #[derive(Default)]
    struct OneQueueBroker {
        tenant_delay: Duration,
    }

    #[async_trait]
    impl BrokerQueryClient for OneQueueBroker {
        async fn list_queues(
            &self,
            vhost: &VhostName,
            _timeout: Duration,
        ) -> Result<QueueList, BrokerError> {
            if vhost.as_str() != "carrier" {
                tokio::time::sleep(self.tenant_delay).await;
            }
            Ok(vec![format!("{vhost}-q")])
        }
    }

    struct FixedDirectory(Option<Vec<&'static str>>);

    #[async_trait]
    impl TenantDirectory for FixedDirectory {
        async fn tenant_ids(&self) -> Result<Vec<TenantId>, DirectoryError> {
            match &self.0 {
                Some(ids) => {
                    Ok(ids.iter().copied().map(TenantId::from).collect())
                }
                None => Err(DirectoryError::Status {
                    url: "http://registry/ids".into(),
                    status: 502,
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<AggregateResult>>);

    #[async_trait]
    impl ReportingSink for RecordingSink {
        async fn deliver(
            &self,
            aggregate: &AggregateResult,
        ) -> Result<(), ReportingError> {
            self.0.lock().unwrap().push(aggregate.clone());
            Ok(())
        }
    }

    fn invoker(
        tenants: Option<Vec<&'static str>>,
    ) -> (Invoker, Arc<RecordingSink>) {
        invoker_with_broker(tenants, OneQueueBroker::default())
    }

    fn invoker_with_broker(
        tenants: Option<Vec<&'static str>>,
        broker: OneQueueBroker,
    ) -> (Invoker, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let invoker = Invoker::new(
            Arc::new(broker),
            Arc::new(FixedDirectory(tenants)),
            sink.clone(),
            RunSettings::default(),
        );
        (invoker, sink)
    }

    #[test]
    fn response_serializes_with_camel_case_status() {
        let response = InvocationResponse {
            status_code: 200,
            body: "{}".into(),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "statusCode": 200, "body": "{}" })
        );
    }

    #[test]
    fn failure_body_is_a_json_string() {
        let response = InvocationResponse::failure(&"sink said \"no\"");
        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, r#""sink said \"no\"""#);
        assert!(!response.is_success());
    }

    #[test]
    fn event_overrides_configured_sleep() {
        let configured = Some(Duration::from_secs(9));

        assert_eq!(InvocationEvent::debug_sleep(None, configured), configured);

        let event: InvocationEvent =
            serde_json::from_str(r#"[{"debug_sleep": 3}]"#).unwrap();
        assert_eq!(
            InvocationEvent::debug_sleep(Some(&event), configured),
            Some(Duration::from_secs(3))
        );

        let event: InvocationEvent = serde_json::from_str(r#"[{}]"#).unwrap();
        assert_eq!(
            InvocationEvent::debug_sleep(Some(&event), configured),
            None
        );

        let empty = InvocationEvent::default();
        assert_eq!(
            InvocationEvent::debug_sleep(Some(&empty), configured),
            configured
        );
    }

    #[test]
    fn event_sleep_accepts_text_and_ignores_garbage() {
        let text = InvocationEvent::with_debug_sleep(json!("1500ms"));
        assert_eq!(
            InvocationEvent::debug_sleep(Some(&text), None),
            Some(Duration::from_millis(1500))
        );

        let garbage = InvocationEvent::with_debug_sleep(json!("soon"));
        assert_eq!(InvocationEvent::debug_sleep(Some(&garbage), None), None);

        let negative = InvocationEvent::with_debug_sleep(json!(-2));
        assert_eq!(InvocationEvent::debug_sleep(Some(&negative), None), None);
    }

    #[tokio::test]
    async fn successful_run_returns_aggregate_body() {
        let (invoker, sink) = invoker(Some(vec!["1"]));

        let response = invoker.invoke(None).await;

        assert!(response.is_success());
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(
            body,
            json!({
                "carrier": ["carrier-q"],
                "project_1_vhost": ["project_1_vhost-q"],
            })
        );
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn directory_failure_returns_500_without_delivery() {
        let (invoker, sink) = invoker(None);

        let response = invoker.invoke(None).await;

        assert_eq!(response.status_code, 500);
        let body: String = serde_json::from_str(&response.body).unwrap();
        assert!(body.contains("status 502"));
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn debug_sleep_is_clamped_to_invocation_timeout() {
        let (invoker, _sink) = invoker(Some(vec![]));
        let invoker = invoker.with_debug_sleep(Some(Duration::from_secs(3600)));

        let started = tokio::time::Instant::now();
        let outcome = invoker.run(None).await;

        assert!(outcome.is_ok());
        assert_eq!(started.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn debug_sleep_uses_up_the_invocation_budget() {
        let ids = vec!["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];
        let (invoker, sink) = invoker_with_broker(
            Some(ids),
            OneQueueBroker {
                tenant_delay: Duration::from_secs(3),
            },
        );
        let invoker =
            invoker.with_debug_sleep(Some(Duration::from_secs(110)));

        let started = tokio::time::Instant::now();
        let report = invoker.run(None).await.unwrap();

        assert!(started.elapsed() <= Duration::from_secs(120));
        assert_eq!(report.summary.listed, 2);
        assert_eq!(report.summary.skipped, 8);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }
}
