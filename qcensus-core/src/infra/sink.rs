use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use super::http::{AuthToken, json_headers, redacted_url};
use crate::{
    error::ReportingError, ports::ReportingSink, types::AggregateResult,
};

/// Delivers the aggregate with a single `PUT` of its JSON mapping.
#[derive(Debug, Clone)]
pub struct HttpReportingSink {
    http: reqwest::Client,
    url: Url,
    auth: Option<AuthToken>,
    timeout: Duration,
}

impl HttpReportingSink {
    pub fn new(
        http: reqwest::Client,
        url: Url,
        auth: Option<AuthToken>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            url,
            auth,
            timeout,
        }
    }

    fn request_error(
        &self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> ReportingError {
        ReportingError::Request {
            url: redacted_url(&self.url),
            source: Box::new(source),
        }
    }
}

#[async_trait]
impl ReportingSink for HttpReportingSink {
    async fn deliver(
        &self,
        aggregate: &AggregateResult,
    ) -> Result<(), ReportingError> {
        let headers = json_headers(self.auth.as_ref())
            .map_err(|err| self.request_error(err))?;

        let response = self
            .http
            .put(self.url.clone())
            .headers(headers)
            .json(aggregate)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.request_error(err.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportingError::Status {
                url: redacted_url(&self.url),
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}
