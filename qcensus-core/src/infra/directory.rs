use async_trait::async_trait;
use std::{collections::HashSet, time::Duration};
use tracing::debug;
use url::Url;

use super::http::{AuthToken, json_headers, redacted_url};
use crate::{error::DirectoryError, ports::TenantDirectory, types::TenantId};

/// Tenant registry reached with a single `PATCH`, answering with a JSON array
/// of tenant ids.
#[derive(Debug, Clone)]
pub struct HttpTenantDirectory {
    http: reqwest::Client,
    url: Url,
    auth: Option<AuthToken>,
    timeout: Duration,
}

impl HttpTenantDirectory {
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
    ) -> DirectoryError {
        DirectoryError::Request {
            url: redacted_url(&self.url),
            source: Box::new(source),
        }
    }
}

#[async_trait]
impl TenantDirectory for HttpTenantDirectory {
    async fn tenant_ids(&self) -> Result<Vec<TenantId>, DirectoryError> {
        let headers = json_headers(self.auth.as_ref())
            .map_err(|err| self.request_error(err))?;

        let response = self
            .http
            .patch(self.url.clone())
            .headers(headers)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.request_error(err.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status {
                url: redacted_url(&self.url),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| self.request_error(err.without_url()))?;
        let mut ids: Vec<TenantId> = serde_json::from_slice(&body)
            .map_err(|err| DirectoryError::InvalidBody(Box::new(err)))?;

        let received = ids.len();
        let mut seen = HashSet::with_capacity(received);
        ids.retain(|id| seen.insert(id.clone()));
        if ids.len() != received {
            debug!(
                received,
                unique = ids.len(),
                "dropped duplicate tenant ids"
            );
        }

        Ok(ids)
    }
}
