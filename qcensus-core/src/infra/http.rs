use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, InvalidHeaderValue,
};
use std::time::Duration;
use url::Url;

use crate::types::Secret;

/// Default timeout for the tenant directory and sink calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials sent as `Authorization: {token_type} {token}`.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub token: Secret,
    pub token_type: String,
}

impl AuthToken {
    pub fn new(token: Secret, token_type: impl Into<String>) -> Self {
        Self {
            token,
            token_type: token_type.into(),
        }
    }

    pub fn bearer(token: Secret) -> Self {
        Self::new(token, "bearer")
    }

    fn header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!(
            "{} {}",
            self.token_type,
            self.token.expose()
        ))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// Headers shared by the tenant directory and sink requests.
pub fn json_headers(
    auth: Option<&AuthToken>,
) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(auth) = auth {
        headers.insert(AUTHORIZATION, auth.header_value()?);
    }
    Ok(headers)
}

/// `url` as shown in error messages, with any userinfo removed.
pub fn redacted_url(url: &Url) -> String {
    let mut url = url.clone();
    // Both only fail on URLs that cannot carry userinfo.
    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.to_string()
}

/// Shared HTTP client. Timeouts are set per request.
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("qcensus/", env!("CARGO_PKG_VERSION")))
        .build()
}
