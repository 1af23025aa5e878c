//! Domain values shared by discovery, aggregation and reporting.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Queue names returned for one vhost, in the order the broker listed them.
///
/// An empty list is a successful result: the vhost exists and has no queues.
pub type QueueList = Vec<String>;

/// Opaque tenant identifier supplied by the tenant directory.
///
/// The directory may hand out numbers or strings; both are kept as their
/// textual form so `1` renders as `project_1_vhost`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for TenantId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTenantId {
    Number(serde_json::Number),
    Text(String),
}

impl<'de> Deserialize<'de> for TenantId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawTenantId::deserialize(deserializer)? {
            RawTenantId::Number(number) => Self(number.to_string()),
            RawTenantId::Text(text) => Self(text),
        })
    }
}

/// Name of a broker virtual host.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VhostName(String);

impl VhostName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VhostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VhostName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VhostName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("vhost template is empty")]
    Empty,
    #[error(
        "vhost template `{0}` has no `{{project_id}}` or `{{tenant_id}}` placeholder"
    )]
    MissingPlaceholder(String),
}

/// Template deriving a tenant's vhost name, e.g. `project_{project_id}_vhost`.
///
/// Both `{project_id}` and `{tenant_id}` are accepted as the placeholder and
/// every occurrence is substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VhostTemplate(String);

impl VhostTemplate {
    pub const PLACEHOLDERS: [&'static str; 2] = ["{project_id}", "{tenant_id}"];

    pub fn parse(raw: impl Into<String>) -> Result<Self, TemplateError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(TemplateError::Empty);
        }
        if !Self::PLACEHOLDERS.iter().any(|p| raw.contains(p)) {
            return Err(TemplateError::MissingPlaceholder(raw));
        }
        Ok(Self(raw))
    }

    pub fn render(&self, tenant: &TenantId) -> VhostName {
        let name = Self::PLACEHOLDERS
            .iter()
            .fold(self.0.clone(), |acc, placeholder| {
                acc.replace(placeholder, tenant.as_str())
            });
        VhostName(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VhostTemplate {
    fn default() -> Self {
        Self("project_{project_id}_vhost".to_string())
    }
}

/// Mapping of vhost to its queue names, reported to the sink as
/// `{ "vhost": ["queue", ...] }`.
///
/// Only vhosts whose listing succeeded are present; absence of a vhost is how
/// a failed or skipped query is signalled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateResult(IndexMap<VhostName, QueueList>);

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a listing. A repeated vhost keeps its original position and
    /// takes the newer queue list.
    pub fn insert(&mut self, vhost: VhostName, queues: QueueList) {
        self.0.insert(vhost, queues);
    }

    pub fn get(&self, vhost: &VhostName) -> Option<&QueueList> {
        self.0.get(vhost)
    }

    pub fn contains(&self, vhost: &VhostName) -> bool {
        self.0.contains_key(vhost)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn vhosts(&self) -> impl Iterator<Item = &VhostName> {
        self.0.keys()
    }
}

/// Credential material that is wiped on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Secret").field(&"<redacted>").finish()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}
