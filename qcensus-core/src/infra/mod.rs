//! HTTP adapters for the broker, tenant directory and reporting sink ports.

pub mod directory;
pub mod http;
pub mod management;
pub mod sink;

pub use directory::HttpTenantDirectory;
pub use http::{AuthToken, DEFAULT_REQUEST_TIMEOUT, build_http_client};
pub use management::{
    ConnectionParams, DEFAULT_MANAGEMENT_PORT, ManagementClient,
};
pub use sink::HttpReportingSink;
