//! Runtime configuration passed to the client and reconciler at construction.

use std::time::Duration;

/// Fixed delay before a failed pass is retried.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct Config {
    /// NetBox base URL (e.g., https://netbox.example.com)
    pub netbox_url: String,
    /// NetBox API token
    pub netbox_token: String,
    pub retry_interval: Duration,
    /// Per-request time budget for NetBox calls.
    pub request_timeout: Duration,
}

impl Config {
    pub fn new(netbox_url: impl Into<String>, netbox_token: impl Into<String>) -> Self {
        Self {
            netbox_url: netbox_url.into(),
            netbox_token: netbox_token.into(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}
