//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client with a caller-chosen request timeout.
///
/// Everything else is the standard outbound shape: 30s connect timeout,
/// rustls TLS, `quarry/{version}` user-agent, redirect limit 10.
#[must_use]
pub fn client(request_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("default HTTP client construction must not fail")
}

/// Client with the standard 60s request timeout.
#[must_use]
pub fn default_client() -> reqwest::Client {
    client(DEFAULT_REQUEST_TIMEOUT)
}
