//! Shared blocking HTTP client construction.

use std::time::Duration;

use reqwest::blocking::Client;

const USER_AGENT: &str = concat!("hookchat/", env!("CARGO_PKG_VERSION"));

/// Blocking client with a whole-request timeout.
///
/// # Errors
/// Returns error if the TLS backend cannot be initialised.
pub fn blocking_client(timeout_secs: u64) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_timeout(Duration::from_secs(timeout_secs.clamp(1, 10)))
        .user_agent(USER_AGENT)
        .build()
}

/// First line of an error body, capped for log and status output.
pub fn summarize_body(body: &str) -> String {
    let line = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let mut summary: String = line.chars().take(160).collect();
    if line.chars().count() > 160 {
        summary.push_str("...");
    }
    summary
}

#[cfg(test)]
pub mod test_support {
    /// Runs blocking client code off the async test runtime.
    pub async fn blocking<T, F>(f: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f).await.unwrap()
    }
}
