use reqwest::Client;
use std::time::Duration;

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Creates a plain HTTP client bounded by `timeout` end to end.
    ///
    /// No retry middleware: a failed delivery is left for the next export
    /// cadence.
    pub fn create_client(timeout: Duration) -> Result<Client, reqwest::Error> {
        Client::builder()
            .pool_max_idle_per_host(2)
            .timeout(timeout)
            .connect_timeout(timeout.min(MAX_CONNECT_TIMEOUT))
            .user_agent(concat!("kpi-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_with_short_timeout() {
        assert!(HttpClientFactory::create_client(Duration::from_millis(500)).is_ok());
    }
}
