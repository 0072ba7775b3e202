use crate::config::TransportConfig;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::time::Duration;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Creates an HTTP client with retry middleware, configured from an
    /// explicit transport config (timeouts, TLS posture). The config is
    /// scoped to the returned client only.
    pub fn create_client(transport: &TransportConfig) -> ClientWithMiddleware {
        // Retry policy:
        // - Exponential backoff
        // - Max 3 retries
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        ClientBuilder::new(Self::base_client(transport))
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }

    /// Creates a plain client with default transport posture and no retry
    /// middleware. Used by the last-resort fetch strategy, which must not
    /// inherit any custom transport configuration.
    pub fn create_default_client() -> ClientWithMiddleware {
        ClientBuilder::new(Self::base_client(&TransportConfig::default())).build()
    }

    fn base_client(transport: &TransportConfig) -> Client {
        Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(Duration::from_secs(transport.timeout_secs))
            .connect_timeout(Duration::from_secs(transport.connect_timeout_secs))
            .danger_accept_invalid_certs(transport.accept_invalid_certs)
            .build()
            .unwrap_or_else(|_| Client::new())
    }
}

/// Helper function to build a URL with query parameters.
/// Since reqwest-middleware 0.5.0 doesn't expose the .query() method,
/// we build the query string manually and append it to the URL.
pub fn build_url_with_query<K, V>(base_url: &str, params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if params.is_empty() {
        return base_url.to_string();
    }

    let query_string: String = params
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding_encode(k.as_ref()),
                urlencoding_encode(v.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&");

    if base_url.contains('?') {
        format!("{}&{}", base_url, query_string)
    } else {
        format!("{}?{}", base_url, query_string)
    }
}

/// Simple URL encoding function for query parameter values.
fn urlencoding_encode(s: &str) -> String {
    let mut encoded = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => {
                encoded.push(c);
            }
            _ => {
                for byte in c.to_string().as_bytes() {
                    encoded.push_str(&format!("%{:02X}", byte));
                }
            }
        }
    }
    encoded
}
