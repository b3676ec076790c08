//! HTTP client pool for maintaining persistent connections per base URL.
//!
//! One `reqwest::Client` is kept per (base URL, request timeout) pair so connections, DNS
//! lookups and TLS sessions are reused across every agent and selector talking to the same
//! endpoint. Clients are configured for persistent connections:
//! - `pool_idle_timeout`: idle connections kept alive for 90 seconds
//! - `pool_max_idle_per_host`: up to 10 idle connections per host
//! - `tcp_keepalive`: keepalive packets every 60 seconds

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Global HTTP client pool, lazily initialized on first access.
static HTTP_CLIENT_POOL: Lazy<Mutex<HashMap<(String, Duration), reqwest::Client>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Get or create a shared HTTP client for the given base URL.
///
/// `request_timeout` bounds every request made through the returned client; it is the hard
/// deadline for a single completion call.
pub fn get_http_client(base_url: &str, request_timeout: Duration) -> reqwest::Client {
    let key = (base_url.to_string(), request_timeout);
    let mut pool = HTTP_CLIENT_POOL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(client) = pool.get(&key) {
        return client.clone();
    }

    let client = match reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(request_timeout)
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            log::warn!(
                "groupchat::clients::http_pool: falling back to default client for {}: {}",
                base_url,
                err
            );
            reqwest::Client::new()
        }
    };

    pool.insert(key, client.clone());
    client
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reuses_clients_per_endpoint() {
        let timeout = Duration::from_secs(42);
        let _a = get_http_client("https://pool-test.invalid/v1", timeout);
        let _b = get_http_client("https://pool-test.invalid/v1", timeout);
        let pool = HTTP_CLIENT_POOL.lock().unwrap();
        let matching = pool
            .keys()
            .filter(|(url, t)| url == "https://pool-test.invalid/v1" && *t == timeout)
            .count();
        assert_eq!(matching, 1);
    }
}
