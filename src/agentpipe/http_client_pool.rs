//! Shared `reqwest::Client` instances keyed by base URL.
//!
//! Every agent of every stage talks to the same endpoint, so one pooled client
//! per base URL keeps TLS sessions and TCP connections warm across turns.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Whole-request timeout applied to pooled clients.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Get or create the shared HTTP client for `base_url`.
///
/// Building a client only fails when the TLS backend cannot initialise; the
/// error is returned instead of panicking.
pub fn get_http_client(base_url: &str) -> Result<reqwest::Client, reqwest::Error> {
    // A poisoned lock only means another thread panicked mid-insert; the map is still usable.
    let mut pool = HTTP_CLIENT_POOL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(client) = pool.get(base_url) {
        return Ok(client.clone());
    }

    let client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
        .build()?;

    log::debug!("get_http_client(...): new pooled client for {}", base_url);
    pool.insert(base_url.to_string(), client.clone());
    Ok(client)
}
