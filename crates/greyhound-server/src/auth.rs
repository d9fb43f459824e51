//! Cached upstream authorization.
//!
//! When an `auth` block is configured, every resource access consults an
//! upstream endpoint keyed by an identifier derived from the request's
//! cookies and query parameters. Decisions are cached per (identifier,
//! resource) with separate TTLs for positive and negative answers; a coarse
//! map lock covers lookup-or-insert and a per-entry lock serialises the
//! upstream call so no two concurrent checks hit the upstream for the same
//! entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hyper::header::{HeaderMap, COOKIE, HOST};
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::HttpError;

/// TTL floor applied to both the positive and negative cache windows.
const MIN_TTL: Duration = Duration::from_secs(60);

/// Status recorded when the upstream cannot be reached at all.
const UPSTREAM_UNREACHABLE: u16 = 502;

/// Request-derived inputs to an authorization check.
#[derive(Debug, Clone, Default)]
pub struct AuthInput {
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
}

impl AuthInput {
    pub fn cookies(&self) -> HashMap<String, String> {
        parse_cookies(&self.headers)
    }
}

#[derive(Debug, Default)]
struct Entry {
    checked: Option<Instant>,
    status: u16,
}

impl Entry {
    fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn fresh(&self, good: Duration, bad: Duration) -> bool {
        match self.checked {
            None => false,
            Some(at) => at.elapsed() <= if self.ok() { good } else { bad },
        }
    }
}

type EntryMap = HashMap<(String, String), Arc<tokio::sync::Mutex<Entry>>>;

pub struct Auth {
    endpoint: String,
    cookies: Vec<String>,
    queries: Vec<String>,
    good: Duration,
    bad: Duration,
    client: reqwest::Client,
    map: Mutex<EntryMap>,
}

impl Auth {
    pub fn new(config: &AuthConfig) -> Auth {
        let minutes = |m: f64| Duration::from_secs_f64((m * 60.0).max(0.0)).max(MIN_TTL);
        Auth {
            endpoint: config.path.trim_end_matches('/').to_string(),
            cookies: config.cookies.to_vec(),
            queries: config.query_params.to_vec(),
            good: minutes(config.cache_minutes.good),
            bad: minutes(config.cache_minutes.bad),
            client: reqwest::Client::new(),
            map: Mutex::new(HashMap::new()),
        }
    }

    pub fn good_seconds(&self) -> u64 {
        self.good.as_secs()
    }

    pub fn bad_seconds(&self) -> u64 {
        self.bad.as_secs()
    }

    /// The cache identifier for a request: configured cookie values, then
    /// configured query-parameter values, each followed by `-`. Missing
    /// values contribute an empty segment.
    pub fn identifier(&self, input: &AuthInput) -> String {
        let cookies = input.cookies();
        let mut id = String::new();
        for name in &self.cookies {
            id.push_str(cookies.get(name).map_or("", String::as_str));
            id.push('-');
        }
        for name in &self.queries {
            let value = input
                .query
                .iter()
                .find(|(k, _)| k == name)
                .map_or("", |(_, v)| v.as_str());
            id.push_str(value);
            id.push('-');
        }
        id
    }

    /// Authorize `resource` for the request, consulting the upstream when
    /// the cached entry is stale. Returns the upstream's last status code.
    pub async fn check(&self, resource: &str, input: &AuthInput) -> Result<u16, HttpError> {
        let id = self.identifier(input);

        let entry = {
            let mut map = self
                .map
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.entry((id.clone(), resource.to_string()))
                .or_default()
                .clone()
        };

        let mut entry = entry.lock().await;
        if !entry.fresh(self.good, self.bad) {
            info!(id = %id, resource = %resource, "refreshing authorization");
            entry.status = self.fetch(resource, input).await;
            entry.checked = Some(Instant::now());
        }
        Ok(entry.status)
    }

    async fn fetch(&self, resource: &str, input: &AuthInput) -> u16 {
        let url = format!("{}/{resource}", self.endpoint);

        let mut headers = input.headers.clone();
        headers.remove(HOST);

        let request = self
            .client
            .get(&url)
            .headers(headers)
            .query(&input.query);

        match request.send().await {
            Ok(response) => response.status().as_u16(),
            Err(e) => {
                warn!(url = %url, error = %e, "authorization upstream unreachable");
                UPSTREAM_UNREACHABLE
            }
        }
    }
}

/// Split a `Cookie` header into name/value pairs.
pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    let Some(raw) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) else {
        return cookies;
    };
    for part in raw.split(';') {
        match part.split_once('=') {
            Some((name, value)) => {
                cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
            None => {
                cookies.insert(String::new(), part.trim().to_string());
            }
        }
    }
    cookies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheMinutes, StringList};
    use hyper::header::HeaderValue;

    fn config() -> AuthConfig {
        AuthConfig {
            path: "http://localhost:9999/verify".to_string(),
            cookies: StringList::from(vec!["session".to_string(), "tenant".to_string()]),
            query_params: StringList::from(vec!["token".to_string()]),
            cache_minutes: CacheMinutes { good: 5.0, bad: 1.0 },
        }
    }

    fn input(cookie: Option<&str>, query: &[(&str, &str)]) -> AuthInput {
        let mut headers = HeaderMap::new();
        if let Some(c) = cookie {
            headers.insert(COOKIE, HeaderValue::from_str(c).unwrap());
        }
        AuthInput {
            headers,
            query: query
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("session=abc; tenant = acme ; bare"),
        );
        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.get("session"), Some(&"abc".to_string()));
        assert_eq!(cookies.get("tenant"), Some(&"acme".to_string()));
        assert_eq!(cookies.get(""), Some(&"bare".to_string()));
    }

    #[test]
    fn test_identifier_composition() {
        let auth = Auth::new(&config());
        let id = auth.identifier(&input(
            Some("session=abc; tenant=acme"),
            &[("token", "t0"), ("other", "x")],
        ));
        assert_eq!(id, "abc-acme-t0-");
    }

    #[test]
    fn test_identifier_missing_segments() {
        let auth = Auth::new(&config());
        let id = auth.identifier(&input(None, &[]));
        assert_eq!(id, "---");
    }

    #[test]
    fn test_ttl_floor() {
        let auth = Auth::new(&AuthConfig {
            cache_minutes: CacheMinutes { good: 0.1, bad: 0.0 },
            ..config()
        });
        assert_eq!(auth.good_seconds(), 60);
        assert_eq!(auth.bad_seconds(), 60);
    }

    #[test]
    fn test_entry_freshness_uses_status_family() {
        let good = Duration::from_secs(300);
        let bad = Duration::from_secs(60);

        let ok = Entry { checked: Some(Instant::now()), status: 204 };
        assert!(ok.ok());
        assert!(ok.fresh(good, bad));

        let denied = Entry { checked: Some(Instant::now()), status: 403 };
        assert!(!denied.ok());
        assert!(denied.fresh(good, bad));

        let never = Entry::default();
        assert!(!never.fresh(good, bad));
    }
}
