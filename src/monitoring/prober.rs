use std::time::{Duration, Instant};

use reqwest::Method;

use crate::db::models::Monitor;

/// The outcome of a single probe. Failures are data here, not errors.
#[derive(Debug, Clone, Default)]
pub struct ProbeOutcome {
    pub online: bool,
    pub status_code: Option<i32>,
    pub response_ms: i32,
    pub error: Option<String>,
}

/// Runs one HTTP probe against the monitor with the given request timeout
/// (the caller passes the monitor's effective interval, so a probe can never
/// outlast its own cadence).
pub async fn probe(monitor: &Monitor, timeout: Duration) -> ProbeOutcome {
    let started = Instant::now();

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => {
            return ProbeOutcome {
                online: false,
                status_code: None,
                response_ms: started.elapsed().as_millis() as i32,
                error: Some(e.to_string()),
            }
        }
    };

    let method = Method::from_bytes(monitor.method.as_bytes()).unwrap_or(Method::GET);
    let mut request = client.request(method, &monitor.url);
    for (key, value) in parse_headers(&monitor.headers) {
        request = request.header(key.as_str(), value.as_str());
    }
    if let Some(body) = monitor.body.as_deref().filter(|b| !b.is_empty()) {
        request = request.body(body.to_string());
    }

    let keyword = monitor.keyword.as_deref().unwrap_or("");
    let outcome = match request.send().await {
        Err(e) => ProbeOutcome {
            online: false,
            status_code: None,
            response_ms: 0,
            error: Some(e.to_string()),
        },
        Ok(response) => {
            let status = response.status().as_u16() as i32;
            let mut online =
                status_in_window(status, monitor.expected_status_min, monitor.expected_status_max);
            if !keyword.is_empty() {
                // A keyword miss overrides a status match; read errors count
                // as a miss too.
                let body = response.text().await.unwrap_or_default();
                online = keyword_matches(online, &body, keyword);
            }
            ProbeOutcome {
                online,
                status_code: Some(status),
                response_ms: 0,
                error: None,
            }
        }
    };

    ProbeOutcome {
        response_ms: started.elapsed().as_millis() as i32,
        ..outcome
    }
}

/// Lenient header extraction: only string values of a JSON object are used,
/// anything else probes with an empty header set. Validation is the API's
/// concern, not the prober's.
pub fn parse_headers(raw: &serde_json::Value) -> Vec<(String, String)> {
    match raw.as_object() {
        Some(map) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        None => Vec::new(),
    }
}

pub fn status_in_window(status: i32, min: i32, max: i32) -> bool {
    status >= min && status <= max
}

/// Applies the keyword rule on top of the status decision.
pub fn keyword_matches(status_online: bool, body: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return status_online;
    }
    status_online && body.contains(keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_window_is_inclusive() {
        assert!(status_in_window(200, 200, 299));
        assert!(status_in_window(299, 200, 299));
        assert!(!status_in_window(300, 200, 299));
        assert!(!status_in_window(199, 200, 299));
    }

    #[test]
    fn keyword_miss_overrides_status_match() {
        assert!(!keyword_matches(true, "<html>maintenance</html>", "Welcome"));
        assert!(keyword_matches(true, "<h1>Welcome back</h1>", "Welcome"));
    }

    #[test]
    fn keyword_never_rescues_a_status_failure() {
        assert!(!keyword_matches(false, "Welcome", "Welcome"));
    }

    #[test]
    fn headers_extracts_string_values_only() {
        let raw = serde_json::json!({
            "Authorization": "Bearer abc",
            "X-Retries": 3,
            "Accept": "application/json"
        });
        let mut headers = parse_headers(&raw);
        headers.sort();
        assert_eq!(
            headers,
            vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), "Bearer abc".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_headers_yield_empty_set() {
        assert!(parse_headers(&serde_json::json!("not an object")).is_empty());
        assert!(parse_headers(&serde_json::json!(null)).is_empty());
    }
}
