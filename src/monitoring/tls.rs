use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::net::TcpStream;
use tracing::debug;
use x509_parser::prelude::FromDer;
use x509_parser::certificate::X509Certificate;

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Facts extracted from the leaf certificate of an https endpoint.
#[derive(Debug, Clone)]
pub struct TlsFact {
    pub expires_at: DateTime<Utc>,
    pub issuer: String,
    pub days_left: i32,
}

/// Dials `host:443` and reads the leaf certificate. Verification is
/// intentionally disabled: expiry is interesting even on mis-issued chains.
/// Returns `None` on any failure; an unreachable or non-TLS endpoint is not
/// an error worth surfacing.
pub async fn inspect(url: &str) -> Option<TlsFact> {
    let host = host_from_url(url)?;

    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .ok()?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let tcp = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect((host.as_str(), 443)))
        .await
        .ok()?
        .ok()?;
    let stream = tokio::time::timeout(DIAL_TIMEOUT, connector.connect(&host, tcp))
        .await
        .ok()?
        .ok()?;

    let cert = stream.get_ref().peer_certificate().ok()??;
    let der = cert.to_der().ok()?;
    let fact = fact_from_der(&der, Utc::now());
    if fact.is_none() {
        debug!(host = %host, "TLS检测未能解析证书");
    }
    fact
}

/// Parses the DER leaf and computes days-left relative to `now`.
pub fn fact_from_der(der: &[u8], now: DateTime<Utc>) -> Option<TlsFact> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    let expires_at = Utc
        .timestamp_opt(cert.validity().not_after.timestamp(), 0)
        .single()?;
    let issuer = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();
    Some(TlsFact {
        expires_at,
        issuer,
        days_left: days_left(expires_at, now),
    })
}

/// Whole days until expiry, truncated toward zero (an expired certificate
/// goes negative).
pub fn days_left(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    ((expires_at - now).num_hours() / 24) as i32
}

/// Derives the dial host from a monitor URL: scheme, path and explicit port
/// are stripped.
pub fn host_from_url(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let host = rest.split('/').next().unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn host_strips_scheme_path_and_port() {
        assert_eq!(
            host_from_url("https://example.com/health?x=1"),
            Some("example.com".to_string())
        );
        assert_eq!(
            host_from_url("https://example.com:8443/api"),
            Some("example.com".to_string())
        );
        assert_eq!(
            host_from_url("http://plain.example.com"),
            Some("plain.example.com".to_string())
        );
        assert_eq!(host_from_url("https://"), None);
    }

    #[test]
    fn days_left_truncates_toward_zero() {
        let now = Utc::now();
        assert_eq!(days_left(now + ChronoDuration::hours(47), now), 1);
        assert_eq!(days_left(now + ChronoDuration::hours(23), now), 0);
        assert_eq!(days_left(now - ChronoDuration::hours(30), now), -1);
    }
}
