use crate::errors::{Result, ScrapeError};
use headless_chrome::protocol::cdp::Network::Cookie;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; swatchgrab/0.1)";

/// Plain HTTP session carrying the browser's authentication cookies, used
/// for probing and bulk downloads without re-driving the browser. Owned by
/// exactly one run.
pub struct HttpSession {
    client: reqwest::Client,
}

pub struct DownloadOutcome {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl std::fmt::Debug for DownloadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOutcome")
            .field("bytes_len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl HttpSession {
    /// Builds a reqwest client whose cookie jar mirrors the browser's
    /// cookies. The Referer is pinned to the product URL since the image
    /// host rejects hot-linked requests without it.
    pub fn from_browser_cookies(
        cookies: &[Cookie],
        product_url: &str,
        user_agent: Option<&str>,
    ) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        for c in cookies {
            match jar_entry(&c.name, &c.value, &c.domain, &c.path) {
                Some((url, cookie_str)) => jar.add_cookie_str(&cookie_str, &url),
                None => debug!(
                    "skipping cookie '{}' with unusable domain '{}'",
                    c.name, c.domain
                ),
            }
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            REFERER,
            HeaderValue::from_str(product_url)
                .map_err(|e| ScrapeError::AnyhowError(e.to_string()))?,
        );

        let client = reqwest::Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .default_headers(headers)
            .cookie_provider(jar)
            .timeout(Duration::from_secs(40))
            .build()?;

        Ok(Self { client })
    }

    /// Lightweight existence check. Network errors count as "not there".
    pub async fn head_exists(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                false
            }
        }
    }

    /// GET-based existence check for servers that reject HEAD. The body is
    /// never read; dropping the response abandons the stream.
    pub async fn get_exists(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                debug!("GET probe {} failed: {}", url, e);
                false
            }
        }
    }

    /// Full download. Non-success status and empty bodies are per-item
    /// failures, reported as plain reason strings.
    pub async fn download(&self, url: &str) -> std::result::Result<DownloadOutcome, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| error_kind(&e))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase());

        let bytes = resp.bytes().await.map_err(|e| error_kind(&e))?;
        if bytes.is_empty() {
            return Err(format!("HTTP {} (empty body)", status.as_u16()));
        }

        Ok(DownloadOutcome {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Jar entry for one browser cookie: the scoping URL plus the Set-Cookie
/// style string. None when the cookie's domain cannot scope anything; a
/// stray malformed cookie must not take the whole session down.
fn jar_entry(name: &str, value: &str, domain: &str, path: &str) -> Option<(Url, String)> {
    let host = domain.trim_start_matches('.');
    if host.is_empty() {
        return None;
    }
    let url: Url = format!("https://{}/", host).parse().ok()?;
    Some((
        url,
        format!("{}={}; Domain={}; Path={}", name, value, domain, path),
    ))
}

fn error_kind(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Timeout".to_string()
    } else if e.is_connect() {
        "ConnectError".to_string()
    } else {
        "RequestError".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jar_entry_scopes_by_host_without_leading_dot() {
        let (url, cookie) = jar_entry("sid", "abc", ".shop.example", "/").unwrap();
        assert_eq!(url.as_str(), "https://shop.example/");
        assert_eq!(cookie, "sid=abc; Domain=.shop.example; Path=/");
    }

    #[test]
    fn cookie_without_domain_is_skipped() {
        assert!(jar_entry("sid", "abc", "", "/").is_none());
        assert!(jar_entry("sid", "abc", ".", "/").is_none());
    }

    #[test]
    fn cookie_with_unparseable_domain_is_skipped() {
        assert!(jar_entry("sid", "abc", "not a host", "/").is_none());
    }
}
