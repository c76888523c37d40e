//! URL utilities for the remote store client

use url::Url;

/// Query parameters and credential slots that never reach the logs
const SENSITIVE_PARAMS: &[&str] = &["apikey", "api_key", "token", "access_token", "key"];

pub struct UrlUtils;

impl UrlUtils {
    /// Ensure the URL has an HTTP(S) scheme, defaulting to `http://`
    pub fn normalize_scheme(url: &str) -> String {
        let trimmed = url.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        }
    }

    /// Normalize the scheme and strip trailing slashes
    pub fn sanitize(url: &str) -> String {
        Self::normalize_scheme(url).trim_end_matches('/').to_string()
    }

    /// Mask user info and key-like query parameters for safe logging
    pub fn obfuscate_credentials(url: &str) -> String {
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_string();
        };

        if !parsed.username().is_empty() || parsed.password().is_some() {
            let _ = parsed.set_username("****");
            let _ = parsed.set_password(Some("****"));
        }

        if parsed.query().is_some() {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let masked = SENSITIVE_PARAMS
                        .iter()
                        .any(|p| k.eq_ignore_ascii_case(p));
                    let value = if masked { "****".to_string() } else { v.into_owned() };
                    (k.into_owned(), value)
                })
                .collect();
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
        }

        parsed.to_string()
    }
}
