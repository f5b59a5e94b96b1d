//! Shared plumbing for the blocking HTTP clients of remote services

use crate::error::{RaglineError, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::time::Duration;

/// Reads an API key from the environment variable named in the configuration
pub fn api_key_from_env(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        Ok(_) => Err(RaglineError::Config(format!(
            "Environment variable {} is empty",
            env_var
        ))),
        Err(_) => Err(RaglineError::Config(format!(
            "Environment variable {} is not set",
            env_var
        ))),
    }
}

/// Builds a JSON client that sends `headers` on every request
pub fn json_client(
    headers: &[(HeaderName, &str)],
    timeout: Duration,
    service: &str,
) -> Result<Client> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| RaglineError::Config(format!("invalid {} header {}", service, name)))?;
        map.insert(name.clone(), value);
    }
    map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Client::builder()
        .timeout(timeout)
        .default_headers(map)
        .build()
        .map_err(|e| {
            RaglineError::Config(format!("failed to build {} HTTP client: {}", service, e))
        })
}

/// Status and body of a failed response, for error messages
pub fn failure_body(resp: Response) -> (u16, String) {
    let status = resp.status().as_u16();
    let body = resp
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    (status, body)
}

/// Joins a base URL and a path without doubling slashes
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            endpoint("https://api.openai.com/v1/", "/embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
        assert_eq!(endpoint("http://host", "query"), "http://host/query");
    }

    #[test]
    fn test_missing_api_key() {
        let result = api_key_from_env("RAGLINE_TEST_KEY_THAT_IS_NEVER_SET");
        assert!(matches!(result, Err(RaglineError::Config(_))));
    }
}
