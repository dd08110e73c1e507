use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
}

fn build_upstream_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let mut rel = path.trim_start_matches('/');
    if base.ends_with("/v1") && rel.starts_with("v1/") {
        rel = rel.trim_start_matches("v1/");
    }
    format!("{}/{}", base, rel)
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("chat-relay/0.1")
            // Avoid hanging forever on broken upstream TCP handshakes.
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { client }
    }

    pub async fn post_json(
        &self,
        base_url: &str,
        path: &str,
        payload: &Value,
        api_key: Option<&str>,
        timeout_seconds: u64,
    ) -> Result<(u16, Value), reqwest::Error> {
        let url = build_upstream_url(base_url, path);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(k) = api_key {
            if let Ok(hv) = HeaderValue::from_str(&format!("Bearer {}", k)) {
                headers.insert(AUTHORIZATION, hv);
            }
        }

        let r = self
            .client
            .post(url)
            .headers(headers)
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .json(payload)
            .send()
            .await?;

        let status = r.status().as_u16();
        let j = r.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_url_joins_without_duplicate_v1() {
        assert_eq!(
            build_upstream_url("https://ai.example.com", "/v1/chat/completions"),
            "https://ai.example.com/v1/chat/completions"
        );
        assert_eq!(
            build_upstream_url("https://ai.example.com/v1", "/v1/chat/completions"),
            "https://ai.example.com/v1/chat/completions"
        );
        assert_eq!(
            build_upstream_url("https://ai.example.com/v1/", "v1/chat/completions"),
            "https://ai.example.com/v1/chat/completions"
        );
    }
}
