use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::Message;
use crate::error::Error;
use crate::local_store::LocalStore;
use crate::store::ApiKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageStats {
    pub total_tokens: u64,
    pub today_tokens: u64,
    #[serde(default)]
    pub usage_by_model: BTreeMap<String, u64>,
}

/// Typed client for the relay's HTTP surface.
#[derive(Clone)]
pub struct ChatApi {
    base_url: String,
    client: reqwest::Client,
}

impl ChatApi {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("chat-relay-client/0.1")
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn send_message(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, Error> {
        let resp = self
            .client
            .post(self.url("/api/chat/completions"))
            .json(request)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.json::<Value>().await.unwrap_or(Value::Null);
            return Err(Error::Status { status, body });
        }
        Ok(resp.json::<ChatCompletionResponse>().await?)
    }

    pub async fn login_admin(&self, username: &str, password: &str) -> Result<bool, Error> {
        let resp = self
            .client
            .post(self.url("/api/admin/login"))
            .json(&serde_json::json!({"username": username, "password": password}))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    pub async fn token_usage(&self) -> Result<TokenUsageStats, Error> {
        let resp = self
            .client
            .get(self.url("/api/admin/token-usage"))
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.json::<Value>().await.unwrap_or(Value::Null);
            return Err(Error::Status { status, body });
        }
        Ok(resp.json::<TokenUsageStats>().await?)
    }

    pub async fn add_api_key(&self, key: &str) -> Result<ApiKey, Error> {
        let resp = self
            .client
            .post(self.url("/api/admin/api-keys"))
            .json(&serde_json::json!({"key": key}))
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.json::<Value>().await.unwrap_or(Value::Null);
            return Err(Error::Status { status, body });
        }
        Ok(resp.json::<ApiKey>().await?)
    }

    pub async fn api_keys(&self) -> Result<Vec<ApiKey>, Error> {
        let resp = self
            .client
            .get(self.url("/api/admin/api-keys"))
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.json::<Value>().await.unwrap_or(Value::Null);
            return Err(Error::Status { status, body });
        }
        Ok(resp.json::<Vec<ApiKey>>().await?)
    }
}

/// Full chat submission: persist the user turn, relay the whole history with
/// the stored settings, persist the assistant reply tagged with the model
/// that produced it.
pub async fn submit_message(
    store: &LocalStore,
    api: &ChatApi,
    conversation_id: &str,
    content: &str,
) -> Result<Message, Error> {
    store.add_message(conversation_id, Message::user(content));

    let Some(conversation) = store.get_conversation(conversation_id) else {
        return Err(Error::ConversationNotFound(conversation_id.to_string()));
    };

    let settings = store.settings();
    let messages = conversation
        .messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect();
    let request = ChatCompletionRequest {
        model: settings.model.clone(),
        messages,
        temperature: Some(settings.temperature),
        max_tokens: (settings.max_tokens > 0).then_some(settings.max_tokens),
    };

    let response = api.send_message(&request).await?;
    let content = response
        .choices
        .first()
        .map(|c| c.message.content.clone())
        .unwrap_or_default();
    let model = if response.model.is_empty() {
        settings.model
    } else {
        response.model.clone()
    };

    let reply = Message::assistant(&content, Some(model));
    store.add_message(conversation_id, reply.clone());
    Ok(reply)
}
