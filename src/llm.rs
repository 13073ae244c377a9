//! OpenAI-compatible chat-completion client.
//!
//! [`OpenAIChatModel`] posts to `{base_url}/chat/completions` and returns
//! the content of the first choice. Any server exposing the same API shape
//! can be targeted by changing `[llm] base_url`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use policy_assistant_core::chat::{ChatMessage, ChatModel};

use crate::config::LlmConfig;

pub struct OpenAIChatModel {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl OpenAIChatModel {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

fn request_body(model: &str, system: &str, messages: &[ChatMessage]) -> Value {
    let mut all = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        all.push(json!({ "role": "system", "content": system }));
    }
    all.extend(
        messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content })),
    );
    json!({
        "model": model,
        "messages": all,
        "temperature": 0,
    })
}

fn first_choice_content(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid chat completion response: missing choices[0].message.content"))
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body(&self.model, system, messages))
            .send()
            .await
            .context("chat completion request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            bail!("chat completion API error {}: {}", status, body_text);
        }

        let json: Value = resp
            .json()
            .await
            .context("chat completion returned invalid JSON")?;
        first_choice_content(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_puts_system_first() {
        let body = request_body(
            "gpt-4o-mini",
            "be brief",
            &[ChatMessage::user("hi"), ChatMessage::assistant("hello")],
        );
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hi");
        assert_eq!(messages[2]["role"], "assistant");
    }

    #[test]
    fn test_empty_system_is_omitted() {
        let body = request_body("m", "", &[ChatMessage::user("q")]);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_first_choice_content() {
        let json = json!({ "choices": [{ "message": { "role": "assistant", "content": "Answer" } }] });
        assert_eq!(first_choice_content(&json).unwrap(), "Answer");
        assert!(first_choice_content(&json!({ "choices": [] })).is_err());
    }
}
