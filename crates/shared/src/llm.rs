use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{LlmConfig, LlmProvider};

/// What a backend hands back: a structured chat message or bare completion text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmReply {
    Message { content: String },
    Text(String),
}

impl LlmReply {
    pub fn into_text(self) -> String {
        match self {
            LlmReply::Message { content } => content,
            LlmReply::Text(text) => text,
        }
    }
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Human readable label, e.g. "openai (gpt-4o)"
    fn describe(&self) -> String;

    async fn invoke(&self, prompt: &str) -> Result<LlmReply>;
}

/// Build the backend named by `config.provider`.
pub fn create_backend(config: &LlmConfig) -> Result<Box<dyn LlmBackend>> {
    debug!(provider = %config.provider, model = %config.model(), "create_backend: called");
    match config.provider {
        LlmProvider::Ollama => Ok(Box::new(OllamaBackend::new(
            config.ollama_model.clone(),
            config.ollama_base_url.clone(),
        )?)),
        LlmProvider::OpenAi => Ok(Box::new(OpenAiBackend::new(
            config.openai_api_key.clone(),
            config.openai_model.clone(),
            config.openai_base_url.clone(),
        )?)),
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

pub struct OllamaBackend {
    client: Client,
    model: String,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(model: String, base_url: String) -> Result<Self> {
        // No timeout: local models can take minutes on long notes.
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn describe(&self) -> String {
        format!("ollama ({})", self.model)
    }

    async fn invoke(&self, prompt: &str) -> Result<LlmReply> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("Ollama API error {}: {}", status, error_text);
        }

        let ollama_response = response
            .json::<OllamaResponse>()
            .await
            .context("Failed to parse Ollama API response")?;

        Ok(LlmReply::Text(ollama_response.response))
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

pub struct OpenAiBackend {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(api_key: Option<String>, model: String, base_url: String) -> Result<Self> {
        if api_key.is_none() {
            warn!("OPENAI_API_KEY not found in config");
        }

        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn describe(&self) -> String {
        format!("openai ({})", self.model)
    }

    async fn invoke(&self, prompt: &str) -> Result<LlmReply> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("OpenAI API error {}: {}", status, error_text);
        }

        let chat_response = response
            .json::<ChatResponse>()
            .await
            .context("Failed to parse OpenAI API response")?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("OpenAI response contained no choices")?;

        Ok(LlmReply::Message { content })
    }
}
