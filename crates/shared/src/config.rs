use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::PipelineError;
use crate::models::Credentials;

const DEFAULT_OLLAMA_MODEL: &str = "llama3";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Which language-model backend extracts the stories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Locally hosted Ollama server
    Ollama,
    /// Hosted OpenAI API
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" | "local" => Ok(LlmProvider::Ollama),
            "openai" | "hosted" => Ok(LlmProvider::OpenAi),
            other => anyhow::bail!("Unknown LLM provider: '{}'. Use 'ollama' or 'openai'", other),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Ollama => write!(f, "ollama"),
            LlmProvider::OpenAi => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub ollama_model: String,
    pub ollama_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
}

impl LlmConfig {
    /// Copy of this config with the provider switched and, if given, its model replaced.
    pub fn with_override(&self, provider: LlmProvider, model: Option<String>) -> Self {
        let mut llm = self.clone();
        llm.provider = provider;
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            match provider {
                LlmProvider::Ollama => llm.ollama_model = model,
                LlmProvider::OpenAi => llm.openai_model = model,
            }
        }
        llm
    }

    /// Model name for the currently selected provider
    pub fn model(&self) -> &str {
        match self.provider {
            LlmProvider::Ollama => &self.ollama_model,
            LlmProvider::OpenAi => &self.openai_model,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jira_url: Url,
    pub jira_email: String,
    pub jira_api_token: String,
    pub confluence_page_url: Option<String>,
    pub llm: LlmConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Try to load .env from multiple locations
        Self::try_load_dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` passes the process environment.
    ///
    /// Every failure surfaces as [`PipelineError::Config`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::read_lookup(lookup).map_err(|e| {
            anyhow::Error::from(PipelineError::Config(format!("{:#}", e)))
        })
    }

    fn read_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jira_url = get("JIRA_URL").context(
            "JIRA_URL not found.\n\n\
            To fix this, create ~/.config/meeting-stories/.env with:\n  \
            JIRA_URL=https://your-site.atlassian.net\n  \
            JIRA_EMAIL=you@example.com\n  \
            JIRA_API_TOKEN=your_token_here",
        )?;
        let jira_url = Url::parse(jira_url.trim())
            .with_context(|| format!("JIRA_URL is not a valid URL: {}", jira_url))?;
        if jira_url.host_str().is_none() {
            anyhow::bail!("JIRA_URL has no host: {}", jira_url);
        }

        let jira_email = get("JIRA_EMAIL").context(
            "JIRA_EMAIL not found. Set it as an environment variable or in ~/.config/meeting-stories/.env",
        )?;

        let jira_api_token = get("JIRA_API_TOKEN").context(
            "JIRA_API_TOKEN not found.\n\n\
            Create an API token at: https://id.atlassian.com/manage-profile/security/api-tokens",
        )?;

        let provider = match get("LLM_PROVIDER") {
            Some(value) => value.parse()?,
            None => LlmProvider::OpenAi,
        };

        let llm = LlmConfig {
            provider,
            ollama_model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            ollama_base_url: get("OLLAMA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        };

        Ok(Self {
            jira_url,
            jira_email,
            jira_api_token,
            confluence_page_url: get("CONFLUENCE_PAGE_URL"),
            llm,
        })
    }

    /// Basic-auth pair used for Jira and for authenticated wiki fetches
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.jira_email.clone(),
            token: self.jira_api_token.clone(),
        }
    }

    /// Host name of the tracker; credentials are only ever sent here.
    pub fn tracker_host(&self) -> &str {
        self.jira_url.host_str().unwrap_or_default()
    }

    fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/meeting-stories/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("meeting-stories").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }

        // If none found, that's okay - environment variables might be set system-wide
    }
}
