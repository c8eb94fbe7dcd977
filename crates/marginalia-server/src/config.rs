//! Environment-driven configuration.
//!
//! All knobs come from `MARGINALIA_*` variables. Development deployments get
//! permissive defaults; a production deployment (`MARGINALIA_ENV=production`)
//! refuses to start without its credentials.

use std::env;
use std::net::SocketAddr;

use anyhow::{bail, Context};

const DEFAULT_BIND: &str = "127.0.0.1:8787";
const DEFAULT_LLM_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_LLM_MODEL: &str = "deepseek-chat";
const DEFAULT_KNOWLEDGE_URL: &str = "http://127.0.0.1:8000";
const DEV_INTERNAL_SECRET: &str = "dev-internal-secret";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub production: bool,
    /// Shared secret for the server-to-server HTTP API.
    pub internal_secret: String,
    /// Transactional store endpoint; `None` means the in-memory store.
    pub store_url: Option<String>,
    pub store_key: String,
    pub knowledge_url: String,
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let production = var("MARGINALIA_ENV").as_deref() == Some("production");

        let bind_addr = var("MARGINALIA_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("MARGINALIA_BIND is not a valid socket address")?;

        let internal_secret = match var("MARGINALIA_INTERNAL_SECRET") {
            Some(secret) => secret,
            None if production => {
                bail!("MARGINALIA_INTERNAL_SECRET is required in production")
            }
            None => {
                tracing::warn!("MARGINALIA_INTERNAL_SECRET unset, using development secret");
                DEV_INTERNAL_SECRET.to_string()
            }
        };

        let store_url = var("MARGINALIA_STORE_URL");
        let store_key = var("MARGINALIA_STORE_KEY").unwrap_or_default();
        if production && (store_url.is_none() || store_key.is_empty()) {
            bail!("MARGINALIA_STORE_URL and MARGINALIA_STORE_KEY are required in production");
        }

        let llm_api_key = var("MARGINALIA_LLM_API_KEY").unwrap_or_default();
        if production && llm_api_key.is_empty() {
            bail!("MARGINALIA_LLM_API_KEY is required in production");
        }

        Ok(Self {
            bind_addr,
            production,
            internal_secret,
            store_url,
            store_key,
            knowledge_url: var("MARGINALIA_KNOWLEDGE_URL")
                .unwrap_or_else(|| DEFAULT_KNOWLEDGE_URL.to_string()),
            llm_base_url: var("MARGINALIA_LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_api_key,
            llm_model: var("MARGINALIA_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
        })
    }
}
