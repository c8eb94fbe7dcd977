//! marginalia server binary.
//!
//! Hosts the realtime collaboration channel and the agent-facing HTTP API in
//! one process. Configured entirely through `MARGINALIA_*` environment
//! variables; see `config.rs`.

use std::process::ExitCode;
use std::sync::Arc;

use marginalia_agent::llm::OpenAiCompatProvider;
use marginalia_agent::store::{MemoryStore, RestStore};
use marginalia_agent::{summarizer, AgentContext, KnowledgeClient, LlmGateway};
use marginalia_doc::{DocHost, MemorySnapshotStore, SnapshotStore};
use marginalia_server::config::Config;
use marginalia_server::{app, AppState};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!("server error: {e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(config: Config) -> anyhow::Result<()> {
    let (store, snapshots): (Arc<dyn marginalia_agent::DataStore>, Arc<dyn SnapshotStore>) =
        match &config.store_url {
            Some(url) => {
                let rest = Arc::new(RestStore::new(url, &config.store_key));
                (rest.clone(), rest)
            }
            None => {
                tracing::warn!("MARGINALIA_STORE_URL unset, using in-memory store");
                (Arc::new(MemoryStore::new()), Arc::new(MemorySnapshotStore::new()))
            }
        };

    let provider = Arc::new(OpenAiCompatProvider::new(
        "deepseek",
        &config.llm_base_url,
        &config.llm_api_key,
        &config.llm_model,
    ));
    let llm = Arc::new(LlmGateway::new(provider));
    let knowledge = Arc::new(KnowledgeClient::new(&config.knowledge_url));
    let docs = Arc::new(DocHost::new(snapshots));

    let ctx = Arc::new(AgentContext::new(docs, store, llm, knowledge));
    let state = Arc::new(AppState::new(ctx.clone(), &config.internal_secret));

    let shutdown = CancellationToken::new();
    let summary_task = summarizer::spawn(ctx.clone(), shutdown.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            serve_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = summary_task.await;
    ctx.docs.persist_all().await;
    tracing::info!("all documents persisted, bye");
    Ok(())
}
