use std::sync::Arc;

use tokio::{net::TcpListener, task};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_stream_service::{AppConfig, EngineSlot, InferenceEngine, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?);
    log_device(&config);

    let slot = EngineSlot::default();
    let router = build_router(config.clone(), slot.clone());

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "SSE chat server listening, model still loading");
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    tracing::info!(model_dir = %config.model_dir.display(), "loading model artifacts");
    let load_config = config.clone();
    let engine = task::spawn_blocking(move || load_engine(&load_config)).await??;
    slot.install(engine)?;
    tracing::info!("model and tokenizer are ready");

    server.await??;

    Ok(())
}

#[cfg(feature = "tch-backend")]
fn load_engine(config: &AppConfig) -> anyhow::Result<Arc<dyn InferenceEngine>> {
    let engine = chat_stream_service::engine::torch::TorchEngine::load(config)?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "tch-backend"))]
fn load_engine(_config: &AppConfig) -> anyhow::Result<Arc<dyn InferenceEngine>> {
    anyhow::bail!("built without an inference backend; enable the `tch-backend` feature")
}

#[cfg(feature = "tch-backend")]
fn log_device(config: &AppConfig) {
    tracing::info!(
        device = ?config.device,
        cuda_available = tch::Cuda::is_available(),
        cuda_devices = tch::Cuda::device_count(),
        "device in use"
    );
}

#[cfg(not(feature = "tch-backend"))]
fn log_device(_config: &AppConfig) {}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,axum::rejection=trace".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
