//! CLI bootstrap: the composition root.
//!
//! The only place where the process engine, the admission gate and the
//! chat service are wired together.

use std::sync::Arc;

use rkserve_core::{AdmissionGate, ChatService, PromptRenderer, validate_settings};
use rkserve_proxy::{ProxyState, ServedModel};
use rkserve_runtime::{ProcessEngine, ProcessEngineConfig};
use tracing::info;

use crate::error::CliError;
use crate::parser::Cli;

/// Everything `main` needs to start serving.
#[derive(Debug)]
pub struct ServerContext {
    /// `host:port` to bind.
    pub bind_addr: String,
    pub state: ProxyState,
}

/// Validate arguments and compose the server state.
pub fn bootstrap(cli: &Cli) -> Result<ServerContext, CliError> {
    let settings = cli.settings();
    validate_settings(&settings)?;

    let engine_config = ProcessEngineConfig::new(&cli.runtime_bin, &cli.model_path)
        .with_target_platform(cli.target_platform)
        .with_lora_model_path(cli.lora_model_path.clone())
        .with_prompt_cache_path(cli.prompt_cache_path.clone())
        .with_extra_args(cli.runtime_args.clone())
        .with_generation_timeout(cli.generation_timeout());
    let engine = ProcessEngine::new(engine_config)?;

    let renderer = PromptRenderer::new(settings.chat_template(), settings.image_store());
    let service = ChatService::new(Arc::new(engine), renderer);

    let model_id = settings.effective_model_name(&cli.model_path);
    let model = ServedModel::from_file(model_id, &cli.model_path);
    info!(model = %model.id, size = model.size, "Model ready");

    let state = ProxyState::new(
        service,
        AdmissionGate::new(),
        model,
        settings.poll_policy(),
    );

    Ok(ServerContext {
        bind_addr: format!("{}:{}", settings.effective_host(), settings.effective_port()),
        state,
    })
}
