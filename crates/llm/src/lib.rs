#![deny(unsafe_code)]

use std::sync::Arc;

mod gateway;
mod model;
mod provider;
mod rig_adapter;

pub use gateway::{GenerationOptions, ProviderGateway, collect_reply};
pub use model::{DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL, default_model_for};
pub use provider::{
    ChatRequest, GEMINI_PROVIDER_ID, LlmProvider, OPENAI_PROVIDER_ID, ProviderConfig,
    ProviderError, ProviderEventStream, ProviderResult, ProviderStreamHandle, ProviderWorker,
    StreamEventMapped, StreamEventPayload,
};
pub use rig_adapter::{RigBackend, RigProviderAdapter};

/// Builds the provider named by `config.provider_id`. A blank id selects Gemini.
pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = GEMINI_PROVIDER_ID.to_string();
    }

    match RigBackend::for_provider_id(&config.provider_id) {
        Some(backend) => {
            config.provider_id = backend.canonical_id().to_string();
            Ok(Arc::new(RigProviderAdapter::new(config, backend)?))
        }
        None => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}
