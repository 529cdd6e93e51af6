use abram_session::{ImageAttachment, ImageMediaType};
use futures::StreamExt;
use rig::OneOrMany;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::message::{ImageMediaType as RigImageMediaType, UserContent};
use rig::prelude::CompletionClient;
use rig::providers::{gemini, openai};
use rig::streaming::{StreamedAssistantContent, StreamingCompletionResponse};
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use crate::model::{DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL};
use crate::provider::{
    ChatRequest, CompletionsFailedSnafu, EmptyPromptSnafu, HttpClientSnafu, LlmProvider,
    MissingApiKeySnafu, OPENAI_PROVIDER_ID, ProviderConfig, ProviderError, ProviderResult,
    ProviderStreamHandle, ProviderWorker, StreamEventMapped, StreamEventPayload,
    make_event_stream,
};

/// Wire flavour spoken by a [`RigProviderAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigBackend {
    Gemini,
    OpenAi,
}

pub struct RigProviderAdapter {
    config: ProviderConfig,
    backend: RigBackend,
}

impl RigProviderAdapter {
    pub fn new(config: ProviderConfig, backend: RigBackend) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config, backend })
    }

    fn build_gemini_client(config: &ProviderConfig) -> ProviderResult<gemini::Client> {
        let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-gemini-client",
        })
    }

    fn build_openai_client(config: &ProviderConfig) -> ProviderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-openai-client",
        })
    }

    fn rig_media_type(media_type: ImageMediaType) -> RigImageMediaType {
        match media_type {
            ImageMediaType::Png => RigImageMediaType::PNG,
            ImageMediaType::Jpeg => RigImageMediaType::JPEG,
            ImageMediaType::Gif => RigImageMediaType::GIF,
            ImageMediaType::Webp => RigImageMediaType::WEBP,
            ImageMediaType::Heic => RigImageMediaType::HEIC,
            ImageMediaType::Heif => RigImageMediaType::HEIF,
        }
    }

    fn image_content(image: &ImageAttachment) -> UserContent {
        UserContent::image_base64(
            image.data.clone(),
            Some(Self::rig_media_type(image.media_type)),
            None,
        )
    }

    /// Folds text and image into one user turn. Blank text is left out.
    fn user_message(request: &ChatRequest) -> ProviderResult<RigMessage> {
        let mut parts = Vec::with_capacity(2);
        if !request.text.trim().is_empty() {
            parts.push(UserContent::text(request.text.clone()));
        }
        if let Some(image) = &request.image {
            parts.push(Self::image_content(image));
        }

        let content = OneOrMany::many(parts).map_err(|_| ProviderError::EmptyPrompt {
            stage: "build-user-message",
            ticket: request.ticket,
        })?;

        Ok(RigMessage::User { content })
    }

    async fn open_stream<M>(
        model: M,
        request: &ChatRequest,
    ) -> ProviderResult<StreamingCompletionResponse<M::StreamingResponse>>
    where
        M: CompletionModel,
    {
        let prompt = Self::user_message(request)?;
        let mut builder = model.completion_request(prompt);

        if let Some(preamble) = &request.preamble
            && !preamble.trim().is_empty()
        {
            builder = builder.preamble(preamble.clone());
        }

        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
        request: &ChatRequest,
        error: ProviderError,
    ) {
        let _ = event_tx.send(StreamEventMapped {
            ticket: request.ticket,
            payload: StreamEventPayload::Error(error.to_string()),
        });
    }

    fn map_stream_item<R>(
        request: &ChatRequest,
        item: StreamedAssistantContent<R>,
    ) -> Option<StreamEventMapped>
    where
        R: Clone + Unpin,
    {
        let payload = match item {
            StreamedAssistantContent::Text(text) => StreamEventPayload::Delta(text.text),
            StreamedAssistantContent::Reasoning(reasoning) => {
                // Rig can split reasoning into multiple fragments; flatten before forwarding.
                let text = reasoning.reasoning.join("");
                if text.is_empty() {
                    return None;
                }
                StreamEventPayload::ReasoningDelta(text)
            }
            StreamedAssistantContent::ReasoningDelta { reasoning, .. } => {
                if reasoning.is_empty() {
                    return None;
                }
                StreamEventPayload::ReasoningDelta(reasoning)
            }
            StreamedAssistantContent::ToolCall { .. }
            | StreamedAssistantContent::ToolCallDelta { .. }
            | StreamedAssistantContent::Final(_) => return None,
        };

        Some(StreamEventMapped {
            ticket: request.ticket,
            payload,
        })
    }

    async fn run_stream_worker<M>(
        model: M,
        request: ChatRequest,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) where
        M: CompletionModel,
    {
        let ticket = request.ticket;
        let mut stream = match Self::open_stream(model, &request).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    ticket = ticket.0,
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                Self::emit_error_event(&event_tx, &request, error);
                return;
            }
        };

        let mut cancelled = false;
        let mut stream_failed = false;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    tracing::debug!(ticket = ticket.0, "provider stream cancelled");
                    stream.cancel();
                    break;
                }
                next_item = stream.next() => {
                    match next_item {
                        Some(Ok(item)) => {
                            if let Some(mapped) = Self::map_stream_item(&request, item)
                                && event_tx.send(mapped).is_err()
                            {
                                return;
                            }
                        }
                        Some(Err(source)) => {
                            stream_failed = true;
                            tracing::warn!(
                                ticket = ticket.0,
                                error = %source,
                                "provider stream emitted an error chunk"
                            );
                            let error = ProviderError::CompletionsFailed {
                                stage: "stream-chunk",
                                source,
                            };
                            Self::emit_error_event(&event_tx, &request, error);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if !cancelled && !stream_failed {
            let _ = event_tx.send(StreamEventMapped {
                ticket,
                payload: StreamEventPayload::Done,
            });
        }
    }

    fn spawn_worker(
        &self,
        request: ChatRequest,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
        cancel_rx: oneshot::Receiver<()>,
    ) -> ProviderResult<ProviderWorker> {
        let worker: ProviderWorker = match self.backend {
            RigBackend::Gemini => {
                let client = Self::build_gemini_client(&self.config)?;
                let model = client.completion_model(request.model_id.clone());
                Box::pin(Self::run_stream_worker(model, request, event_tx, cancel_rx))
            }
            RigBackend::OpenAi => {
                let client = Self::build_openai_client(&self.config)?;
                let model = client.completion_model(request.model_id.clone());
                Box::pin(Self::run_stream_worker(model, request, event_tx, cancel_rx))
            }
        };

        Ok(worker)
    }
}

impl LlmProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        match self.backend {
            RigBackend::Gemini => "Rig Gemini",
            RigBackend::OpenAi => "Rig OpenAI",
        }
    }

    fn default_model(&self) -> &str {
        if let Some(model_id) = &self.config.model_id {
            return model_id;
        }

        match self.backend {
            RigBackend::Gemini => DEFAULT_GEMINI_MODEL,
            RigBackend::OpenAi => DEFAULT_OPENAI_MODEL,
        }
    }

    fn stream_chat(&self, request: ChatRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.is_empty(),
            EmptyPromptSnafu {
                stage: "stream-chat",
                ticket: request.ticket,
            }
        );

        tracing::debug!(
            ticket = request.ticket.0,
            provider_id = %self.config.provider_id,
            model_id = %request.model_id,
            has_image = request.image.is_some(),
            "opening provider stream"
        );

        let (event_tx, stream, cancel_rx) = make_event_stream(request.ticket);
        let worker = self.spawn_worker(request, event_tx, cancel_rx)?;

        Ok(ProviderStreamHandle { stream, worker })
    }
}

impl RigBackend {
    pub fn for_provider_id(provider_id: &str) -> Option<Self> {
        match provider_id.trim() {
            "gemini" | "google" => Some(Self::Gemini),
            "openai" | "rig-openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn canonical_id(self) -> &'static str {
        match self {
            Self::Gemini => crate::provider::GEMINI_PROVIDER_ID,
            Self::OpenAi => OPENAI_PROVIDER_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abram_session::RequestTicket;

    fn image() -> ImageAttachment {
        ImageAttachment::from_bytes("task.webp", ImageMediaType::Webp, b"RIFF").unwrap()
    }

    fn content_len(message: &RigMessage) -> usize {
        match message {
            RigMessage::User { content, .. } => content.len(),
            _ => 0,
        }
    }

    #[test]
    fn text_and_image_share_one_user_turn() {
        let request =
            ChatRequest::new(RequestTicket::new(1), "gemini-2.5-flash", "what is this?")
                .with_image(Some(image()));

        let message = RigProviderAdapter::user_message(&request).unwrap();
        assert_eq!(content_len(&message), 2);
    }

    #[test]
    fn blank_text_is_dropped_for_image_only_requests() {
        let request = ChatRequest::new(RequestTicket::new(2), "gemini-2.5-flash", "  ")
            .with_image(Some(image()));

        let message = RigProviderAdapter::user_message(&request).unwrap();
        assert_eq!(content_len(&message), 1);
    }

    #[test]
    fn empty_request_is_rejected_before_any_network_call() {
        let config = ProviderConfig::new("gemini", "key", "");
        let adapter = RigProviderAdapter::new(config, RigBackend::Gemini).unwrap();
        let request = ChatRequest::new(RequestTicket::new(3), "gemini-2.5-flash", "");

        assert!(matches!(
            adapter.stream_chat(request),
            Err(ProviderError::EmptyPrompt { .. })
        ));
    }

    #[test]
    fn adapter_requires_api_key() {
        let config = ProviderConfig::new("openai", "", "");
        assert!(matches!(
            RigProviderAdapter::new(config, RigBackend::OpenAi),
            Err(ProviderError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn backend_aliases_resolve_to_canonical_ids() {
        assert_eq!(RigBackend::for_provider_id("google"), Some(RigBackend::Gemini));
        assert_eq!(
            RigBackend::for_provider_id("rig-openai").map(RigBackend::canonical_id),
            Some("openai")
        );
        assert_eq!(RigBackend::for_provider_id("anthropic"), None);
    }
}
