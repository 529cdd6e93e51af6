use std::sync::Arc;

use abram_session::gateway::{BackendSnafu, EmptyReplySnafu, WorkerFailedSnafu};
use abram_session::{BoxFuture, Gateway, GatewayError, GatewayRequest, GatewayResult};
use snafu::ensure;

use crate::provider::{
    ChatRequest, LlmProvider, ProviderEventStream, ProviderStreamHandle, StreamEventPayload,
};

/// Sampling knobs applied to every request sent through a [`ProviderGateway`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

/// Session gateway backed by a streaming [`LlmProvider`].
///
/// The provider worker runs on the tokio runtime while the gateway drains its
/// events into one reply.
pub struct ProviderGateway {
    provider: Arc<dyn LlmProvider>,
    model_id: String,
    options: GenerationOptions,
}

impl ProviderGateway {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        let model_id = provider.default_model().to_string();
        Self {
            provider,
            model_id,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn chat_request(&self, request: GatewayRequest) -> ChatRequest {
        let mut chat = ChatRequest::from_gateway_request(request, self.model_id.clone());
        if let Some(temperature) = self.options.temperature {
            chat = chat.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.options.max_tokens {
            chat = chat.with_max_tokens(max_tokens);
        }
        chat
    }

    async fn generate_reply(&self, request: GatewayRequest) -> GatewayResult<String> {
        let ticket = request.ticket;
        let chat = self.chat_request(request);

        let ProviderStreamHandle { stream, worker } =
            self.provider
                .stream_chat(chat)
                .map_err(|error| GatewayError::Backend {
                    stage: "open-provider-stream",
                    message: error.to_string(),
                })?;

        let worker_task = tokio::spawn(worker);
        let reply = collect_reply(stream).await;

        if reply.is_err() {
            worker_task.abort();
        }

        tracing::debug!(
            ticket = ticket.0,
            provider_id = %self.provider.id(),
            model_id = %self.model_id,
            ok = reply.is_ok(),
            "provider reply collected"
        );

        reply
    }
}

impl Gateway for ProviderGateway {
    fn generate<'a>(&'a self, request: GatewayRequest) -> BoxFuture<'a, GatewayResult<String>> {
        Box::pin(self.generate_reply(request))
    }
}

/// Drains one provider stream into the full reply text.
///
/// Reasoning deltas are not part of the answer and are dropped.
pub async fn collect_reply(mut stream: ProviderEventStream) -> GatewayResult<String> {
    let ticket = stream.ticket();
    let mut reply = String::new();

    while let Some(event) = stream.recv().await {
        if event.ticket != ticket {
            continue;
        }

        match event.payload {
            StreamEventPayload::Delta(chunk) => reply.push_str(&chunk),
            StreamEventPayload::ReasoningDelta(_) => {}
            StreamEventPayload::Done => {
                ensure!(
                    !reply.trim().is_empty(),
                    EmptyReplySnafu {
                        stage: "collect-reply"
                    }
                );
                return Ok(reply);
            }
            StreamEventPayload::Error(message) => {
                return BackendSnafu {
                    stage: "provider-stream",
                    message,
                }
                .fail();
            }
        }
    }

    WorkerFailedSnafu {
        stage: "collect-reply",
        message: "provider stream ended before a terminal event",
    }
    .fail()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use abram_session::{RequestTicket, Subject};

    use super::*;
    use crate::provider::{ProviderResult, StreamEventMapped, make_event_stream};

    /// Replays a fixed list of payloads and records the requests it saw.
    struct ScriptedProvider {
        script: Vec<StreamEventPayload>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<StreamEventPayload>) -> Arc<Self> {
            Arc::new(Self {
                script,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "Scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        fn stream_chat(&self, request: ChatRequest) -> ProviderResult<ProviderStreamHandle> {
            let (event_tx, stream, _cancel_rx) = make_event_stream(request.ticket);
            let ticket = request.ticket;
            self.seen.lock().unwrap().push(request);

            let script = self.script.clone();
            let worker = Box::pin(async move {
                for payload in script {
                    let _ = event_tx.send(StreamEventMapped { ticket, payload });
                }
            });

            Ok(ProviderStreamHandle { stream, worker })
        }
    }

    fn request(text: &str) -> GatewayRequest {
        GatewayRequest {
            ticket: RequestTicket::new(9),
            text: text.to_string(),
            subject: Subject::Physics,
            image: None,
        }
    }

    fn delta(text: &str) -> StreamEventPayload {
        StreamEventPayload::Delta(text.to_string())
    }

    #[tokio::test]
    async fn deltas_are_concatenated_until_done() {
        let provider = ScriptedProvider::new(vec![
            StreamEventPayload::ReasoningDelta("thinking".to_string()),
            delta("v = s / t"),
            delta(" = 5 m/s"),
            StreamEventPayload::Done,
        ]);
        let gateway = ProviderGateway::new(provider.clone()).with_options(GenerationOptions {
            temperature: Some(0.2),
            max_tokens: Some(512),
        });

        let reply = gateway.generate(request("speed?")).await.unwrap();
        assert_eq!(reply, "v = s / t = 5 m/s");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model_id, "scripted-model");
        assert_eq!(seen[0].temperature, Some(0.2));
        assert_eq!(seen[0].max_tokens, Some(512));
        assert_eq!(
            seen[0].preamble.as_deref(),
            Some(Subject::Physics.system_instruction())
        );
    }

    #[tokio::test]
    async fn error_event_fails_the_request() {
        let provider = ScriptedProvider::new(vec![
            delta("partial"),
            StreamEventPayload::Error("quota exceeded".to_string()),
        ]);
        let gateway = ProviderGateway::new(provider);

        let error = gateway.generate(request("q")).await.unwrap_err();
        assert!(matches!(error, GatewayError::Backend { .. }));
        assert!(error.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn stream_closed_without_terminal_event_fails() {
        let provider = ScriptedProvider::new(vec![delta("half an answer")]);
        let gateway = ProviderGateway::new(provider);

        assert!(matches!(
            gateway.generate(request("q")).await,
            Err(GatewayError::WorkerFailed { .. })
        ));
    }

    #[tokio::test]
    async fn blank_reply_is_an_error() {
        let provider = ScriptedProvider::new(vec![delta("  "), StreamEventPayload::Done]);
        let gateway = ProviderGateway::new(provider);

        assert!(matches!(
            gateway.generate(request("q")).await,
            Err(GatewayError::EmptyReply { .. })
        ));
    }
}
