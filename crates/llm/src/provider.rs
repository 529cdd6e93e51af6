use abram_session::{BoxFuture, GatewayRequest, ImageAttachment, RequestTicket};
use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

pub const GEMINI_PROVIDER_ID: &str = "gemini";
pub const OPENAI_PROVIDER_ID: &str = "openai";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    /// Custom base URL; empty means the provider default.
    pub endpoint: String,
    pub model_id: Option<String>,
}

impl ProviderConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
            model_id: None,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into().trim().to_string();
        self.model_id = (!model_id.is_empty()).then_some(model_id);
        self
    }
}

/// One backend call: a single user turn with an optional image.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub ticket: RequestTicket,
    pub model_id: String,
    pub text: String,
    pub image: Option<ImageAttachment>,
    pub preamble: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl ChatRequest {
    pub fn new(ticket: RequestTicket, model_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            ticket,
            model_id: model_id.into(),
            text: text.into(),
            image: None,
            preamble: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Builds the backend call for a session submission, using the subject's tutor persona.
    pub fn from_gateway_request(request: GatewayRequest, model_id: impl Into<String>) -> Self {
        let preamble = request.subject.system_instruction();
        Self::new(request.ticket, model_id, request.text)
            .with_image(request.image)
            .with_preamble(preamble)
    }

    pub fn with_image(mut self, image: Option<ImageAttachment>) -> Self {
        self.image = image;
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.image.is_none()
    }
}

/// Provider-agnostic stream payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventPayload {
    Delta(String),
    ReasoningDelta(String),
    Done,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEventMapped {
    pub ticket: RequestTicket,
    pub payload: StreamEventPayload,
}

pub type ProviderWorker = BoxFuture<'static, ()>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("request {ticket:?} has neither text nor image"))]
    EmptyPrompt {
        stage: &'static str,
        ticket: RequestTicket,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
}

pub struct ProviderEventStream {
    ticket: RequestTicket,
    events: mpsc::UnboundedReceiver<StreamEventMapped>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    pub worker: ProviderWorker,
}

impl ProviderEventStream {
    pub(crate) fn new(
        ticket: RequestTicket,
        events: mpsc::UnboundedReceiver<StreamEventMapped>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            ticket,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn ticket(&self) -> RequestTicket {
        self.ticket
    }

    pub async fn recv(&mut self) -> Option<StreamEventMapped> {
        self.events.recv().await
    }
}

impl Drop for ProviderEventStream {
    fn drop(&mut self) {
        // Tells the worker to stop pulling from the upstream response.
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn stream_chat(&self, request: ChatRequest) -> ProviderResult<ProviderStreamHandle>;
}

pub(crate) fn make_event_stream(
    ticket: RequestTicket,
) -> (
    mpsc::UnboundedSender<StreamEventMapped>,
    ProviderEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        ProviderEventStream::new(ticket, event_rx, cancel_tx),
        cancel_rx,
    )
}
