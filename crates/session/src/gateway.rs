use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use snafu::Snafu;

use crate::image::ImageAttachment;
use crate::subject::Subject;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identifies one gateway request so late completions can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestTicket(pub u64);

impl RequestTicket {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Everything the backend needs to answer one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub ticket: RequestTicket,
    pub text: String,
    pub subject: Subject,
    pub image: Option<ImageAttachment>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GatewayError {
    #[snafu(display("backend request failed on `{stage}`: {message}"))]
    Backend {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("backend did not answer within {after:?}"))]
    TimedOut {
        stage: &'static str,
        after: Duration,
    },
    #[snafu(display("backend returned an empty reply"))]
    EmptyReply { stage: &'static str },
    #[snafu(display("gateway worker failed on `{stage}`: {message}"))]
    WorkerFailed {
        stage: &'static str,
        message: String,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Request/response boundary to the generative backend.
pub trait Gateway: Send + Sync {
    fn generate<'a>(&'a self, request: GatewayRequest) -> BoxFuture<'a, GatewayResult<String>>;
}

/// Outcome of one gateway call, addressed to the submission that started it.
#[derive(Debug)]
pub struct GatewayCompletion {
    pub ticket: RequestTicket,
    pub outcome: GatewayResult<String>,
}

/// Awaits the gateway exactly once, bounded by `timeout` when one is given.
pub async fn run_request(
    gateway: Arc<dyn Gateway>,
    request: GatewayRequest,
    timeout: Option<Duration>,
) -> GatewayCompletion {
    let ticket = request.ticket;
    let subject = request.subject;
    let call = gateway.generate(request);

    let outcome = match timeout {
        Some(after) => match tokio::time::timeout(after, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    ticket = ticket.0,
                    subject = subject.slug(),
                    timeout_ms = after.as_millis() as u64,
                    "gateway request timed out"
                );
                TimedOutSnafu {
                    stage: "await-gateway",
                    after,
                }
                .fail()
            }
        },
        None => call.await,
    };

    GatewayCompletion { ticket, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoGateway;

    impl Gateway for EchoGateway {
        fn generate<'a>(
            &'a self,
            request: GatewayRequest,
        ) -> BoxFuture<'a, GatewayResult<String>> {
            Box::pin(async move { Ok(format!("{}:{}", request.subject.slug(), request.text)) })
        }
    }

    struct HangingGateway;

    impl Gateway for HangingGateway {
        fn generate<'a>(
            &'a self,
            _request: GatewayRequest,
        ) -> BoxFuture<'a, GatewayResult<String>> {
            Box::pin(std::future::pending())
        }
    }

    fn request(ticket: u64) -> GatewayRequest {
        GatewayRequest {
            ticket: RequestTicket::new(ticket),
            text: "2+2=?".to_string(),
            subject: Subject::Algebra,
            image: None,
        }
    }

    #[tokio::test]
    async fn completion_carries_ticket_and_reply() {
        let completion = run_request(Arc::new(EchoGateway), request(7), None).await;

        assert_eq!(completion.ticket, RequestTicket::new(7));
        assert_eq!(completion.outcome.unwrap(), "algebra:2+2=?");
    }

    #[tokio::test]
    async fn hung_gateway_resolves_as_timeout() {
        let completion = run_request(
            Arc::new(HangingGateway),
            request(3),
            Some(Duration::from_millis(20)),
        )
        .await;

        assert_eq!(completion.ticket, RequestTicket::new(3));
        assert!(matches!(
            completion.outcome,
            Err(GatewayError::TimedOut { .. })
        ));
    }
}
