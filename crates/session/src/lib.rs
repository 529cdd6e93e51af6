#![deny(unsafe_code)]

//! Conversation core of the study assistant: subjects, the transcript, and the
//! single-request session state machine sitting in front of the AI gateway.

pub mod gateway;
pub mod image;
pub mod message;
pub mod session;
pub mod subject;

pub use gateway::{
    BoxFuture, Gateway, GatewayCompletion, GatewayError, GatewayRequest, GatewayResult,
    RequestTicket, run_request,
};
pub use image::{ImageAttachment, ImageError, ImageMediaType, ImageResult};
pub use message::{Message, MessageId, Role};
pub use session::{
    FALLBACK_REPLY, Session, SessionAction, SubmitRejection, WELCOME_MESSAGE,
};
pub use subject::{Subject, SubjectParseError};
