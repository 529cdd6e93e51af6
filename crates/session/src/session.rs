use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::gateway::{GatewayCompletion, GatewayRequest, GatewayResult, RequestTicket};
use crate::image::ImageAttachment;
use crate::message::{Message, MessageId};
use crate::subject::Subject;

/// Model reply shown whenever the gateway fails for any reason.
pub const FALLBACK_REPLY: &str = "Something went wrong. Please try again.";

/// First model message of every new session.
pub const WELCOME_MESSAGE: &str = "Hi! I'm **AbramAI**.

I'll help you with your homework so it reads like you wrote it yourself.
Pick a subject on the left, send a photo of the task or type the question.

I'll write a solution you can **copy straight into your notebook**, or put together a tidy summary.";

/// Whether a gateway request is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SessionPhase {
    #[default]
    Idle,
    Awaiting(RequestTicket),
}

/// Reason a submit was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    AwaitingReply { ticket: RequestTicket },
    NothingStaged,
}

/// Every legal state transition, in reducer form.
#[derive(Debug)]
pub enum SessionAction {
    SelectSubject(Subject),
    StageInput {
        text: String,
        image: Option<ImageAttachment>,
    },
    StageText(String),
    StageImage(ImageAttachment),
    ClearStagedImage,
    Submit,
    Resolve(GatewayCompletion),
}

/// The single conversation of a running instance.
///
/// Mutations go through [`Session::apply`] or the transition methods it is
/// built from. The transcript is append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    transcript: Vec<Message>,
    active_subject: Subject,
    phase: SessionPhase,
    staged_text: String,
    staged_image: Option<ImageAttachment>,
    next_message_id: u64,
    next_ticket: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Subject::default())
    }
}

impl Session {
    /// Creates a session seeded with the welcome message.
    pub fn new(active_subject: Subject) -> Self {
        let mut session = Self {
            transcript: Vec::new(),
            active_subject,
            phase: SessionPhase::Idle,
            staged_text: String::new(),
            staged_image: None,
            next_message_id: 1,
            next_ticket: 1,
        };
        session.push_model(WELCOME_MESSAGE.to_string());
        session
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn active_subject(&self) -> Subject {
        self.active_subject
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.phase, SessionPhase::Awaiting(_))
    }

    pub fn pending_ticket(&self) -> Option<RequestTicket> {
        match self.phase {
            SessionPhase::Awaiting(ticket) => Some(ticket),
            SessionPhase::Idle => None,
        }
    }

    pub fn staged_text(&self) -> &str {
        &self.staged_text
    }

    pub fn staged_image(&self) -> Option<&ImageAttachment> {
        self.staged_image.as_ref()
    }

    /// Mirrors the submit precondition so callers can disable the send control.
    pub fn can_submit(&self) -> bool {
        self.check_submit().is_ok()
    }

    /// Applies one action. Returns the request to run when a submit was accepted.
    pub fn apply(&mut self, action: SessionAction) -> Option<GatewayRequest> {
        match action {
            SessionAction::SelectSubject(subject) => self.select_subject(subject),
            SessionAction::StageInput { text, image } => self.stage_input(text, image),
            SessionAction::StageText(text) => self.stage_text(text),
            SessionAction::StageImage(image) => self.stage_image(image),
            SessionAction::ClearStagedImage => self.clear_staged_image(),
            SessionAction::Submit => return self.submit().ok(),
            SessionAction::Resolve(completion) => {
                self.resolve(completion);
            }
        }
        None
    }

    pub fn select_subject(&mut self, subject: Subject) {
        self.active_subject = subject;
    }

    pub fn stage_input(&mut self, text: impl Into<String>, image: Option<ImageAttachment>) {
        self.staged_text = text.into();
        self.staged_image = image;
    }

    pub fn stage_text(&mut self, text: impl Into<String>) {
        self.staged_text = text.into();
    }

    pub fn stage_image(&mut self, image: ImageAttachment) {
        self.staged_image = Some(image);
    }

    pub fn clear_staged_image(&mut self) {
        self.staged_image = None;
    }

    /// Moves the staged input into the transcript and enters the awaiting phase.
    ///
    /// A rejected submit leaves the session untouched.
    pub fn submit(&mut self) -> Result<GatewayRequest, SubmitRejection> {
        if let Err(rejection) = self.check_submit() {
            tracing::debug!(?rejection, "submit ignored");
            return Err(rejection);
        }

        let text = std::mem::take(&mut self.staged_text);
        let image = self.staged_image.take();

        let id = self.alloc_message_id();
        let created_at = self.next_timestamp();
        self.transcript
            .push(Message::user(id, text.clone(), image.clone(), created_at));

        let ticket = RequestTicket::new(self.next_ticket);
        self.next_ticket = self.next_ticket.saturating_add(1);
        self.phase = SessionPhase::Awaiting(ticket);

        tracing::debug!(
            ticket = ticket.0,
            subject = self.active_subject.slug(),
            has_image = image.is_some(),
            "submitted message"
        );

        Ok(GatewayRequest {
            ticket,
            text,
            subject: self.active_subject,
            image,
        })
    }

    /// Applies a gateway outcome. Returns false when the ticket is not the one in flight.
    pub fn resolve(&mut self, completion: GatewayCompletion) -> bool {
        let GatewayCompletion { ticket, outcome } = completion;

        if self.pending_ticket() != Some(ticket) {
            tracing::debug!(
                ticket = ticket.0,
                pending = ?self.pending_ticket(),
                "dropping completion for a request that is not in flight"
            );
            return false;
        }

        self.push_model(Self::reply_text(ticket, outcome));
        self.phase = SessionPhase::Idle;
        true
    }

    fn reply_text(ticket: RequestTicket, outcome: GatewayResult<String>) -> String {
        match outcome {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(ticket = ticket.0, error = %error, "gateway request failed");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    fn check_submit(&self) -> Result<(), SubmitRejection> {
        if let SessionPhase::Awaiting(ticket) = self.phase {
            return Err(SubmitRejection::AwaitingReply { ticket });
        }

        if self.staged_text.trim().is_empty() && self.staged_image.is_none() {
            return Err(SubmitRejection::NothingStaged);
        }

        Ok(())
    }

    fn push_model(&mut self, content: String) {
        let id = self.alloc_message_id();
        let created_at = self.next_timestamp();
        self.transcript.push(Message::model(id, content, created_at));
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id = self.next_message_id.saturating_add(1);
        id
    }

    fn next_timestamp(&self) -> u64 {
        let last = self
            .transcript
            .last()
            .map(|message| message.created_at_unix_millis);
        monotonic_timestamp(last, unix_now_millis())
    }
}

/// Clamps `now` so transcript timestamps never go backwards.
fn monotonic_timestamp(last: Option<u64>, now: u64) -> u64 {
    last.map_or(now, |last| last.max(now))
}

fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_millis(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::image::ImageMediaType;
    use crate::message::Role;

    fn image() -> ImageAttachment {
        ImageAttachment::from_bytes("task.png", ImageMediaType::Png, b"\x89PNG").unwrap()
    }

    fn success(ticket: RequestTicket, text: &str) -> GatewayCompletion {
        GatewayCompletion {
            ticket,
            outcome: Ok(text.to_string()),
        }
    }

    fn failure(ticket: RequestTicket) -> GatewayCompletion {
        GatewayCompletion {
            ticket,
            outcome: Err(GatewayError::Backend {
                stage: "test",
                message: "quota exceeded".to_string(),
            }),
        }
    }

    #[test]
    fn new_session_starts_idle_with_welcome() {
        let session = Session::new(Subject::History);

        assert_eq!(session.active_subject(), Subject::History);
        assert!(!session.is_pending());
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].role, Role::Model);
        assert_eq!(session.transcript()[0].content, WELCOME_MESSAGE);
    }

    #[test]
    fn last_selected_subject_wins() {
        let mut session = Session::default();
        for subject in [Subject::Physics, Subject::Chemistry, Subject::History] {
            session.apply(SessionAction::SelectSubject(subject));
        }

        assert_eq!(session.active_subject(), Subject::History);
        assert_eq!(session.transcript().len(), 1);
    }

    #[test]
    fn submit_with_nothing_staged_is_a_noop() {
        let mut session = Session::default();
        session.stage_text("   ");
        let before = session.clone();

        assert_eq!(session.submit(), Err(SubmitRejection::NothingStaged));
        assert_eq!(session, before);
        assert!(!session.can_submit());
    }

    #[test]
    fn submit_while_awaiting_is_a_noop() {
        let mut session = Session::default();
        session.stage_text("first");
        let request = session.submit().unwrap();

        session.stage_text("second");
        let len = session.transcript().len();

        assert_eq!(
            session.submit(),
            Err(SubmitRejection::AwaitingReply {
                ticket: request.ticket
            })
        );
        assert_eq!(session.transcript().len(), len);
        assert_eq!(session.pending_ticket(), Some(request.ticket));
        assert_eq!(session.staged_text(), "second");
    }

    #[test]
    fn algebra_round_trip_appends_user_then_model() {
        let mut session = Session::default();
        let len = session.transcript().len();

        session.apply(SessionAction::SelectSubject(Subject::Algebra));
        session.apply(SessionAction::StageInput {
            text: "2+2=?".to_string(),
            image: None,
        });
        let request = session.apply(SessionAction::Submit).unwrap();

        assert_eq!(request.text, "2+2=?");
        assert_eq!(request.subject, Subject::Algebra);
        assert!(request.image.is_none());
        assert!(session.is_pending());
        assert_eq!(session.staged_text(), "");

        session.apply(SessionAction::Resolve(success(request.ticket, "4")));

        let transcript = session.transcript();
        assert_eq!(transcript.len(), len + 2);
        assert!(!session.is_pending());

        let user = &transcript[transcript.len() - 2];
        let model = &transcript[transcript.len() - 1];
        assert_eq!((user.role, user.content.as_str()), (Role::User, "2+2=?"));
        assert_eq!((model.role, model.content.as_str()), (Role::Model, "4"));
    }

    #[test]
    fn failed_request_appends_fallback_reply() {
        let mut session = Session::default();
        let len = session.transcript().len();
        session.stage_text("explain the French revolution");

        let request = session.submit().unwrap();
        assert!(session.resolve(failure(request.ticket)));

        assert_eq!(session.transcript().len(), len + 2);
        assert_eq!(session.transcript()[len + 1].content, FALLBACK_REPLY);
        assert!(!session.is_pending());
    }

    #[test]
    fn image_alone_is_enough_to_submit() {
        let mut session = Session::default();
        session.stage_input("", Some(image()));

        let request = session.submit().unwrap();
        let user = session.transcript().last().unwrap();

        assert_eq!(user.content, "");
        assert!(user.has_image());
        assert_eq!(request.image, Some(image()));
        assert!(session.staged_image().is_none());
    }

    #[test]
    fn clearing_staged_image_keeps_text() {
        let mut session = Session::default();
        session.stage_input("photo of task 3", Some(image()));
        session.apply(SessionAction::ClearStagedImage);

        assert_eq!(session.staged_text(), "photo of task 3");
        assert!(session.staged_image().is_none());
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut session = Session::default();
        session.stage_text("question");
        let request = session.submit().unwrap();
        let len = session.transcript().len();

        let stale = RequestTicket::new(request.ticket.0 + 10);
        assert!(!session.resolve(success(stale, "late")));
        assert_eq!(session.transcript().len(), len);
        assert!(session.is_pending());

        assert!(session.resolve(success(request.ticket, "on time")));
        assert!(!session.resolve(success(request.ticket, "duplicate")));
        assert_eq!(session.transcript().len(), len + 1);
    }

    #[test]
    fn subject_change_while_awaiting_only_affects_next_request() {
        let mut session = Session::default();
        session.stage_text("first");
        let first = session.submit().unwrap();

        session.select_subject(Subject::Physics);
        session.resolve(success(first.ticket, "done"));

        session.stage_text("second");
        let second = session.submit().unwrap();

        assert_eq!(first.subject, Subject::Algebra);
        assert_eq!(second.subject, Subject::Physics);
        assert!(second.ticket > first.ticket);
    }

    #[test]
    fn ids_and_timestamps_never_go_backwards() {
        let mut session = Session::default();
        for turn in 0..5 {
            session.stage_text(format!("turn {turn}"));
            let request = session.submit().unwrap();
            session.resolve(success(request.ticket, "ok"));
        }

        for pair in session.transcript().windows(2) {
            assert!(pair[0].id < pair[1].id);
            assert!(pair[0].created_at_unix_millis <= pair[1].created_at_unix_millis);
        }
    }

    #[test]
    fn clock_going_backwards_is_clamped() {
        assert_eq!(monotonic_timestamp(None, 10), 10);
        assert_eq!(monotonic_timestamp(Some(50), 10), 50);
        assert_eq!(monotonic_timestamp(Some(50), 70), 70);
    }
}
