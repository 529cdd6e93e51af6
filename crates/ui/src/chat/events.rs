use abram_session::Subject;

/// Emitted when a subject card is clicked in the sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectSelected {
    pub subject: Subject,
}

/// Emitted when the user asks to send the current draft.
///
/// `text` is the raw input value; the session decides whether it is submittable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequested {
    pub text: String,
}

/// Emitted when the attach button is clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachImageRequested;

/// Emitted when the staged image chip is dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveImageRequested;
