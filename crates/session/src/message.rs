use crate::image::ImageAttachment;

/// Stable identifier for one transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Model,
}

/// Immutable transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// May be empty for image-only submissions.
    pub content: String,
    pub image: Option<ImageAttachment>,
    pub created_at_unix_millis: u64,
}

impl Message {
    pub fn user(
        id: MessageId,
        content: impl Into<String>,
        image: Option<ImageAttachment>,
        created_at_unix_millis: u64,
    ) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            image,
            created_at_unix_millis,
        }
    }

    pub fn model(id: MessageId, content: impl Into<String>, created_at_unix_millis: u64) -> Self {
        Self {
            id,
            role: Role::Model,
            content: content.into(),
            image: None,
            created_at_unix_millis,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}
