/// Event contracts for chat module wiring.
pub mod events;
pub mod message_input;
pub mod message_list;
pub mod subject_sidebar;
pub mod view;

pub use events::{AttachImageRequested, RemoveImageRequested, SubjectSelected, SubmitRequested};
pub use message_input::MessageInput;
pub use message_list::MessageList;
pub use subject_sidebar::{SidebarToggleClicked, SubjectSidebar, subject_icon};
pub use view::ChatView;
