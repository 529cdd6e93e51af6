#![deny(unsafe_code)]

/// Desktop shell for the AbramAI study assistant, built with GPUI and gpui-component.
pub mod app;
/// Subject sidebar, transcript and input views around the session.
pub mod chat;
/// Settings file persistence and theme application.
pub mod settings;
