use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use abram_llm::{ProviderGateway, create_provider};
use abram_session::gateway::{BackendSnafu, WorkerFailedSnafu};
use abram_session::{
    Gateway, GatewayCompletion, GatewayRequest, ImageAttachment, ImageResult, Session,
    SessionAction, Subject, run_request,
};
use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{ActiveTheme, Icon, h_flex, label::Label, v_flex};
use gpui_tokio_bridge::Tokio;

use crate::chat::events::{
    AttachImageRequested, RemoveImageRequested, SubjectSelected, SubmitRequested,
};
use crate::chat::{MessageInput, MessageList, SidebarToggleClicked, SubjectSidebar, subject_icon};
use crate::settings::AppSettings;

const MISSING_API_KEY_NOTICE: &str =
    "No API key configured. Add `api_key` to settings.json or set GEMINI_API_KEY.";

pub fn status_line(subject: Subject) -> String {
    format!("AbramAI active • {}", subject.display_name())
}

/// What the header shows about the configured backend.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProviderStatus {
    label: SharedString,
    error: Option<SharedString>,
}

/// Owns the session and wires sidebar, transcript and input around it.
///
/// All session mutations go through [`ChatView::dispatch`]; child views only
/// mirror the resulting state.
pub struct ChatView {
    sidebar: Entity<SubjectSidebar>,
    message_list: Entity<MessageList>,
    message_input: Entity<MessageInput>,
    session: Session,
    gateway: Option<Arc<dyn Gateway>>,
    provider_status: ProviderStatus,
    request_timeout: Option<Duration>,
    request_task: Option<Task<()>>,
    attach_task: Option<Task<()>>,
    notice: Option<SharedString>,
}

impl EventEmitter<SidebarToggleClicked> for ChatView {}

impl ChatView {
    pub fn new(settings: &AppSettings, window: &mut Window, cx: &mut Context<Self>) -> Self {
        let subject = settings.initial_subject();
        let sidebar = cx.new(|_| SubjectSidebar::new(subject));
        let message_list = cx.new(MessageList::new);
        let message_input = cx.new(|cx| MessageInput::new(subject, window, cx));
        let (gateway, provider_status) = Self::build_gateway(settings);

        cx.subscribe_in(
            &sidebar,
            window,
            |this, _, event: &SubjectSelected, window, cx| {
                this.handle_subject_selected(event.subject, window, cx);
            },
        )
        .detach();

        cx.subscribe(&sidebar, |_, _, _event: &SidebarToggleClicked, cx| {
            cx.emit(SidebarToggleClicked);
        })
        .detach();

        cx.subscribe(&message_input, |this, _, event: &SubmitRequested, cx| {
            this.handle_submit(event.text.clone(), cx);
        })
        .detach();

        cx.subscribe(&message_input, |this, _, _event: &AttachImageRequested, cx| {
            this.pick_image(cx);
        })
        .detach();

        cx.subscribe(&message_input, |this, _, _event: &RemoveImageRequested, cx| {
            this.dispatch(SessionAction::ClearStagedImage, cx);
        })
        .detach();

        let mut this = Self {
            sidebar,
            message_list,
            message_input,
            session: Session::new(subject),
            gateway,
            provider_status,
            request_timeout: settings.request_timeout(),
            request_task: None,
            attach_task: None,
            notice: None,
        };
        this.sync_children(cx);
        this
    }

    pub fn sidebar(&self) -> &Entity<SubjectSidebar> {
        &self.sidebar
    }

    fn build_gateway(settings: &AppSettings) -> (Option<Arc<dyn Gateway>>, ProviderStatus) {
        let label = SharedString::from(format!(
            "{} · {}",
            settings.provider_id,
            settings.model_name()
        ));

        let Some(config) = settings.to_provider_config() else {
            tracing::warn!(
                provider_id = %settings.provider_id,
                "no API key configured, every reply will use the fallback message"
            );
            return (
                None,
                ProviderStatus {
                    label,
                    error: Some(MISSING_API_KEY_NOTICE.into()),
                },
            );
        };

        match create_provider(config) {
            Ok(provider) => {
                let gateway =
                    ProviderGateway::new(provider).with_options(settings.generation_options());
                tracing::info!(
                    provider_id = %gateway.provider().id(),
                    model_id = %gateway.model_id(),
                    "initialized provider gateway"
                );
                let label = SharedString::from(format!(
                    "{} · {}",
                    gateway.provider().id(),
                    gateway.model_id()
                ));
                (Some(Arc::new(gateway)), ProviderStatus { label, error: None })
            }
            Err(error) => {
                tracing::error!(%error, "failed to initialize provider adapter");
                (
                    None,
                    ProviderStatus {
                        label,
                        error: Some(format!("Provider error: {error}").into()),
                    },
                )
            }
        }
    }

    /// Runs one action through the session and refreshes the child views.
    fn dispatch(&mut self, action: SessionAction, cx: &mut Context<Self>) -> Option<GatewayRequest> {
        let request = self.session.apply(action);
        self.sync_children(cx);
        request
    }

    fn sync_children(&mut self, cx: &mut Context<Self>) {
        let pending = self.session.is_pending();
        let subject = self.session.active_subject();
        let staged_image = self
            .session
            .staged_image()
            .map(|image| image.file_name.clone());

        let transcript = self.session.transcript();
        self.message_list.update(cx, |list, cx| {
            list.set_transcript(transcript, pending, cx);
        });
        self.message_input.update(cx, |input, cx| {
            input.set_pending(pending, cx);
            input.set_staged_image(staged_image, cx);
        });
        self.sidebar.update(cx, |sidebar, cx| {
            sidebar.set_selected(subject, cx);
        });
        cx.notify();
    }

    fn handle_subject_selected(
        &mut self,
        subject: Subject,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        if self.session.active_subject() == subject {
            return;
        }

        tracing::debug!(subject = subject.slug(), "subject selected");
        self.dispatch(SessionAction::SelectSubject(subject), cx);
        self.message_input.update(cx, |input, cx| {
            input.set_subject(subject, window, cx);
        });
    }

    fn handle_submit(&mut self, text: String, cx: &mut Context<Self>) {
        let request = submit_draft(&mut self.session, text);
        self.sync_children(cx);
        let Some(request) = request else {
            return;
        };

        self.notice = None;
        self.message_list
            .update(cx, |list, cx| list.scroll_to_bottom(cx));
        self.spawn_request(request, cx);
    }

    fn spawn_request(&mut self, request: GatewayRequest, cx: &mut Context<Self>) {
        let ticket = request.ticket;

        let Some(gateway) = self.gateway.clone() else {
            let message = self
                .provider_status
                .error
                .as_ref()
                .map(|error| error.to_string())
                .unwrap_or_else(|| "provider is not configured".to_string());
            self.handle_completion(
                GatewayCompletion {
                    ticket,
                    outcome: BackendSnafu {
                        stage: "resolve-provider",
                        message,
                    }
                    .fail(),
                },
                cx,
            );
            return;
        };

        tracing::info!(
            ticket = ticket.0,
            subject = request.subject.slug(),
            has_image = request.image.is_some(),
            "sending request to provider"
        );

        let worker = Tokio::spawn(cx, run_request(gateway, request, self.request_timeout));
        self.request_task = Some(cx.spawn(async move |this, cx| {
            let completion = match worker.await {
                Ok(completion) => completion,
                Err(error) => GatewayCompletion {
                    ticket,
                    outcome: WorkerFailedSnafu {
                        stage: "join-request-task",
                        message: error.to_string(),
                    }
                    .fail(),
                },
            };

            let _ = this.update(cx, |this, cx| {
                this.handle_completion(completion, cx);
            });
        }));
    }

    fn handle_completion(&mut self, completion: GatewayCompletion, cx: &mut Context<Self>) {
        tracing::debug!(
            ticket = completion.ticket.0,
            ok = completion.outcome.is_ok(),
            "request finished"
        );
        self.dispatch(SessionAction::Resolve(completion), cx);
    }

    /// Staging stays open while a reply is pending; the image rides on the next submit.
    fn pick_image(&mut self, cx: &mut Context<Self>) {
        let paths = cx.prompt_for_paths(PathPromptOptions {
            files: true,
            directories: false,
            multiple: false,
            prompt: Some("Attach".into()),
        });

        self.attach_task = Some(cx.spawn(async move |this, cx| {
            let path = match paths.await {
                Ok(Ok(Some(mut paths))) => match paths.pop() {
                    Some(path) => path,
                    None => return,
                },
                Ok(Ok(None)) | Err(_) => return,
                Ok(Err(error)) => {
                    tracing::warn!(%error, "file dialog failed");
                    return;
                }
            };

            let encoded = cx
                .background_executor()
                .spawn(async move { encode_image(path) })
                .await;

            let _ = this.update(cx, |this, cx| {
                this.handle_image_encoded(encoded, cx);
            });
        }));
    }

    fn handle_image_encoded(&mut self, encoded: ImageResult<ImageAttachment>, cx: &mut Context<Self>) {
        match encoded {
            Ok(image) => {
                tracing::info!(
                    file_name = %image.file_name,
                    media_type = image.media_type.mime_type(),
                    "staged image"
                );
                self.notice = None;
                self.dispatch(SessionAction::StageImage(image), cx);
            }
            Err(error) => {
                // Keep whatever is already staged so the user can retry.
                tracing::warn!(%error, "failed to read selected image");
                self.notice = Some(format!("Could not attach image: {error}").into());
                cx.notify();
            }
        }
    }

    fn render_header(&self, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let subject = self.session.active_subject();
        let notice = self
            .notice
            .clone()
            .or_else(|| self.provider_status.error.clone());

        v_flex()
            .id("chat-view-header")
            .w_full()
            .flex_shrink_0()
            .px_4()
            .py_2()
            .gap_1()
            .border_b_1()
            .border_color(theme.border)
            .child(
                h_flex()
                    .w_full()
                    .items_center()
                    .justify_between()
                    .child(
                        h_flex()
                            .gap_2()
                            .items_center()
                            .child(
                                Icon::new(subject_icon(subject))
                                    .size(px(16.))
                                    .text_color(theme.primary),
                            )
                            .child(Label::new(subject.display_name()).text_sm())
                            .child(
                                Label::new(status_line(subject))
                                    .text_xs()
                                    .text_color(theme.muted_foreground),
                            ),
                    )
                    .child(
                        div()
                            .id("chat-view-provider-id")
                            .px_2()
                            .py_1()
                            .rounded_full()
                            .bg(theme.muted)
                            .border_1()
                            .border_color(theme.border)
                            .text_xs()
                            .text_color(theme.muted_foreground)
                            .child(self.provider_status.label.clone()),
                    ),
            )
            .when_some(notice, |header, notice| {
                header.child(Label::new(notice).text_xs().text_color(theme.danger))
            })
    }
}

/// Stages the typed draft and submits it together with any staged image.
///
/// While a reply is pending nothing is staged, so the draft stays in the input
/// for the next submit.
fn submit_draft(session: &mut Session, text: String) -> Option<GatewayRequest> {
    if session.is_pending() {
        return None;
    }

    session.apply(SessionAction::StageText(text));
    session.apply(SessionAction::Submit)
}

fn encode_image(path: PathBuf) -> ImageResult<ImageAttachment> {
    ImageAttachment::from_path(&path)
}

impl Render for ChatView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let header = self.render_header(cx);
        let theme = cx.theme();

        v_flex()
            .id("chat-view")
            .relative()
            .size_full()
            .min_h_0()
            .overflow_hidden()
            .bg(theme.background)
            .child(header)
            .child(
                div()
                    .id("chat-view-message-list")
                    .flex_1()
                    .min_h_0()
                    .child(self.message_list.clone()),
            )
            .child(
                div()
                    .id("chat-view-message-input")
                    .flex_shrink_0()
                    .w_full()
                    .border_t_1()
                    .border_color(theme.border)
                    .child(self.message_input.clone()),
            )
    }
}

#[cfg(test)]
mod tests {
    use abram_session::{ImageMediaType, Role};

    use super::*;

    #[::core::prelude::v1::test]
    fn input_prepared_while_pending_is_sent_after_the_reply() {
        let mut session = Session::new(Subject::Algebra);
        let first = submit_draft(&mut session, "first".to_string()).unwrap();

        let image =
            ImageAttachment::from_bytes("task.png", ImageMediaType::Png, b"\x89PNG").unwrap();
        session.apply(SessionAction::StageImage(image));
        session.apply(SessionAction::SelectSubject(Subject::Physics));

        assert!(submit_draft(&mut session, "second".to_string()).is_none());
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.staged_text(), "");
        assert!(session.staged_image().is_some());

        session.apply(SessionAction::Resolve(GatewayCompletion {
            ticket: first.ticket,
            outcome: Ok("x = 4".to_string()),
        }));
        assert!(!session.is_pending());

        let second = submit_draft(&mut session, "second".to_string()).unwrap();
        assert_eq!(second.text, "second");
        assert_eq!(second.subject, Subject::Physics);
        assert_eq!(
            second.image.as_ref().map(|image| image.file_name.as_str()),
            Some("task.png")
        );
        assert_ne!(second.ticket, first.ticket);

        let roles: Vec<Role> = session.transcript().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::Model, Role::User, Role::Model, Role::User]);
    }

    #[::core::prelude::v1::test]
    fn status_line_names_the_active_subject() {
        assert_eq!(status_line(Subject::Algebra), "AbramAI active • Algebra");
        assert_eq!(status_line(Subject::History), "AbramAI active • History");
    }

    #[::core::prelude::v1::test]
    fn missing_api_key_disables_the_gateway() {
        let (gateway, status) = ChatView::build_gateway(&AppSettings::default());

        assert!(gateway.is_none());
        assert_eq!(status.error.as_deref(), Some(MISSING_API_KEY_NOTICE));
        assert_eq!(status.label.to_string(), "gemini · gemini-2.5-flash");
    }

    #[::core::prelude::v1::test]
    fn configured_key_builds_a_gateway() {
        let settings = AppSettings {
            api_key: "key".to_string(),
            model: "gemini-2.5-pro".to_string(),
            ..AppSettings::default()
        };
        let (gateway, status) = ChatView::build_gateway(&settings);

        assert!(gateway.is_some());
        assert_eq!(status.error, None);
        assert_eq!(status.label.to_string(), "gemini · gemini-2.5-pro");
    }

    #[::core::prelude::v1::test]
    fn unknown_provider_is_reported_in_the_header() {
        let settings = AppSettings {
            provider_id: "claude".to_string(),
            api_key: "key".to_string(),
            ..AppSettings::default()
        };
        let (gateway, status) = ChatView::build_gateway(&settings);

        assert!(gateway.is_none());
        assert!(
            status
                .error
                .as_deref()
                .is_some_and(|error| error.contains("claude"))
        );
    }
}
