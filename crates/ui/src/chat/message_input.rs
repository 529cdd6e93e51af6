use abram_session::Subject;
use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{
    ActiveTheme, Disableable, IconName, Sizable,
    button::{Button, ButtonVariants},
    h_flex,
    input::{Input, InputEvent, InputState},
    label::Label,
    v_flex,
};

use crate::chat::events::{AttachImageRequested, RemoveImageRequested, SubmitRequested};

pub fn placeholder_for(subject: Subject) -> String {
    format!(
        "Ask about {}, or attach a photo of the task...",
        subject.display_name()
    )
}

/// Mirrors `Session::can_submit` for the draft that has not been staged yet.
pub fn draft_is_submittable(text: &str, has_image: bool, pending: bool) -> bool {
    !pending && (!text.trim().is_empty() || has_image)
}

pub struct MessageInput {
    input_state: Entity<InputState>,
    staged_image: Option<SharedString>,
    is_pending: bool,
    pending_newline: bool,
}

impl EventEmitter<SubmitRequested> for MessageInput {}
impl EventEmitter<AttachImageRequested> for MessageInput {}
impl EventEmitter<RemoveImageRequested> for MessageInput {}

impl MessageInput {
    pub fn new(subject: Subject, window: &mut Window, cx: &mut Context<Self>) -> Self {
        let input_state = cx.new(|cx| {
            InputState::new(window, cx)
                .placeholder(placeholder_for(subject))
                .clean_on_escape()
                .auto_grow(3, 10)
        });

        cx.subscribe_in(
            &input_state,
            window,
            |this, _, event: &InputEvent, window, cx| {
                if let InputEvent::PressEnter { secondary } = event {
                    if *secondary {
                        this.pending_newline = false;
                        return;
                    }

                    if this.pending_newline {
                        // Shift+Enter already inserted the newline; swallow the enter it reports.
                        this.pending_newline = false;
                    } else {
                        this.trim_trailing_newline(window, cx);
                        this.handle_submit(window, cx);
                    }
                }
            },
        )
        .detach();

        Self {
            input_state,
            staged_image: None,
            is_pending: false,
            pending_newline: false,
        }
    }

    pub fn set_subject(&mut self, subject: Subject, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            state.set_placeholder(placeholder_for(subject), window, cx);
        });
    }

    /// Only the send path is gated; the draft stays editable while a reply is pending.
    pub fn set_pending(&mut self, pending: bool, cx: &mut Context<Self>) {
        self.is_pending = pending;
        cx.notify();
    }

    pub fn set_staged_image(&mut self, file_name: Option<String>, cx: &mut Context<Self>) {
        self.staged_image = file_name.map(SharedString::from);
        cx.notify();
    }

    pub fn clear(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            state.set_value("", window, cx);
        });
        self.pending_newline = false;
    }

    fn can_send(&self, cx: &App) -> bool {
        draft_is_submittable(
            &self.input_state.read(cx).value(),
            self.staged_image.is_some(),
            self.is_pending,
        )
    }

    fn handle_shift_enter(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.pending_newline = true;
        self.input_state.update(cx, |state, cx| {
            state.insert("\n", window, cx);
        });
        cx.notify();
    }

    fn trim_trailing_newline(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            let value = state.value().to_string();
            if let Some(trimmed) = value.strip_suffix('\n') {
                state.set_value(trimmed.to_string(), window, cx);
            }
        });
    }

    fn handle_submit(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        if !self.can_send(cx) {
            return;
        }

        let text = self.input_state.read(cx).value().to_string();
        cx.emit(SubmitRequested { text });
        self.clear(window, cx);
    }

    fn render_staged_image(&self, cx: &mut Context<Self>) -> Option<AnyElement> {
        let file_name = self.staged_image.clone()?;
        let theme = cx.theme();

        Some(
            h_flex()
                .id("staged-image")
                .max_w(px(320.))
                .gap_2()
                .pl_3()
                .pr_1()
                .py_1()
                .items_center()
                .rounded_full()
                .border_1()
                .border_color(theme.border)
                .bg(theme.muted)
                .child(
                    Label::new("Image")
                        .text_xs()
                        .text_color(theme.muted_foreground),
                )
                .child(div().min_w_0().truncate().child(Label::new(file_name).text_xs()))
                .child(
                    Button::new("remove-staged-image")
                        .ghost()
                        .xsmall()
                        .icon(IconName::Close)
                        .on_click(cx.listener(|_, _, _window, cx| {
                            cx.emit(RemoveImageRequested);
                        })),
                )
                .into_any_element(),
        )
    }
}

impl Render for MessageInput {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let can_send = self.can_send(cx);
        let staged_image = self.render_staged_image(cx);
        let theme = cx.theme();

        v_flex()
            .bg(theme.background)
            .gap_2()
            .p_3()
            .when_some(staged_image, |column, chip| {
                column.child(h_flex().w_full().child(chip))
            })
            .child(
                div()
                    .w_full()
                    .px_3()
                    .py_2()
                    .rounded_lg()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.background)
                    .on_key_down(cx.listener(|this, event: &KeyDownEvent, window, cx| {
                        if event.keystroke.key == "enter" && event.keystroke.modifiers.shift {
                            this.handle_shift_enter(window, cx);
                        }
                    }))
                    .child(Input::new(&self.input_state).w_full()),
            )
            .child(
                h_flex()
                    .w_full()
                    .items_center()
                    .justify_between()
                    .child(
                        Button::new("attach-image")
                            .ghost()
                            .small()
                            .icon(IconName::Plus)
                            .child("Photo")
                            .on_click(cx.listener(|_, _, _window, cx| {
                                cx.emit(AttachImageRequested);
                            })),
                    )
                    .child(
                        Button::new("send")
                            .small()
                            .primary()
                            .icon(IconName::ArrowUp)
                            .child("Send")
                            .disabled(!can_send)
                            .on_click(cx.listener(|this, _, window, cx| {
                                this.handle_submit(window, cx);
                            })),
                    ),
            )
    }
}
