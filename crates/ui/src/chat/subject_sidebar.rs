use abram_session::Subject;
use gpui::*;
use gpui_component::{
    ActiveTheme, Icon, IconName, Sizable,
    button::{Button, ButtonVariants},
    h_flex,
    label::Label,
    list::ListItem,
    v_flex,
};

use crate::chat::events::SubjectSelected;

const SUBJECT_ROW_HEIGHT: f32 = 56.0;
const BRAND_ICON_SIZE: f32 = 32.0;

pub const SIDEBAR_TIP: &str =
    "Tip: send a photo of the task. AbramAI reads handwriting and printed text.";

pub fn subject_icon(subject: Subject) -> IconName {
    match subject {
        Subject::Algebra => IconName::ChartPie,
        Subject::History => IconName::Calendar,
        Subject::Physics => IconName::Globe,
        Subject::Chemistry => IconName::Star,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidebarToggleClicked;

/// Subject picker shown on the left of the shell.
pub struct SubjectSidebar {
    selected: Subject,
}

impl EventEmitter<SubjectSelected> for SubjectSidebar {}
impl EventEmitter<SidebarToggleClicked> for SubjectSidebar {}

impl SubjectSidebar {
    pub fn new(selected: Subject) -> Self {
        Self { selected }
    }

    /// Mirrors the session's active subject without emitting.
    pub fn set_selected(&mut self, subject: Subject, cx: &mut Context<Self>) {
        if self.selected != subject {
            self.selected = subject;
            cx.notify();
        }
    }

    fn select_subject(&mut self, subject: Subject, cx: &mut Context<Self>) {
        self.set_selected(subject, cx);
        cx.emit(SubjectSelected { subject });
    }

    fn render_brand(&self, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        h_flex()
            .w_full()
            .items_center()
            .gap_3()
            .px_4()
            .py_4()
            .border_b_1()
            .border_color(theme.border)
            .child(
                div()
                    .size(px(BRAND_ICON_SIZE))
                    .rounded_lg()
                    .bg(theme.primary)
                    .flex()
                    .items_center()
                    .justify_center()
                    .child(
                        Icon::new(IconName::Bot)
                            .size(px(18.))
                            .text_color(theme.primary_foreground),
                    ),
            )
            .child(
                v_flex()
                    .min_w_0()
                    .child(Label::new("AbramAI").text_sm())
                    .child(
                        Label::new("Study assistant")
                            .text_xs()
                            .text_color(theme.muted_foreground),
                    ),
            )
    }

    fn render_subjects(&self, cx: &mut Context<Self>) -> impl IntoElement {
        let selected = self.selected;
        let rows = Subject::ALL
            .iter()
            .copied()
            .enumerate()
            .map(|(index, subject)| {
                let theme = cx.theme();
                let is_selected = subject == selected;
                let icon_color = if is_selected {
                    theme.primary
                } else {
                    theme.muted_foreground
                };

                div()
                    .w_full()
                    .h(px(SUBJECT_ROW_HEIGHT))
                    .px_2()
                    .child(
                        ListItem::new(("subject", index))
                            .w_full()
                            .h_full()
                            .px_3()
                            .py_2()
                            .rounded_md()
                            .selected(is_selected)
                            .on_click(cx.listener(move |this, _event: &ClickEvent, _window, cx| {
                                this.select_subject(subject, cx);
                            }))
                            .child(
                                h_flex()
                                    .w_full()
                                    .items_center()
                                    .gap_3()
                                    .child(
                                        Icon::new(subject_icon(subject))
                                            .size(px(16.))
                                            .text_color(icon_color),
                                    )
                                    .child(
                                        v_flex()
                                            .flex_1()
                                            .min_w_0()
                                            .child(
                                                div()
                                                    .truncate()
                                                    .child(Label::new(subject.display_name()).text_sm()),
                                            )
                                            .child(
                                                div().truncate().child(
                                                    Label::new(subject.tagline())
                                                        .text_xs()
                                                        .text_color(theme.muted_foreground),
                                                ),
                                            ),
                                    ),
                            ),
                    )
                    .into_any_element()
            })
            .collect::<Vec<_>>();

        v_flex()
            .id("subject-list")
            .w_full()
            .flex_1()
            .min_h_0()
            .py_2()
            .gap_1()
            .overflow_y_scroll()
            .children(rows)
    }

    fn render_footer(&self, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        v_flex()
            .w_full()
            .gap_2()
            .px_3()
            .py_3()
            .border_t_1()
            .border_color(theme.border)
            .child(
                h_flex()
                    .w_full()
                    .items_start()
                    .gap_2()
                    .p_2()
                    .rounded_md()
                    .bg(theme.muted)
                    .child(
                        Icon::new(IconName::Info)
                            .size(px(14.))
                            .text_color(theme.primary),
                    )
                    .child(
                        div().flex_1().min_w_0().child(
                            Label::new(SIDEBAR_TIP)
                                .text_xs()
                                .text_color(theme.muted_foreground),
                        ),
                    ),
            )
            .child(
                h_flex().w_full().justify_end().child(
                    Button::new("sidebar-toggle")
                        .ghost()
                        .small()
                        .icon(IconName::PanelLeftClose)
                        .on_click(cx.listener(|_, _, _, cx| {
                            cx.emit(SidebarToggleClicked);
                        })),
                ),
            )
    }
}

impl Render for SubjectSidebar {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        v_flex()
            .size_full()
            .min_w_0()
            .overflow_hidden()
            .bg(theme.background)
            .child(self.render_brand(cx))
            .child(self.render_subjects(cx))
            .child(self.render_footer(cx))
    }
}

