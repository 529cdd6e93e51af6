use std::path::PathBuf;
use std::time::Duration;

use gpui::prelude::FluentBuilder;
use gpui::*;
use gpui_component::{
    ActiveTheme, IconName, Sizable,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};

use crate::chat::{ChatView, SidebarToggleClicked, SubjectSidebar};
use crate::settings::AppSettings;

/// Returns the default themes directory path.
pub fn default_themes_path() -> PathBuf {
    PathBuf::from("./themes")
}

/// Width of the subject sidebar when expanded.
pub const SIDEBAR_WIDTH: f32 = 264.0;
/// Duration of the sidebar collapse/expand animation.
const SIDEBAR_ANIMATION_DURATION: Duration = Duration::from_millis(150);

gpui::actions!(shell, [ToggleSidebar, Quit,]);

/// Sidebar width at animation progress `delta` in `0.0..=1.0`.
pub fn sidebar_width_at(collapsed: bool, delta: f32) -> f32 {
    let (start_width, end_width) = if collapsed {
        (SIDEBAR_WIDTH, 0.0)
    } else {
        (0.0, SIDEBAR_WIDTH)
    };
    start_width + (end_width - start_width) * delta.clamp(0.0, 1.0)
}

/// Root layout: animated subject sidebar next to the chat view.
pub struct AbramShell {
    chat_view: Entity<ChatView>,
    sidebar_collapsed: bool,
    /// Bumped on each toggle so the width animation restarts.
    animation_trigger: usize,
}

impl AbramShell {
    pub fn new(settings: &AppSettings, window: &mut Window, cx: &mut Context<Self>) -> Self {
        let chat_view = cx.new(|cx| ChatView::new(settings, window, cx));

        cx.subscribe(&chat_view, |this, _, _event: &SidebarToggleClicked, cx| {
            this.toggle_sidebar(cx);
        })
        .detach();

        Self {
            chat_view,
            sidebar_collapsed: false,
            animation_trigger: 0,
        }
    }

    fn toggle_sidebar(&mut self, cx: &mut Context<Self>) {
        self.sidebar_collapsed = !self.sidebar_collapsed;
        self.animation_trigger += 1;
        cx.notify();
    }

    fn render_sidebar(&self, sidebar: Entity<SubjectSidebar>) -> impl IntoElement {
        let collapsed = self.sidebar_collapsed;

        div()
            .id("sidebar-container")
            .h_full()
            .flex_shrink_0()
            .overflow_hidden()
            .child(sidebar)
            .with_animation(
                ("sidebar-anim", self.animation_trigger),
                Animation::new(SIDEBAR_ANIMATION_DURATION).with_easing(ease_in_out),
                move |el, delta| el.w(px(sidebar_width_at(collapsed, delta))),
            )
    }
}

impl Render for AbramShell {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let collapsed = self.sidebar_collapsed;
        let sidebar = self.chat_view.read(cx).sidebar().clone();

        div()
            .size_full()
            .relative()
            .bg(theme.background)
            .on_action(cx.listener(|this, _: &ToggleSidebar, _window, cx| {
                this.toggle_sidebar(cx);
            }))
            .child(
                h_flex()
                    .size_full()
                    .child(self.render_sidebar(sidebar))
                    .when(!collapsed, |el| {
                        el.child(div().w(px(1.0)).h_full().flex_shrink_0().bg(theme.border))
                    })
                    .child(
                        v_flex()
                            .id("main-content")
                            .flex_1()
                            .h_full()
                            .min_w_0()
                            .min_h_0()
                            .overflow_hidden()
                            .child(self.chat_view.clone()),
                    ),
            )
            .when(collapsed, |el| {
                el.child(
                    h_flex().absolute().bottom(px(8.)).left(px(8.)).child(
                        Button::new("expand-sidebar")
                            .ghost()
                            .small()
                            .icon(IconName::PanelLeftOpen)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.toggle_sidebar(cx);
                            })),
                    ),
                )
            })
    }
}
