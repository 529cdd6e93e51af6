use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;

use abram_session::{ImageAttachment, ImageMediaType, Message, MessageId, Role};
use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{
    ActiveTheme, IconName, Sizable, VirtualListScrollHandle,
    button::{Button, ButtonVariants},
    h_flex,
    label::Label,
    text::TextView,
    v_flex, v_virtual_list,
};

const DEFAULT_CONTENT_WIDTH: Pixels = px(680.);
const LIST_HORIZONTAL_PADDING: Pixels = px(16.);
const CONTENT_WIDTH_CHANGE_EPSILON: f32 = 1.0;
const USER_BUBBLE_MAX_WIDTH: Pixels = px(540.);
const USER_BUBBLE_PADDING_X: Pixels = px(14.);
const USER_BUBBLE_PADDING_Y: Pixels = px(10.);
const IMAGE_BADGE_HEIGHT: Pixels = px(22.);
const IMAGE_BADGE_GAP: Pixels = px(6.);
const THUMBNAIL_HEIGHT: Pixels = px(160.);
const THUMBNAIL_MAX_WIDTH: Pixels = px(240.);
const MODEL_LABEL_HEIGHT: Pixels = px(16.);
const MODEL_LABEL_GAP: Pixels = px(8.);
const ESTIMATED_TEXT_LINE_HEIGHT: Pixels = px(18.);
const ESTIMATED_CHAR_WIDTH: f32 = 7.0;
const MARKDOWN_SAFE_FALLBACK_THRESHOLD_BYTES: usize = 128 * 1024;
/// Distance from the tail within which the list keeps following new rows.
const FOLLOW_THRESHOLD: Pixels = px(24.);
const SCROLL_DELTA_EPSILON: f32 = 1.0;
const TYPING_DOT_COUNT: usize = 3;
const TYPING_CYCLE: std::time::Duration = std::time::Duration::from_millis(900);

struct SizeCacheEntry {
    layout_hash: u64,
    height: Pixels,
    measured: bool,
}

/// Keeps the list pinned to the newest message unless the user scrolled away.
struct TailFollow {
    handle: VirtualListScrollHandle,
    following: bool,
    pending_jump: bool,
    last_offset: Pixels,
    last_max_offset: Pixels,
}

impl TailFollow {
    fn new() -> Self {
        Self {
            handle: VirtualListScrollHandle::new(),
            following: true,
            pending_jump: false,
            last_offset: Pixels::ZERO,
            last_max_offset: Pixels::ZERO,
        }
    }

    fn request_jump(&mut self) {
        self.pending_jump = true;
        self.following = true;
    }

    fn request_jump_if_following(&mut self) {
        if self.following || near_tail(self.last_offset, self.last_max_offset) {
            self.pending_jump = true;
        }
    }

    fn update(&mut self) {
        let offset = self.handle.offset().y;
        let max_offset = self.handle.max_offset().height;
        let offset_delta = f32::from(offset) - f32::from(self.last_offset);
        let content_changed =
            (f32::from(max_offset) - f32::from(self.last_max_offset)).abs() > SCROLL_DELTA_EPSILON;

        if self.pending_jump {
            self.following = true;
        } else if !content_changed {
            // Offsets grow negative as the list scrolls down.
            if offset_delta > SCROLL_DELTA_EPSILON {
                self.following = false;
            } else if offset_delta < -SCROLL_DELTA_EPSILON && near_tail(offset, max_offset)
            {
                self.following = true;
            }
        }

        self.last_offset = offset;
        self.last_max_offset = max_offset;
    }

    fn apply(&mut self) {
        if self.following || self.pending_jump {
            let max_offset = self.handle.max_offset().height;
            let current_x = self.handle.offset().x;
            let target_y = if max_offset > Pixels::ZERO {
                -max_offset
            } else {
                Pixels::ZERO
            };
            self.handle.set_offset(point(current_x, target_y));
        }
        self.pending_jump = false;
    }
}

fn near_tail(offset: Pixels, max_offset: Pixels) -> bool {
    max_offset <= Pixels::ZERO || (offset + max_offset).abs() <= FOLLOW_THRESHOLD
}

/// Virtualized transcript with a typing indicator while a reply is pending.
pub struct MessageList {
    messages: Vec<Message>,
    pending: bool,
    item_sizes: Rc<Vec<Size<Pixels>>>,
    follow: TailFollow,
    size_cache: HashMap<MessageId, SizeCacheEntry>,
    thumbnails: HashMap<MessageId, Arc<Image>>,
    content_width: Option<Pixels>,
}

impl MessageList {
    pub fn new(_cx: &mut Context<Self>) -> Self {
        Self {
            messages: Vec::new(),
            pending: false,
            item_sizes: Rc::new(Vec::new()),
            follow: TailFollow::new(),
            size_cache: HashMap::new(),
            thumbnails: HashMap::new(),
            content_width: None,
        }
    }

    pub fn set_transcript(&mut self, messages: &[Message], pending: bool, cx: &mut Context<Self>) {
        let grew = messages.len() > self.messages.len();
        let pending_changed = pending != self.pending;

        if grew || messages.len() < self.messages.len() {
            self.messages = messages.to_vec();
            self.rebuild_thumbnails();
            self.rebuild_item_sizes();
        }
        self.pending = pending;

        if grew || pending_changed {
            self.follow.request_jump_if_following();
        }

        cx.notify();
    }

    pub fn scroll_to_bottom(&mut self, cx: &mut Context<Self>) {
        self.follow.request_jump();
        cx.notify();
    }

    fn update_content_width(&mut self, cx: &mut Context<Self>) {
        let list_width = self.follow.handle.bounds().size.width;
        if list_width <= Pixels::ZERO {
            return;
        }

        let next_content_width = max_pixels(px(1.), list_width - LIST_HORIZONTAL_PADDING * 2);
        let width_changed = self.content_width.is_none_or(|current| {
            (f32::from(current) - f32::from(next_content_width)).abs()
                > CONTENT_WIDTH_CHANGE_EPSILON
        });

        if width_changed {
            self.content_width = Some(next_content_width);

            for entry in self.size_cache.values_mut() {
                entry.measured = false;
            }

            self.rebuild_item_sizes();
            cx.notify();
        }
    }

    fn rebuild_thumbnails(&mut self) {
        let thumbnails = &mut self.thumbnails;
        thumbnails.retain(|id, _| self.messages.iter().any(|message| message.id == *id));

        for message in &self.messages {
            if thumbnails.contains_key(&message.id) {
                continue;
            }
            if let Some(thumbnail) = message.image.as_ref().and_then(thumbnail_for) {
                thumbnails.insert(message.id, thumbnail);
            }
        }
    }

    fn rebuild_item_sizes(&mut self) {
        let content_width = self.content_width.unwrap_or(DEFAULT_CONTENT_WIDTH);
        let mut active_ids = HashSet::with_capacity(self.messages.len());
        let mut sizes = Vec::with_capacity(self.messages.len());

        for message in &self.messages {
            let next_hash = layout_hash(message);
            let estimated_height = estimate_message_height(message, content_width);

            let entry = self.size_cache.entry(message.id).or_insert(SizeCacheEntry {
                layout_hash: next_hash,
                height: estimated_height,
                measured: false,
            });

            if entry.layout_hash != next_hash {
                entry.layout_hash = next_hash;
                entry.height = estimated_height;
                entry.measured = false;
            } else if !entry.measured {
                entry.height = estimated_height;
            }

            sizes.push(size(px(0.), entry.height));
            active_ids.insert(message.id);
        }

        self.size_cache.retain(|id, _| active_ids.contains(id));
        self.item_sizes = Rc::new(sizes);
    }

    fn measure_visible_items(
        &mut self,
        visible_range: Range<usize>,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        let content_width = self.content_width.unwrap_or(DEFAULT_CONTENT_WIDTH);
        let available_space = size(
            AvailableSpace::Definite(content_width),
            AvailableSpace::MinContent,
        );
        let mut updated = false;

        for index in visible_range {
            let Some(message) = self.messages.get(index).cloned() else {
                continue;
            };

            let mut row = self.render_message_row(&message, cx);
            let measured_height = row.layout_as_root(available_space, window, cx).height;
            let Some(entry) = self.size_cache.get_mut(&message.id) else {
                continue;
            };
            if !entry.measured || pixels_changed(entry.height, measured_height) {
                entry.height = measured_height;
                updated = true;
            }
            entry.measured = true;
        }

        if updated {
            self.rebuild_item_sizes();
            cx.notify();
        }
    }

    fn render_message_row(&self, message: &Message, cx: &mut Context<Self>) -> AnyElement {
        match message.role {
            Role::User => self.render_user_row(message, cx),
            Role::Model => self.render_model_row(message, cx),
        }
    }

    fn render_user_row(&self, message: &Message, cx: &mut Context<Self>) -> AnyElement {
        let theme = cx.theme();
        let image_name = message.image.as_ref().map(|image| image.file_name.clone());
        let thumbnail = self.thumbnails.get(&message.id).cloned();

        v_flex()
            .w_full()
            .items_end()
            .child(
                v_flex()
                    .max_w(USER_BUBBLE_MAX_WIDTH)
                    .px(USER_BUBBLE_PADDING_X)
                    .py(USER_BUBBLE_PADDING_Y)
                    .gap(IMAGE_BADGE_GAP)
                    .rounded_lg()
                    .bg(theme.accent)
                    .text_color(theme.accent_foreground)
                    .when_some(thumbnail, |bubble, thumbnail| {
                        bubble.child(
                            img(thumbnail)
                                .h(THUMBNAIL_HEIGHT)
                                .max_w(THUMBNAIL_MAX_WIDTH)
                                .rounded_md()
                                .object_fit(ObjectFit::Contain),
                        )
                    })
                    .when_some(image_name, |bubble, file_name| {
                        bubble.child(
                            h_flex()
                                .h(IMAGE_BADGE_HEIGHT)
                                .px_2()
                                .gap_1()
                                .items_center()
                                .rounded_md()
                                .bg(theme.background.opacity(0.35))
                                .child(Label::new("Image attached").text_xs())
                                .child(
                                    Label::new(file_name)
                                        .text_xs()
                                        .text_color(theme.accent_foreground.opacity(0.7)),
                                ),
                        )
                    })
                    .when(!message.content.is_empty(), |bubble| {
                        bubble.child(Label::new(message.content.clone()).text_sm())
                    }),
            )
            .into_any_element()
    }

    fn render_model_row(&self, message: &Message, cx: &mut Context<Self>) -> AnyElement {
        let theme = cx.theme();

        v_flex()
            .w_full()
            .gap_2()
            .child(
                Label::new("AbramAI")
                    .text_xs()
                    .text_color(theme.foreground.opacity(0.5)),
            )
            .child(render_model_content(message))
            .into_any_element()
    }

    fn render_typing_indicator(&self, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let dot_color = theme.primary;

        h_flex()
            .id("typing-indicator")
            .w_full()
            .flex_shrink_0()
            .px_4()
            .pb_3()
            .gap_2()
            .items_center()
            .child(
                h_flex()
                    .gap_1()
                    .children((0..TYPING_DOT_COUNT).map(move |dot| {
                        div()
                            .size(px(6.))
                            .rounded_full()
                            .bg(dot_color)
                            .with_animation(
                                ("typing-dot", dot),
                                Animation::new(TYPING_CYCLE).repeat(),
                                move |el, delta| {
                                    let phase = (delta + dot as f32 / TYPING_DOT_COUNT as f32) % 1.0;
                                    el.opacity(0.3 + 0.7 * (1.0 - (phase * 2.0 - 1.0).abs()))
                                },
                            )
                    })),
            )
            .child(
                Label::new("AbramAI is thinking...")
                    .text_xs()
                    .text_color(theme.foreground.opacity(0.65)),
            )
    }
}

fn render_model_content(message: &Message) -> AnyElement {
    if message.content.len() > MARKDOWN_SAFE_FALLBACK_THRESHOLD_BYTES {
        return Label::new(message.content.clone())
            .text_sm()
            .into_any_element();
    }

    let markdown_id = ElementId::Name(SharedString::from(format!(
        "model-markdown-{}",
        message.id.0
    )));

    TextView::markdown(markdown_id, message.content.clone())
        .code_block_actions(|code_block, _window, _cx| {
            let code = code_block.code().to_string();
            let mut hasher = DefaultHasher::new();
            hasher.write(code.as_bytes());
            let copy_button_id = format!("copy-code-{}", hasher.finish());

            h_flex().w_full().justify_end().child(
                Button::new(copy_button_id)
                    .ghost()
                    .small()
                    .icon(IconName::Copy)
                    .child("Copy")
                    .on_click(move |_, _, cx| {
                        cx.write_to_clipboard(ClipboardItem::new_string(code.clone()));
                    }),
            )
        })
        .selectable(true)
        .into_any_element()
}

impl Render for MessageList {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        self.update_content_width(cx);
        self.follow.update();
        self.follow.apply();
        let pending = self.pending;

        v_flex()
            .size_full()
            .min_h_0()
            .child(
                v_virtual_list(
                    cx.entity().clone(),
                    "message-list",
                    self.item_sizes.clone(),
                    |this, visible_range, window, cx| {
                        this.update_content_width(cx);
                        this.measure_visible_items(visible_range.clone(), window, cx);
                        visible_range
                            .filter_map(|index| {
                                this.messages
                                    .get(index)
                                    .cloned()
                                    .map(|message| this.render_message_row(&message, cx))
                            })
                            .collect::<Vec<_>>()
                    },
                )
                .w_full()
                .flex_1()
                .min_h_0()
                .px_4()
                .py_3()
                .gap_4()
                .track_scroll(&self.follow.handle),
            )
            .when(pending, |list| list.child(self.render_typing_indicator(cx)))
    }
}

/// Formats the renderer can decode; HEIC/HEIF only get the file-name badge.
fn thumbnail_format(media_type: ImageMediaType) -> Option<ImageFormat> {
    match media_type {
        ImageMediaType::Png => Some(ImageFormat::Png),
        ImageMediaType::Jpeg => Some(ImageFormat::Jpeg),
        ImageMediaType::Gif => Some(ImageFormat::Gif),
        ImageMediaType::Webp => Some(ImageFormat::Webp),
        ImageMediaType::Heic | ImageMediaType::Heif => None,
    }
}

fn thumbnail_for(image: &ImageAttachment) -> Option<Arc<Image>> {
    let format = thumbnail_format(image.media_type)?;
    match image.decode() {
        Ok(bytes) => Some(Arc::new(Image::from_bytes(format, bytes))),
        Err(error) => {
            tracing::warn!(%error, "skipping thumbnail for attached image");
            None
        }
    }
}

fn shows_thumbnail(message: &Message) -> bool {
    message
        .image
        .as_ref()
        .is_some_and(|image| thumbnail_format(image.media_type).is_some())
}

fn layout_hash(message: &Message) -> u64 {
    let mut hasher = DefaultHasher::new();

    hasher.write_u64(message.id.0);
    hasher.write_u8(match message.role {
        Role::User => 0,
        Role::Model => 1,
    });
    hasher.write_u8(u8::from(message.has_image()));
    hasher.write(message.content.as_bytes());
    hasher.finish()
}

fn estimate_message_height(message: &Message, content_width: Pixels) -> Pixels {
    match message.role {
        Role::User => {
            let bubble_width = min_pixels(content_width, USER_BUBBLE_MAX_WIDTH);
            let text_width = max_pixels(px(1.), bubble_width - USER_BUBBLE_PADDING_X * 2);
            let mut height = USER_BUBBLE_PADDING_Y * 2;
            if !message.content.is_empty() {
                height += estimate_text_height(&message.content, text_width);
            }
            if shows_thumbnail(message) {
                height += THUMBNAIL_HEIGHT + IMAGE_BADGE_GAP;
            }
            if message.has_image() {
                height += IMAGE_BADGE_HEIGHT;
                if !message.content.is_empty() {
                    height += IMAGE_BADGE_GAP;
                }
            }
            height
        }
        Role::Model => {
            MODEL_LABEL_HEIGHT
                + MODEL_LABEL_GAP
                + estimate_text_height(&message.content, content_width)
        }
    }
}

fn estimate_text_height(content: &str, width: Pixels) -> Pixels {
    if content.is_empty() {
        return ESTIMATED_TEXT_LINE_HEIGHT;
    }

    let chars_per_line = (f32::from(width) / ESTIMATED_CHAR_WIDTH).floor().max(1.0) as usize;

    let mut line_count = 0usize;
    for line in content.lines() {
        let char_count = line.chars().count().max(1);
        line_count += char_count.div_ceil(chars_per_line);
    }

    if content.ends_with('\n') {
        line_count += 1;
    }

    ESTIMATED_TEXT_LINE_HEIGHT * line_count.max(1)
}

fn max_pixels(a: Pixels, b: Pixels) -> Pixels {
    if f32::from(a) >= f32::from(b) { a } else { b }
}

fn min_pixels(a: Pixels, b: Pixels) -> Pixels {
    if f32::from(a) <= f32::from(b) { a } else { b }
}

fn pixels_changed(a: Pixels, b: Pixels) -> bool {
    (f32::from(a) - f32::from(b)).abs() > 0.5
}
