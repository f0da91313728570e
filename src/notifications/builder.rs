//! Rendering of content items into destination-agnostic messages
//!
//! The builder owns every platform-specific presentation rule: caption
//! hyperlinking and escaping, media link fields with their size budget,
//! collage attachments for multi-image posts, and the per-kind styles.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;

use super::compositor::ImageCompositor;
use super::{Attachment, Embed, EmbedAuthor, EmbedField, EmbedFooter, EmbedImage, RenderedMessage};
use crate::models::{
    ContentItem, ItemPayload, MediaKind, OwnerProfile, Platform, PostMedia, PostPayload,
    SidecarChild, StoryPayload, TemporaryMedia, VideoPayload, VideoType,
};
use crate::storage::SharedStore;

/// Maximum embed description length
pub const CAPTION_LIMIT: usize = 2048;

/// Maximum embed field value length
pub const FIELD_LIMIT: usize = 1024;

const COLLAGE_CANVAS: (u32, u32) = (900, 600);
const COLLAGE_TILE: (u32, u32) = (600, 300);
const VLIVE_THUMBNAIL_HINT: &str = "?type=f886_499";

const INSTAGRAM_ICON: &str = "https://i.imgur.com/NNzsisb.png";
const VLIVE_ICON: &str = "https://i.imgur.com/gHo7BTO.png";

// `@handle` and `#tag` tokens end at whitespace or ASCII punctuation other than `_`
static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([@#])([^ \n!-/:-@\[-\^`\{-~]+)").unwrap());

static DOT_LINES_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\n\.)+").unwrap());

/// Presentation variant of a rendered item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Photo,
    Video,
    Carousel,
    Story,
    Live,
    Upload,
}

impl MessageKind {
    pub fn of(item: &ContentItem) -> Self {
        match &item.payload {
            ItemPayload::Post(post) => match post.media {
                PostMedia::Image { .. } => Self::Photo,
                PostMedia::Video { .. } => Self::Video,
                PostMedia::Sidecar { .. } => Self::Carousel,
            },
            ItemPayload::Story(_) => Self::Story,
            ItemPayload::Video(video) if video.video_type == VideoType::Live => Self::Live,
            ItemPayload::Video(_) => Self::Upload,
        }
    }
}

/// Static styling for one (platform, kind) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    /// Embed title, or the prefix placed before the video title on VLIVE
    pub title: &'static str,
    /// Embed colour; VLIVE channels override it with their own colour
    pub color: u32,
    pub footer: &'static str,
    pub footer_icon: &'static str,
}

impl Style {
    pub fn lookup(platform: Platform, kind: MessageKind) -> Self {
        use MessageKind::*;

        let (title, color, footer, footer_icon) = match (platform, kind) {
            (Platform::Instagram, Photo) => ("New Photo", 0xffffff, "Instagram", INSTAGRAM_ICON),
            (Platform::Instagram, Video) => ("New Video", 0xffffff, "Instagram", INSTAGRAM_ICON),
            (Platform::Instagram, Story) => {
                ("New Story", 0xe64c5b, "Instagram Stories", INSTAGRAM_ICON)
            }
            (Platform::Instagram, _) => ("New Post", 0xffffff, "Instagram", INSTAGRAM_ICON),
            (Platform::Vlive, Live) => ("**[LIVE]** ", 0x54f7ff, "VLIVE", VLIVE_ICON),
            (Platform::Vlive, _) => ("**[VOD]** ", 0x54f7ff, "VLIVE", VLIVE_ICON),
        };

        Self {
            title,
            color,
            footer,
            footer_icon,
        }
    }

    fn footer(&self) -> EmbedFooter {
        EmbedFooter {
            text: self.footer.to_string(),
            icon_url: Some(self.footer_icon.to_string()),
        }
    }
}

/// Renders content items into [`RenderedMessage`]s
pub struct NotificationBuilder {
    store: SharedStore,
    compositor: Arc<dyn ImageCompositor>,
    media_base_url: String,
}

impl NotificationBuilder {
    pub fn new(
        store: SharedStore,
        compositor: Arc<dyn ImageCompositor>,
        media_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            compositor,
            media_base_url: media_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Render `item`, using `profile` for the author line when available
    pub async fn render(&self, item: &ContentItem, profile: Option<&OwnerProfile>) -> RenderedMessage {
        let style = Style::lookup(item.source.platform, MessageKind::of(item));

        match &item.payload {
            ItemPayload::Post(post) => self.render_post(item, post, profile, style).await,
            ItemPayload::Story(story) => render_story(item, story, profile, style),
            ItemPayload::Video(video) => render_video(item, video, style),
        }
    }

    async fn render_post(
        &self,
        item: &ContentItem,
        post: &PostPayload,
        profile: Option<&OwnerProfile>,
        style: Style,
    ) -> RenderedMessage {
        let url = format!("https://www.instagram.com/p/{}/", post.shortcode);
        let mut embed = Embed {
            author: Some(instagram_author(&post.owner_username, profile)),
            title: Some(style.title.to_string()),
            description: post.caption.as_deref().map(format_caption),
            url: Some(url.clone()),
            color: Some(style.color),
            footer: Some(style.footer()),
            timestamp: Some(item.published_at),
            ..Default::default()
        };
        let mut attachments = Vec::new();

        match &post.media {
            PostMedia::Image { display_url } => {
                embed.image = Some(image(display_url));
            }
            PostMedia::Video {
                display_url,
                video_url,
            } => {
                embed.image = Some(image(display_url));
                embed.fields.push(EmbedField {
                    name: "Video Link".to_string(),
                    value: format!("[`>`:film_frames:`<`]({video_url} \"Click to Watch Video\")"),
                    inline: false,
                });
            }
            PostMedia::Sidecar { children } => {
                let (images, videos): (Vec<&SidecarChild>, Vec<&SidecarChild>) =
                    children.iter().partition(|c| c.kind == MediaKind::Image);

                match images.as_slice() {
                    [] => embed.image = videos.first().map(|v| image(&v.display_url)),
                    [only] => embed.image = Some(image(&only.display_url)),
                    [first, ..] => match self.collage(&post.shortcode, &images).await {
                        Some(attachment) => {
                            embed.image = Some(image(&format!("attachment://{}", attachment.filename)));
                            attachments.push(attachment);
                        }
                        None => embed.image = Some(image(&first.display_url)),
                    },
                }

                if !images.is_empty() {
                    let links = self.cache_links(&images, MediaKind::Image).await;
                    embed.fields.push(EmbedField {
                        name: "Image Links".to_string(),
                        value: link_field(&links, "frame_photo", "Click to View Image"),
                        inline: true,
                    });
                }
                if !videos.is_empty() {
                    let links = self.cache_links(&videos, MediaKind::Video).await;
                    embed.fields.push(EmbedField {
                        name: "Video Links".to_string(),
                        value: link_field(&links, "film_frames", "Click to Watch Video"),
                        inline: true,
                    });
                }
            }
        }

        RenderedMessage {
            text: url,
            embed,
            attachments,
        }
    }

    async fn collage(&self, shortcode: &str, images: &[&SidecarChild]) -> Option<Attachment> {
        let urls: Vec<String> = images.iter().map(|c| c.display_url.clone()).collect();
        let (canvas_width, canvas_height) = COLLAGE_CANVAS;
        let (tile_width, tile_height) = COLLAGE_TILE;

        match self
            .compositor
            .composite(&urls, canvas_width, canvas_height, tile_width, tile_height)
            .await
        {
            Ok(data) => Some(Attachment {
                filename: format!("{shortcode}-media-collage.png"),
                content_type: "image/png".to_string(),
                data,
            }),
            Err(e) => {
                tracing::warn!(shortcode = %shortcode, error = %e, "Collage failed, using first image");
                None
            }
        }
    }

    /// Cache every child as temporary media and return its public links
    async fn cache_links(&self, children: &[&SidecarChild], kind: MediaKind) -> Vec<String> {
        let route = match kind {
            MediaKind::Image => "img",
            MediaKind::Video => "vid",
        };

        let mut links = Vec::with_capacity(children.len());
        for child in children {
            let target = match kind {
                MediaKind::Image => child.display_url.clone(),
                MediaKind::Video => child
                    .video_url
                    .clone()
                    .unwrap_or_else(|| child.display_url.clone()),
            };
            let media = TemporaryMedia {
                media_id: child.id.clone(),
                kind,
                url: target,
                cached_at: Utc::now(),
            };
            if let Err(e) = self.store.cache_temporary_media(&media).await {
                tracing::warn!(media = %child.id, error = %e, "Failed to cache media link");
            }
            links.push(format!("{}/insta/{route}/{}", self.media_base_url, child.id));
        }
        links
    }
}

fn render_story(
    item: &ContentItem,
    story: &StoryPayload,
    profile: Option<&OwnerProfile>,
    style: Style,
) -> RenderedMessage {
    let url = format!("https://www.instagram.com/stories/{}/", story.owner_username);
    let embed = Embed {
        author: Some(instagram_author(&story.owner_username, profile)),
        title: Some(style.title.to_string()),
        description: story
            .video_url
            .as_ref()
            .map(|src| format!("[\\▶ Video Link]({src} \"Click to Watch Video\")")),
        url: Some(url.clone()),
        color: Some(style.color),
        image: Some(image(&story.display_url)),
        footer: Some(style.footer()),
        timestamp: Some(item.published_at),
        ..Default::default()
    };

    RenderedMessage {
        text: url,
        embed,
        attachments: Vec::new(),
    }
}

fn render_video(item: &ContentItem, video: &VideoPayload, style: Style) -> RenderedMessage {
    let url = format!("https://www.vlive.tv/video/{}/", video.video_seq);
    let status = if video.video_type == VideoType::Live {
        "Now Live!"
    } else {
        "New Upload"
    };

    let embed = Embed {
        author: Some(EmbedAuthor {
            name: format!("{} - {status}", video.channel_name),
            url: Some(format!(
                "https://channels.vlive.tv/{}/home",
                video.channel.channel_code
            )),
            icon_url: video.channel.profile_image.clone(),
        }),
        title: Some(format!("{}{}", style.title, video.title)),
        url: Some(url.clone()),
        color: Some(video.channel.color.unwrap_or(style.color)),
        image: video
            .thumbnail
            .as_ref()
            .map(|thumbnail| image(&format!("{thumbnail}{VLIVE_THUMBNAIL_HINT}"))),
        footer: Some(style.footer()),
        timestamp: Some(item.published_at),
        ..Default::default()
    };

    RenderedMessage {
        text: url,
        embed,
        attachments: Vec::new(),
    }
}

fn instagram_author(owner_username: &str, profile: Option<&OwnerProfile>) -> EmbedAuthor {
    EmbedAuthor {
        name: match profile {
            Some(p) => format!("{} (@{})", p.full_name, p.username),
            None => owner_username.to_string(),
        },
        url: Some(format!("https://www.instagram.com/{owner_username}/")),
        icon_url: profile.and_then(|p| p.avatar_url.clone()),
    }
}

fn image(url: &str) -> EmbedImage {
    EmbedImage {
        url: url.to_string(),
    }
}

enum Segment {
    Text(String),
    Link(String),
}

/// Hyperlink handles and tags, collapse the first run of `\n.` lines, and
/// escape formatting characters outside the generated links
///
/// Falls back to the escaped original, cut to [`CAPTION_LIMIT`], when the
/// formatted caption is too long.
pub fn format_caption(caption: &str) -> String {
    let mut segments = Vec::new();
    let mut last = 0;

    for captures in TOKEN_REGEX.captures_iter(caption) {
        let (Some(token), Some(sigil), Some(name)) = (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        if token.start() > last {
            segments.push(Segment::Text(caption[last..token.start()].to_string()));
        }
        let name = name.as_str();
        segments.push(Segment::Link(match sigil.as_str() {
            "@" => format!("[@{name}](https://www.instagram.com/{name}/ \"View @{name} on Instagram\")"),
            _ => format!(
                "[#{name}](https://www.instagram.com/explore/tags/{name}/ \"Explore #{name} on Instagram\")"
            ),
        }));
        last = token.end();
    }
    if last < caption.len() {
        segments.push(Segment::Text(caption[last..].to_string()));
    }

    for segment in &mut segments {
        if let Segment::Text(text) = segment {
            if DOT_LINES_REGEX.is_match(text) {
                let collapsed = DOT_LINES_REGEX.replace(text, "\n").into_owned();
                *text = collapsed;
                break;
            }
        }
    }

    let formatted: String = segments
        .iter()
        .map(|s| match s {
            Segment::Text(t) => escape_markdown(t),
            Segment::Link(l) => l.clone(),
        })
        .collect();

    if formatted.chars().count() > CAPTION_LIMIT {
        return escape_markdown_within(caption, CAPTION_LIMIT);
    }
    formatted
}

fn needs_escape(c: char) -> bool {
    matches!(c, '`' | '*' | '~' | '_')
}

/// Backslash-escape `` ` * ~ _ ``
pub fn escape_markdown(text: &str) -> String {
    escape_markdown_within(text, usize::MAX)
}

/// Escape `text`, stopping before the output would exceed `max_chars`
///
/// An escape and the character it protects are never split.
pub fn escape_markdown_within(text: &str, max_chars: usize) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut len = 0usize;
    for c in text.chars() {
        let width = if needs_escape(c) { 2 } else { 1 };
        if len.saturating_add(width) > max_chars {
            break;
        }
        if width == 2 {
            escaped.push('\\');
        }
        escaped.push(c);
        len += width;
    }
    escaped
}

/// Numbered link list within [`FIELD_LIMIT`]
///
/// The first entry that would overflow is replaced by up to three dots.
pub fn link_field(links: &[String], emoji: &str, hover: &str) -> String {
    let mut value = String::new();
    let mut len = 0;

    for (index, link) in links.iter().enumerate() {
        let entry = format!(" [`{}`:{emoji}:]({link} \"{hover}\")", index + 1);
        let entry_len = entry.chars().count();
        if len + entry_len > FIELD_LIMIT {
            value.push_str(&".".repeat((FIELD_LIMIT - len).min(3)));
            break;
        }
        value.push_str(&entry);
        len += entry_len;
    }

    value.trim().to_string()
}
