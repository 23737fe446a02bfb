//! Structural signals describing fetched content.
//!
//! Computed by the `SignalExtractor` collaborator before a request enters
//! the gate. They are heuristic indicators, not hard state — the gate turns
//! them into a verdict, it never re-derives them.

use serde::{Deserialize, Serialize};

/// Broad content type of a fetched source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Html,
    PlainText,
    Pdf,
    Image,
    Video,
    Binary,
}

impl ContentKind {
    /// Whether this kind carries processable text.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Html | Self::PlainText | Self::Pdf)
    }
}

/// What initiated a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// The user explicitly asked.
    Manual,
    /// Content arrival triggered the request.
    Auto,
}

/// Structural indicators of fetched content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentSignals {
    /// Mostly chrome and navigation, little content (SPA shell).
    pub app_shell: bool,
    /// Dashboard-like layout (widgets, charts, dense controls).
    pub dashboard: bool,
    /// Search results, cart, or checkout surface.
    pub search_or_cart: bool,
    /// Infinite-scroll or social feed.
    pub feed_like: bool,
    /// Rendering dominated by canvas/WebGL.
    pub canvas_heavy: bool,
    /// Buttons per paragraph.
    pub button_paragraph_ratio: f32,
    /// Share of visible text inside links.
    pub link_density: f32,
    /// Share of markup that is visible text.
    pub text_density: f32,
    /// Number of heading elements.
    pub heading_count: usize,
    /// An `<article>` (or equivalent) marker is present.
    pub has_article: bool,
    /// A `<main>` (or equivalent) marker is present.
    pub has_main: bool,
    /// Visible word count.
    pub word_count: usize,
}

impl ContentSignals {
    /// Whether the signals indicate a non-reading surface — content that is
    /// never worth processing regardless of policy.
    pub fn non_reading_surface(&self) -> bool {
        self.app_shell
            || self.dashboard
            || self.search_or_cart
            || self.feed_like
            || self.canvas_heavy
            || self.button_paragraph_ratio > 2.0
            || self.link_density > 0.55
    }

    /// Whether any reader-content marker is present.
    pub fn has_reader_marker(&self) -> bool {
        self.has_article || self.heading_count > 0
    }
}

/// Everything the gate needs to know about one fetched source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProfile {
    /// Source locator (URL or equivalent); doubles as the resource key for
    /// admission.
    pub source: String,
    /// Broad content type.
    pub kind: ContentKind,
    /// Structural signals.
    pub signals: ContentSignals,
}

impl DocumentProfile {
    /// A textual profile with default signals (useful in tests).
    pub fn text(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: ContentKind::Html,
            signals: ContentSignals::default(),
        }
    }
}
