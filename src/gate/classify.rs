//! The gate decision — pure, deterministic, priority-ordered rules.
//!
//! First match wins:
//! 1. denylist → skip
//! 2. non-textual content → skip
//! 3. manual trigger / force → skip below hard word floor, else automatic
//! 4. non-reading surface → skip
//! 5. manual mode → wait
//! 6. allowlist hit or confident article signals → automatic
//! 7. medium-confidence signals (assisted mode) → prompt
//! 8. otherwise → wait

use serde::{Deserialize, Serialize};

use crate::config::{PolicyConfig, PolicyMode};
use crate::gate::signals::{DocumentProfile, TriggerKind};

/// Hard word-count floor below which even a manual trigger is skipped.
pub const MANUAL_MIN_WORDS: usize = 80;

/// Text density required for confident unassisted processing.
const CONFIDENT_TEXT_DENSITY: f32 = 0.4;

/// Text density required for the assisted prompt.
const ASSISTED_TEXT_DENSITY: f32 = 0.25;

/// What to do with a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    /// Never process this content.
    Skip,
    /// Process without asking.
    Automatic,
    /// Ask the user before processing.
    Prompt,
    /// Do nothing until the user explicitly triggers processing.
    Wait,
}

/// Why the gate decided what it decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    Denylist,
    NonText,
    TooShort,
    ManualTrigger,
    NonReader,
    ManualMode,
    Allowlist,
    ArticleConfident,
    MediumConfidence,
    LowConfidence,
}

impl GateReason {
    /// Stable reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Denylist => "denylist",
            Self::NonText => "non_text",
            Self::TooShort => "too_short",
            Self::ManualTrigger => "manual_trigger",
            Self::NonReader => "non_reader",
            Self::ManualMode => "manual_mode",
            Self::Allowlist => "allowlist",
            Self::ArticleConfident => "article_confident",
            Self::MediumConfidence => "medium_confidence",
            Self::LowConfidence => "low_confidence",
        }
    }
}

impl std::fmt::Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The gating decision for one piece of content.
///
/// Skip and wait verdicts are ordinary outcomes, never errors — they
/// present as "nothing happened, here's why".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub action: GateAction,
    pub reason: GateReason,
}

impl Verdict {
    pub fn skip(reason: GateReason) -> Self {
        Self {
            action: GateAction::Skip,
            reason,
        }
    }

    pub fn automatic(reason: GateReason) -> Self {
        Self {
            action: GateAction::Automatic,
            reason,
        }
    }

    pub fn prompt(reason: GateReason) -> Self {
        Self {
            action: GateAction::Prompt,
            reason,
        }
    }

    pub fn wait(reason: GateReason) -> Self {
        Self {
            action: GateAction::Wait,
            reason,
        }
    }
}

/// Classify fetched content against the user's policy.
///
/// Pure and side-effect free; all inputs are pre-validated by the
/// extractor, so there are no failure modes.
pub fn classify(
    profile: &DocumentProfile,
    policy: &PolicyConfig,
    trigger: TriggerKind,
    force: bool,
) -> Verdict {
    let signals = &profile.signals;
    let words = signals.word_count;

    if policy.denies(&profile.source) {
        return Verdict::skip(GateReason::Denylist);
    }

    if !profile.kind.is_textual() {
        return Verdict::skip(GateReason::NonText);
    }

    // Manual intent overrides every heuristic except the hard word floor.
    if trigger == TriggerKind::Manual || force {
        return if words < MANUAL_MIN_WORDS {
            Verdict::skip(GateReason::TooShort)
        } else {
            Verdict::automatic(GateReason::ManualTrigger)
        };
    }

    // Checked before mode-specific logic: a non-reading surface is never
    // worth processing regardless of policy.
    if signals.non_reading_surface() {
        return Verdict::skip(GateReason::NonReader);
    }

    if policy.mode == PolicyMode::Manual {
        return Verdict::wait(GateReason::ManualMode);
    }

    // High confidence. An allowlist hit uses the lower prompt threshold —
    // an explicit allowlist entry is a stronger trust signal than
    // unassisted heuristics.
    if policy.allows(&profile.source) && words >= policy.prompt_min_words {
        return Verdict::automatic(GateReason::Allowlist);
    }
    if signals.has_reader_marker()
        && signals.text_density > CONFIDENT_TEXT_DENSITY
        && words >= policy.auto_min_words
    {
        return Verdict::automatic(GateReason::ArticleConfident);
    }

    // Medium confidence, assisted mode only.
    if policy.mode == PolicyMode::Assisted
        && (signals.has_main || signals.has_reader_marker())
        && words >= policy.prompt_min_words
        && signals.text_density > ASSISTED_TEXT_DENSITY
    {
        return Verdict::prompt(GateReason::MediumConfidence);
    }

    Verdict::wait(GateReason::LowConfidence)
}
