//! Emotion tags carried by generated replies
//!
//! The dialogue generator is asked to finish every reply with a bracketed
//! tag such as `[happy]`. [`parse_reply`] splits that tag off so the device
//! can show the expression and speak only the sentence itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Expression shown by the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Worried,
    Sleepy,
    Excited,
    Thinking,
}

impl Emotion {
    /// Every emotion, in prompt order
    pub const ALL: [Self; 6] = [
        Self::Happy,
        Self::Worried,
        Self::Sleepy,
        Self::Excited,
        Self::Thinking,
        Self::Neutral,
    ];

    /// Tag text as it appears inside the brackets
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Worried => "worried",
            Self::Sleepy => "sleepy",
            Self::Excited => "excited",
            Self::Thinking => "thinking",
        }
    }

    /// Physical gesture that accompanies this emotion
    #[must_use]
    pub const fn gesture(self) -> Gesture {
        match self {
            Self::Neutral => Gesture::Rest,
            Self::Happy => Gesture::Sway,
            Self::Worried => Gesture::Droop,
            Self::Sleepy => Gesture::Nod,
            Self::Excited => Gesture::Bounce,
            Self::Thinking => Gesture::Tilt,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag text did not name a known emotion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEmotion(pub String);

impl fmt::Display for UnknownEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown emotion: {}", self.0)
    }
}

impl std::error::Error for UnknownEmotion {}

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(tag))
            .ok_or_else(|| UnknownEmotion(tag.to_string()))
    }
}

/// Movement the device performs alongside an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    Rest,
    Sway,
    Droop,
    Nod,
    Bounce,
    Tilt,
}

/// A generated reply split into its spoken text and emotion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub emotion: Emotion,
    pub text: String,
}

impl ParsedReply {
    #[must_use]
    pub fn new(emotion: Emotion, text: impl Into<String>) -> Self {
        Self {
            emotion,
            text: text.into(),
        }
    }
}

/// Split a trailing `[emotion]` tag off a generated reply
///
/// Only a tag at the very end of the reply (trailing whitespace ignored)
/// is recognized. Without a recognizable tag the emotion is
/// [`Emotion::Neutral`] and the whole reply is spoken as-is.
#[must_use]
pub fn parse_reply(raw: &str) -> ParsedReply {
    match split_tag(raw) {
        Some((body, emotion)) => ParsedReply::new(emotion, body.trim_end()),
        None => ParsedReply::new(Emotion::Neutral, raw.trim()),
    }
}

fn split_tag(raw: &str) -> Option<(&str, Emotion)> {
    let trimmed = raw.trim_end();
    let inner_end = trimmed.strip_suffix(']')?;
    let open = inner_end.rfind('[')?;
    let tag = &inner_end[open + 1..];

    if tag.contains(']') {
        return None;
    }

    let emotion = tag.parse().ok()?;
    Some((&trimmed[..open], emotion))
}
