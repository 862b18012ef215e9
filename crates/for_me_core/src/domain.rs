//! crates/for_me_core/src/domain.rs
//!
//! Defines the pure, core data structures for the journal.
//! These structs are independent of any document store or wire format.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Top-level collection holding one document per user.
pub const RECORDS_COLLECTION: &str = "DailyRecords";
/// Per-user subcollection holding one document per calendar day.
pub const RECORDS_SUBCOLLECTION: &str = "records";

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

//=========================================================================================
// Identity
//=========================================================================================

/// Opaque, stable per-installation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//=========================================================================================
// DateKey
//=========================================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("'{0}' is not a YYYY-MM-DD date")]
pub struct DateKeyError(pub String);

/// Canonical storage key for a calendar day, always rendered as `YYYY-MM-DD`.
///
/// The rendering does not depend on locale or timezone; the wrapped value is
/// already a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_KEY_FORMAT))
    }
}

impl FromStr for DateKey {
    type Err = DateKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // chrono accepts unpadded fields; the key format is strictly 10 chars.
        if s.len() != 10 {
            return Err(DateKeyError(s.to_string()));
        }
        NaiveDate::parse_from_str(s, DATE_KEY_FORMAT)
            .map(Self)
            .map_err(|_| DateKeyError(s.to_string()))
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

//=========================================================================================
// Daily records
//=========================================================================================

/// Mood score for a day. `0` means unset, `1..=5` are user ratings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MAX: u8 = 5;
    pub const UNSET: Score = Score(0);

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0 > 0
    }
}

impl TryFrom<u8> for Score {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Score::new(value).ok_or_else(|| format!("score {} is outside 0..={}", value, Score::MAX))
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

/// The fields a client writes for a day. `summary: None` means "leave the
/// stored summary alone", never "clear it".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFields {
    pub date: DateKey,
    pub score: Score,
    pub tasks: Vec<String>,
    pub summary: Option<String>,
}

/// A persisted day, as read back from the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: DateKey,
    pub score: Score,
    pub tasks: Vec<String>,
    pub summary: Option<String>,
    /// Server-assigned on first save, never modified afterwards.
    pub created_at: Option<DateTime<Utc>>,
    /// Server-assigned on every save.
    pub updated_at: Option<DateTime<Utc>>,
}

impl DailyRecord {
    /// True when the day carries anything worth marking on a calendar.
    pub fn has_content(&self) -> bool {
        self.score.is_set() || !self.tasks.is_empty()
    }
}

/// Builds the document path `DailyRecords/{userId}/records/{dateKey}`.
pub fn record_document_path(user_id: &UserId, date: &DateKey) -> String {
    format!("{}/{}", records_collection_path(user_id), date)
}

/// Builds the collection path `DailyRecords/{userId}/records`.
pub fn records_collection_path(user_id: &UserId) -> String {
    format!("{}/{}/{}", RECORDS_COLLECTION, user_id, RECORDS_SUBCOLLECTION)
}

//=========================================================================================
// Conversation
//=========================================================================================

/// Who produced a visible transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
    /// A failure notice shown to the user in place of an assistant reply.
    Error,
}

/// A single entry in the UI-visible transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub text: String,
    pub speaker: Speaker,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { text: text.into(), speaker: Speaker::User }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { text: text.into(), speaker: Speaker::Assistant }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), speaker: Speaker::Error }
    }

    pub fn is_from_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}

/// Role of a message sent to the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A message in the service-facing request history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

//=========================================================================================
// Ads
//=========================================================================================

/// The three independent ad units the app shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdSurface {
    Banner,
    Interstitial,
    Rewarded,
}

impl AdSurface {
    pub const ALL: [AdSurface; 3] = [AdSurface::Banner, AdSurface::Interstitial, AdSurface::Rewarded];

    /// Full-screen surfaces are consumed by a presentation; the banner is not.
    pub fn is_full_screen(&self) -> bool {
        !matches!(self, AdSurface::Banner)
    }
}

impl fmt::Display for AdSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdSurface::Banner => "banner",
            AdSurface::Interstitial => "interstitial",
            AdSurface::Rewarded => "rewarded",
        };
        f.write_str(name)
    }
}
