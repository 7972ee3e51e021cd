//! Core domain types for dosecall
//!
//! These types form the canonical data model for call sessions. Raw provider
//! payloads never travel past the event normalizer; everything downstream
//! works with [`CallSession`] and [`CanonicalUpdate`].
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **CallSession** | One record per inbound or outbound call attempt |
//! | **Call ID** | Provider-assigned identifier, unique per attempt, primary key |
//! | **AMD** | Answering-machine detection: the provider's human/machine verdict |
//! | **CanonicalUpdate** | A sparse, typed partial update produced by the normalizer |
//! | **Source** | Which callback produced an update; drives field precedence |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Direction
// ============================================

/// Whether the patient called us or we called the patient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            _ => Err(format!("unknown direction: {}", s)),
        }
    }
}

// ============================================
// Call status
// ============================================

/// Authoritative call status.
///
/// `Fax` is included because an AMD fax verdict maps to it; the provider's
/// progress codes never produce it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Inbound call observed
    Received,
    /// Outbound call placed
    Initiated,
    Ringing,
    InProgress,
    /// A human picked up (AMD verdict)
    Answered,
    Busy,
    /// Machine picked up, or the call was never answered
    Voicemail,
    /// Fax machine picked up (AMD verdict)
    Fax,
    /// Call was canceled before connecting
    Rejected,
    Failed,
    Completed,
    Unknown,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Received => "received",
            CallStatus::Initiated => "initiated",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in_progress",
            CallStatus::Answered => "answered",
            CallStatus::Busy => "busy",
            CallStatus::Voicemail => "voicemail",
            CallStatus::Fax => "fax",
            CallStatus::Rejected => "rejected",
            CallStatus::Failed => "failed",
            CallStatus::Completed => "completed",
            CallStatus::Unknown => "unknown",
        }
    }

    /// Whether this status may no longer be reverted by a non-AMD event.
    ///
    /// `Voicemail` becomes terminal once the backup message has been
    /// triggered; until then a later AMD refinement may still change it.
    pub fn is_terminal(&self, fallback_notified: bool) -> bool {
        match self {
            CallStatus::Completed | CallStatus::Failed | CallStatus::Rejected => true,
            CallStatus::Voicemail => fallback_notified,
            _ => false,
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(CallStatus::Received),
            "initiated" => Ok(CallStatus::Initiated),
            "ringing" => Ok(CallStatus::Ringing),
            "in_progress" => Ok(CallStatus::InProgress),
            "answered" => Ok(CallStatus::Answered),
            "busy" => Ok(CallStatus::Busy),
            "voicemail" => Ok(CallStatus::Voicemail),
            "fax" => Ok(CallStatus::Fax),
            "rejected" => Ok(CallStatus::Rejected),
            "failed" => Ok(CallStatus::Failed),
            "completed" => Ok(CallStatus::Completed),
            "unknown" => Ok(CallStatus::Unknown),
            _ => Err(format!("unknown call status: {}", s)),
        }
    }
}

// ============================================
// AMD verdict
// ============================================

/// Who (or what) answered the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnsweredBy {
    Human,
    Voicemail,
    Fax,
    /// Call connected but nobody responded to the prompt
    None,
    Unknown,
}

impl AnsweredBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnsweredBy::Human => "human",
            AnsweredBy::Voicemail => "voicemail",
            AnsweredBy::Fax => "fax",
            AnsweredBy::None => "none",
            AnsweredBy::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for AnsweredBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(AnsweredBy::Human),
            "voicemail" => Ok(AnsweredBy::Voicemail),
            "fax" => Ok(AnsweredBy::Fax),
            "none" => Ok(AnsweredBy::None),
            "unknown" => Ok(AnsweredBy::Unknown),
            _ => Err(format!("unknown answered_by: {}", s)),
        }
    }
}

// ============================================
// Response classification
// ============================================

/// Keyword classification of the patient's spoken reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseClassification {
    Affirmative,
    Negative,
    Unclear,
}

impl ResponseClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseClassification::Affirmative => "affirmative",
            ResponseClassification::Negative => "negative",
            ResponseClassification::Unclear => "unclear",
        }
    }
}

impl std::str::FromStr for ResponseClassification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "affirmative" => Ok(ResponseClassification::Affirmative),
            "negative" => Ok(ResponseClassification::Negative),
            "unclear" => Ok(ResponseClassification::Unclear),
            _ => Err(format!("unknown classification: {}", s)),
        }
    }
}

// ============================================
// Update source
// ============================================

/// Which callback produced a [`CanonicalUpdate`].
///
/// `Amd` outranks `Progress` for `status`/`answered_by`: an explicit
/// machine-detection verdict is never overwritten by an inference from a
/// generic progress code, regardless of arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// Call start (inbound received / outbound initiated)
    CallStart,
    /// Answering-machine detection result
    Amd,
    /// Speech recognition result
    Speech,
    /// Call progress / terminal status callback
    Progress,
}

impl UpdateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateSource::CallStart => "call_start",
            UpdateSource::Amd => "amd",
            UpdateSource::Speech => "speech",
            UpdateSource::Progress => "progress",
        }
    }
}

// ============================================
// Call session
// ============================================

/// One persisted record per call attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    /// Provider-assigned call identifier (primary key, immutable)
    pub call_id: String,
    /// Patient phone number, E.164
    pub phone_number: String,
    pub direction: Direction,
    /// Single authoritative status; see reconciler precedence rules
    pub status: CallStatus,
    /// AMD verdict or status-derived inference
    pub answered_by: Option<AnsweredBy>,
    /// Last captured utterance transcript
    pub response_text: Option<String>,
    /// Derived from `response_text` by the classifier
    pub response_classification: Option<ResponseClassification>,
    /// Call duration reported by the provider
    pub duration_seconds: Option<u32>,
    /// Audit trail: late/ignored events, unrecognized provider codes
    pub notes: Option<String>,
    /// An AMD verdict has been applied; generic status inferences are locked out
    pub amd_resolved: bool,
    /// The backup text message was triggered (at most once per session)
    pub fallback_notified: bool,
    /// Immutable after creation
    pub created_at: DateTime<Utc>,
    /// Set on every successful mutation
    pub updated_at: DateTime<Utc>,
}

// ============================================
// Canonical update
// ============================================

/// Sparse partial update produced by the event normalizer.
///
/// Only fields actually derivable from the incoming event are populated;
/// absent fields never null out existing session values.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalUpdate {
    pub call_id: String,
    pub source: UpdateSource,
    pub phone_number: Option<String>,
    pub direction: Option<Direction>,
    pub status: Option<CallStatus>,
    pub answered_by: Option<AnsweredBy>,
    pub response_text: Option<String>,
    pub response_classification: Option<ResponseClassification>,
    pub duration_seconds: Option<u32>,
    /// Audit note to append (e.g., an unrecognized provider code)
    pub note: Option<String>,
}

impl CanonicalUpdate {
    /// An empty update carrying only identity and source.
    pub fn new(call_id: impl Into<String>, source: UpdateSource) -> Self {
        Self {
            call_id: call_id.into(),
            source,
            phone_number: None,
            direction: None,
            status: None,
            answered_by: None,
            response_text: None,
            response_classification: None,
            duration_seconds: None,
            note: None,
        }
    }
}

// ============================================
// Notification decision
// ============================================

/// Why the fallback text message should be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyReason {
    /// The call landed in voicemail
    Voicemail,
    /// The call ended in an unknown state with no confirmed human answer
    Unreachable,
}

impl NotifyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyReason::Voicemail => "voicemail",
            NotifyReason::Unreachable => "unreachable",
        }
    }
}
