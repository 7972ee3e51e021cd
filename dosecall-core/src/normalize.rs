//! Event normalization: raw provider callbacks → [`CanonicalUpdate`]
//!
//! Each webhook payload is deserialized into a typed event struct and mapped
//! through exactly one authoritative table per event type. Raw provider
//! payloads never travel past this boundary; unrecognized codes normalize to
//! `unknown` with the raw code preserved in the audit note instead of failing.

use serde::Deserialize;

use crate::classify::classify;
use crate::error::{Error, Result};
use crate::types::{AnsweredBy, CallStatus, CanonicalUpdate, Direction, UpdateSource};

// ============================================
// Raw provider events
// ============================================

/// Call start callback (inbound call received or outbound leg connected)
#[derive(Debug, Clone, Deserialize)]
pub struct CallStartEvent {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    /// Caller number (the patient, for inbound calls)
    #[serde(rename = "From")]
    pub from: Option<String>,
    /// Dialed number (the patient, for outbound calls)
    #[serde(rename = "To")]
    pub to: Option<String>,
}

/// Answering-machine detection callback
#[derive(Debug, Clone, Deserialize)]
pub struct AmdEvent {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    /// Provider verdict: human, machine_start, machine_end_beep,
    /// machine_end_silence, machine_end_other, fax, unknown
    #[serde(rename = "AnsweredBy")]
    pub answered_by: Option<String>,
}

/// Speech recognition result callback
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechEvent {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    #[serde(rename = "Confidence")]
    pub confidence: Option<f64>,
}

/// No-speech-captured callback
#[derive(Debug, Clone, Deserialize)]
pub struct NoResponseEvent {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
}

/// Call progress / terminal status callback
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: Option<String>,
    /// Seconds, sent as a decimal string
    #[serde(rename = "CallDuration")]
    pub call_duration: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
}

// ============================================
// Normalization
// ============================================

/// Parse a JSON callback payload into its typed event.
pub fn from_json<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T> {
    Ok(serde_json::from_str(payload)?)
}

fn require_call_id(call_sid: &str) -> Result<()> {
    if call_sid.trim().is_empty() {
        return Err(Error::Validation("missing CallSid".to_string()));
    }
    Ok(())
}

/// Normalize a call start event.
///
/// Seeds session identity: the patient number is `From` for inbound calls
/// and `To` for outbound calls.
pub fn normalize_call_start(event: &CallStartEvent, direction: Direction) -> Result<CanonicalUpdate> {
    require_call_id(&event.call_sid)?;

    let phone_number = match direction {
        Direction::Inbound => event.from.clone(),
        Direction::Outbound => event.to.clone(),
    };
    let status = match direction {
        Direction::Inbound => CallStatus::Received,
        Direction::Outbound => CallStatus::Initiated,
    };

    let mut update = CanonicalUpdate::new(&event.call_sid, UpdateSource::CallStart);
    update.phone_number = phone_number;
    update.direction = Some(direction);
    update.status = Some(status);
    Ok(update)
}

/// Normalize an answering-machine detection result.
///
/// Every machine subtype collapses to `voicemail`; unrecognized verdicts
/// normalize to `unknown` with the raw code kept for diagnosis.
pub fn normalize_amd(event: &AmdEvent) -> Result<CanonicalUpdate> {
    require_call_id(&event.call_sid)?;

    let verdict = event.answered_by.as_deref().unwrap_or("unknown");

    let (answered_by, status, note) = match verdict {
        "human" => (AnsweredBy::Human, CallStatus::Answered, None),
        "fax" => (AnsweredBy::Fax, CallStatus::Fax, None),
        v if v.starts_with("machine") => (AnsweredBy::Voicemail, CallStatus::Voicemail, None),
        "unknown" => (AnsweredBy::Unknown, CallStatus::Unknown, None),
        other => (
            AnsweredBy::Unknown,
            CallStatus::Unknown,
            Some(format!("unrecognized AMD verdict '{}'", other)),
        ),
    };

    let mut update = CanonicalUpdate::new(&event.call_sid, UpdateSource::Amd);
    update.answered_by = Some(answered_by);
    update.status = Some(status);
    update.note = note;
    Ok(update)
}

/// Normalize a speech result: carries the transcript and its classification.
///
/// Does not touch `status`; the terminal outcome comes from the status
/// callback, which may race this event.
pub fn normalize_speech(event: &SpeechEvent) -> Result<CanonicalUpdate> {
    require_call_id(&event.call_sid)?;

    let transcript = event
        .speech_result
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation("missing SpeechResult".to_string()))?;

    let mut update = CanonicalUpdate::new(&event.call_sid, UpdateSource::Speech);
    update.response_text = Some(transcript.to_string());
    update.response_classification = Some(classify(transcript));
    Ok(update)
}

/// Normalize a no-response callback: the call connected but nobody answered
/// the prompt. Recorded as a tentative `answered_by` plus an audit note.
pub fn normalize_no_response(event: &NoResponseEvent) -> Result<CanonicalUpdate> {
    require_call_id(&event.call_sid)?;

    let mut update = CanonicalUpdate::new(&event.call_sid, UpdateSource::Speech);
    update.answered_by = Some(AnsweredBy::None);
    update.note = Some("no speech captured before timeout".to_string());
    Ok(update)
}

/// Normalize a call progress / terminal status callback.
///
/// `no-answer` additionally implies a tentative voicemail verdict and
/// `canceled` maps to `rejected`. Unrecognized progress codes normalize to
/// `unknown` with the raw code preserved in the note.
pub fn normalize_status(event: &StatusEvent) -> Result<CanonicalUpdate> {
    require_call_id(&event.call_sid)?;

    let code = event.call_status.as_deref().unwrap_or("").trim();
    if code.is_empty() {
        return Err(Error::Validation("missing CallStatus".to_string()));
    }

    let (status, answered_by, note) = match code {
        "ringing" => (CallStatus::Ringing, None, None),
        "in-progress" => (CallStatus::InProgress, None, None),
        "completed" => (CallStatus::Completed, None, None),
        "busy" => (CallStatus::Busy, None, None),
        "no-answer" => (CallStatus::Voicemail, Some(AnsweredBy::Voicemail), None),
        "canceled" => (CallStatus::Rejected, None, None),
        "failed" => (CallStatus::Failed, None, None),
        other => (
            CallStatus::Unknown,
            None,
            Some(format!("unrecognized call status '{}'", other)),
        ),
    };

    let mut update = CanonicalUpdate::new(&event.call_sid, UpdateSource::Progress);
    update.phone_number = event.to.clone();
    update.status = Some(status);
    update.answered_by = answered_by;
    update.duration_seconds = event.call_duration.as_deref().and_then(|d| d.parse().ok());
    update.note = note;
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseClassification;

    fn amd(verdict: &str) -> AmdEvent {
        AmdEvent {
            call_sid: "CA100".to_string(),
            answered_by: Some(verdict.to_string()),
        }
    }

    #[test]
    fn test_amd_machine_subtypes_collapse_to_voicemail() {
        for verdict in [
            "machine_start",
            "machine_end_beep",
            "machine_end_silence",
            "machine_end_other",
        ] {
            let update = normalize_amd(&amd(verdict)).unwrap();
            assert_eq!(update.answered_by, Some(AnsweredBy::Voicemail), "{}", verdict);
            assert_eq!(update.status, Some(CallStatus::Voicemail), "{}", verdict);
        }
    }

    #[test]
    fn test_amd_human_and_fax() {
        let update = normalize_amd(&amd("human")).unwrap();
        assert_eq!(update.answered_by, Some(AnsweredBy::Human));
        assert_eq!(update.status, Some(CallStatus::Answered));

        let update = normalize_amd(&amd("fax")).unwrap();
        assert_eq!(update.answered_by, Some(AnsweredBy::Fax));
        assert_eq!(update.status, Some(CallStatus::Fax));
    }

    #[test]
    fn test_amd_unrecognized_verdict_keeps_raw_code() {
        let update = normalize_amd(&amd("robot_uprising")).unwrap();
        assert_eq!(update.answered_by, Some(AnsweredBy::Unknown));
        assert_eq!(update.status, Some(CallStatus::Unknown));
        assert!(update.note.as_ref().unwrap().contains("robot_uprising"));
    }

    #[test]
    fn test_status_mapping_table() {
        let cases = [
            ("ringing", CallStatus::Ringing, None),
            ("in-progress", CallStatus::InProgress, None),
            ("completed", CallStatus::Completed, None),
            ("busy", CallStatus::Busy, None),
            ("no-answer", CallStatus::Voicemail, Some(AnsweredBy::Voicemail)),
            ("canceled", CallStatus::Rejected, None),
            ("failed", CallStatus::Failed, None),
        ];
        for (code, status, answered_by) in cases {
            let event = StatusEvent {
                call_sid: "CA100".to_string(),
                call_status: Some(code.to_string()),
                call_duration: None,
                to: None,
            };
            let update = normalize_status(&event).unwrap();
            assert_eq!(update.status, Some(status), "{}", code);
            assert_eq!(update.answered_by, answered_by, "{}", code);
        }
    }

    #[test]
    fn test_status_unrecognized_code_preserved_in_note() {
        let event = StatusEvent {
            call_sid: "CA100".to_string(),
            call_status: Some("queued-weirdly".to_string()),
            call_duration: None,
            to: None,
        };
        let update = normalize_status(&event).unwrap();
        assert_eq!(update.status, Some(CallStatus::Unknown));
        assert!(update.note.as_ref().unwrap().contains("queued-weirdly"));
    }

    #[test]
    fn test_status_duration_parsing() {
        let event = StatusEvent {
            call_sid: "CA100".to_string(),
            call_status: Some("completed".to_string()),
            call_duration: Some("12".to_string()),
            to: None,
        };
        let update = normalize_status(&event).unwrap();
        assert_eq!(update.duration_seconds, Some(12));

        let event = StatusEvent {
            call_duration: Some("not-a-number".to_string()),
            ..event
        };
        assert_eq!(normalize_status(&event).unwrap().duration_seconds, None);
    }

    #[test]
    fn test_speech_result_classified() {
        let event = SpeechEvent {
            call_sid: "CA100".to_string(),
            speech_result: Some("Yes I have".to_string()),
            confidence: Some(0.92),
        };
        let update = normalize_speech(&event).unwrap();
        assert_eq!(update.response_text.as_deref(), Some("Yes I have"));
        assert_eq!(
            update.response_classification,
            Some(ResponseClassification::Affirmative)
        );
        assert_eq!(update.status, None);
    }

    #[test]
    fn test_call_start_identity() {
        let event = CallStartEvent {
            call_sid: "CA100".to_string(),
            from: Some("+15551234567".to_string()),
            to: Some("+15559876543".to_string()),
        };

        let update = normalize_call_start(&event, Direction::Inbound).unwrap();
        assert_eq!(update.phone_number.as_deref(), Some("+15551234567"));
        assert_eq!(update.status, Some(CallStatus::Received));

        let update = normalize_call_start(&event, Direction::Outbound).unwrap();
        assert_eq!(update.phone_number.as_deref(), Some("+15559876543"));
        assert_eq!(update.status, Some(CallStatus::Initiated));
    }

    #[test]
    fn test_missing_call_id_is_validation_error() {
        let event = AmdEvent {
            call_sid: "".to_string(),
            answered_by: Some("human".to_string()),
        };
        assert!(matches!(
            normalize_amd(&event),
            Err(Error::Validation(_))
        ));
    }
}
