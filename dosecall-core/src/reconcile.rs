//! Session reconciliation
//!
//! Pure merge of the persisted session state with one incoming canonical
//! update. This is where the ordering guarantees live: the provider delivers
//! AMD results, speech results, and status callbacks in no particular order,
//! and the precedence rules here produce the same final state for any
//! interleaving of the same event set.
//!
//! Rules, in order:
//! - Absent session: synthesize a minimal one from the update.
//! - Fields apply only when present in the update.
//! - AMD-sourced `status`/`answered_by` always apply and lock out later
//!   status-derived inferences for those fields.
//! - Terminal statuses are never reverted by non-AMD events; late status
//!   changes land in `notes` for audit instead.
//! - Speech fields and duration are last-write-wins.
//! - Audit notes deduplicate, so replaying an event is a no-op.
//! - The fallback notification fires at most once per session; the decision
//!   is part of the merged state (`fallback_notified`), not a side effect.

use chrono::{DateTime, Utc};

use crate::types::{
    AnsweredBy, CallSession, CallStatus, CanonicalUpdate, Direction, NotifyReason, UpdateSource,
};

/// Result of reconciling one update against the stored session.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// The merged session state to persist
    pub session: CallSession,
    /// Whether the session did not exist before this update
    pub created: bool,
    /// Whether any field actually changed (false for replayed events)
    pub changed: bool,
    /// Fallback notification to trigger, at most once per session
    pub notify: Option<NotifyReason>,
}

/// Merge `update` into `existing`, or synthesize a new session when absent.
///
/// Pure with respect to its inputs; persistence is the caller's concern.
pub fn reconcile(
    existing: Option<&CallSession>,
    update: &CanonicalUpdate,
    now: DateTime<Utc>,
) -> Reconciled {
    let (mut session, created) = match existing {
        Some(session) => (session.clone(), false),
        None => (minimal_session(update, now), true),
    };
    let before = session.clone();

    // Identity: the call-start event is authoritative for who the patient
    // is; other sources only fill gaps. A session synthesized from an
    // out-of-order status callback carries the dialed number, which for an
    // inbound call is the service itself, so a late start event must be
    // able to correct both number and direction. call_id never changes.
    if let Some(phone) = &update.phone_number {
        if session.phone_number.is_empty() || update.source == UpdateSource::CallStart {
            session.phone_number = phone.clone();
        }
    }
    if update.source == UpdateSource::CallStart {
        if let Some(direction) = update.direction {
            session.direction = direction;
        }
    }

    merge_status_fields(&mut session, update);

    // Speech transcript and classification: last-write-wins, single source.
    if let Some(text) = &update.response_text {
        session.response_text = Some(text.clone());
    }
    if let Some(classification) = update.response_classification {
        session.response_classification = Some(classification);
    }

    // Duration: latest status callback carrying it wins.
    if let Some(duration) = update.duration_seconds {
        session.duration_seconds = Some(duration);
    }

    if let Some(note) = &update.note {
        append_note(&mut session, note);
    }

    let notify = notification_decision(&mut session, update);

    let changed = created || session != before;
    if changed {
        session.updated_at = now;
    }

    Reconciled {
        session,
        created,
        changed,
        notify,
    }
}

/// Seed a new session from an update for an unseen call id.
///
/// Late or out-of-order events may reference a call before its start event
/// arrives; identity fields default until a later event fills them in.
fn minimal_session(update: &CanonicalUpdate, now: DateTime<Utc>) -> CallSession {
    CallSession {
        call_id: update.call_id.clone(),
        phone_number: update.phone_number.clone().unwrap_or_default(),
        direction: update.direction.unwrap_or(Direction::Outbound),
        status: CallStatus::Unknown,
        answered_by: None,
        response_text: None,
        response_classification: None,
        duration_seconds: None,
        notes: None,
        amd_resolved: false,
        fallback_notified: false,
        created_at: now,
        updated_at: now,
    }
}

/// Apply `status`/`answered_by` under source precedence and the terminal guard.
fn merge_status_fields(session: &mut CallSession, update: &CanonicalUpdate) {
    if update.source == UpdateSource::Amd {
        // An explicit AMD verdict always applies, even over a terminal
        // status, and a later AMD result may refine an earlier one.
        if let Some(status) = update.status {
            session.status = status;
        }
        if let Some(answered_by) = update.answered_by {
            session.answered_by = Some(answered_by);
        }
        session.amd_resolved = true;
        return;
    }

    if let Some(status) = update.status {
        if status == session.status {
            // Replayed event; nothing to record.
        } else if update.source == UpdateSource::CallStart && session.status != CallStatus::Unknown {
            // A late start event only seeds a session that has no status
            // yet; it never rolls progress back.
        } else if session.amd_resolved || session.status.is_terminal(session.fallback_notified) {
            append_note(
                session,
                &format!(
                    "late status '{}' ignored (status already {})",
                    status, session.status
                ),
            );
        } else {
            session.status = status;
        }
    }

    if let Some(answered_by) = update.answered_by {
        // Status-derived inference never overwrites an AMD verdict, and a
        // no-speech inference never downgrades a stronger verdict (the
        // no-response and no-answer callbacks may race).
        let downgrade = answered_by == AnsweredBy::None
            && !matches!(session.answered_by, None | Some(AnsweredBy::None));
        if !session.amd_resolved && !downgrade {
            session.answered_by = Some(answered_by);
        }
    }
}

/// Append an audit note, skipping exact duplicates so replays stay no-ops.
fn append_note(session: &mut CallSession, note: &str) {
    match &mut session.notes {
        Some(notes) => {
            if !notes.lines().any(|line| line == note) {
                notes.push('\n');
                notes.push_str(note);
            }
        }
        None => session.notes = Some(note.to_string()),
    }
}

/// Decide whether this update pushes the session into a state that warrants
/// the backup text message. Flips `fallback_notified` so duplicate event
/// deliveries and later status callbacks never re-trigger it.
fn notification_decision(
    session: &mut CallSession,
    update: &CanonicalUpdate,
) -> Option<NotifyReason> {
    if session.fallback_notified {
        return None;
    }
    if session.answered_by == Some(AnsweredBy::Human) {
        return None;
    }

    // A gather timeout means nobody spoke to the prompt; the reminder goes
    // out by text instead.
    let no_speech =
        update.source == UpdateSource::Speech && update.answered_by == Some(AnsweredBy::None);

    let reason = if no_speech {
        NotifyReason::Unreachable
    } else if update.status.is_some() {
        // Otherwise only events carrying a status verdict can establish
        // voice delivery failure; transcripts and call starts never do.
        match session.status {
            CallStatus::Voicemail => NotifyReason::Voicemail,
            CallStatus::Unknown => NotifyReason::Unreachable,
            _ => return None,
        }
    } else {
        return None;
    };

    session.fallback_notified = true;
    Some(reason)
}
