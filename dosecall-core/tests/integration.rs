//! Integration tests for the event → reconcile → store pipeline
//!
//! These drive the webhook processor end to end against an in-memory
//! database, focusing on the ordering guarantees: the same set of provider
//! callbacks must produce the same final session regardless of arrival
//! order or duplication.

use std::sync::Arc;

use dosecall_core::config::CallbackConfig;
use dosecall_core::normalize::{
    normalize_amd, normalize_call_start, normalize_no_response, normalize_speech,
    normalize_status, AmdEvent, CallStartEvent, NoResponseEvent, SpeechEvent, StatusEvent,
};
use dosecall_core::store::{Database, Page, SessionFilter};
use dosecall_core::{
    AnsweredBy, CallSession, CallStatus, CanonicalUpdate, Direction, ResponseClassification,
    WebhookProcessor,
};

fn db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    db
}

fn processor() -> (Arc<Database>, WebhookProcessor) {
    let db = Arc::new(db());
    let processor = WebhookProcessor::new(db.clone(), None, CallbackConfig::default());
    (db, processor)
}

fn amd_event(call_sid: &str, verdict: &str) -> AmdEvent {
    AmdEvent {
        call_sid: call_sid.to_string(),
        answered_by: Some(verdict.to_string()),
    }
}

fn speech_event(call_sid: &str, text: &str) -> SpeechEvent {
    SpeechEvent {
        call_sid: call_sid.to_string(),
        speech_result: Some(text.to_string()),
        confidence: Some(0.9),
    }
}

fn status_event(call_sid: &str, code: &str, duration: Option<&str>) -> StatusEvent {
    StatusEvent {
        call_sid: call_sid.to_string(),
        call_status: Some(code.to_string()),
        call_duration: duration.map(str::to_string),
        to: Some("+15551234567".to_string()),
    }
}

/// The fields that must agree across arrival orders. Audit notes are
/// excluded: which late event gets noted depends on the interleaving.
fn semantic_fields(
    session: &CallSession,
) -> (
    CallStatus,
    Option<AnsweredBy>,
    Option<String>,
    Option<ResponseClassification>,
    Option<u32>,
    bool,
) {
    (
        session.status,
        session.answered_by,
        session.response_text.clone(),
        session.response_classification,
        session.duration_seconds,
        session.fallback_notified,
    )
}

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut result = vec![];
    for (i, item) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, item.clone());
            result.push(tail);
        }
    }
    result
}

// ============================================
// Order independence
// ============================================

#[test]
fn test_final_state_is_order_independent_for_voicemail_outcome() {
    let updates = vec![
        normalize_amd(&amd_event("CA1", "machine_end_beep")).unwrap(),
        normalize_speech(&speech_event("CA1", "Yes I have")).unwrap(),
        normalize_status(&status_event("CA1", "completed", Some("12"))).unwrap(),
    ];

    let mut baseline: Option<_> = None;
    for order in permutations(&updates) {
        let db = db();
        let mut notifications = 0;
        for update in &order {
            let result = db.apply_update(update).unwrap();
            if result.notify.is_some() {
                notifications += 1;
            }
        }

        let session = db.get_session("CA1").unwrap().unwrap();
        assert_eq!(session.status, CallStatus::Voicemail);
        assert_eq!(session.answered_by, Some(AnsweredBy::Voicemail));
        assert_eq!(session.duration_seconds, Some(12));
        assert_eq!(notifications, 1, "exactly one fallback per session");

        let fields = semantic_fields(&session);
        match &baseline {
            None => baseline = Some(fields),
            Some(expected) => assert_eq!(&fields, expected),
        }
    }
}

#[test]
fn test_final_state_is_order_independent_for_human_outcome() {
    let updates = vec![
        normalize_amd(&amd_event("CA2", "human")).unwrap(),
        normalize_speech(&speech_event("CA2", "no I haven't")).unwrap(),
        normalize_status(&status_event("CA2", "completed", Some("33"))).unwrap(),
    ];

    for order in permutations(&updates) {
        let db = db();
        for update in &order {
            let result = db.apply_update(update).unwrap();
            assert!(result.notify.is_none(), "human answer never notifies");
        }

        let session = db.get_session("CA2").unwrap().unwrap();
        assert_eq!(session.status, CallStatus::Answered);
        assert_eq!(session.answered_by, Some(AnsweredBy::Human));
        assert_eq!(
            session.response_classification,
            Some(ResponseClassification::Negative)
        );
        assert_eq!(session.duration_seconds, Some(33));
        assert!(!session.fallback_notified);
    }
}

#[test]
fn test_no_response_and_no_answer_status_agree_across_orders() {
    // The gather timeout and the terminal no-answer status both speak to
    // whether anyone answered; their race must not change the outcome.
    let start = CallStartEvent {
        call_sid: "CA4".to_string(),
        from: Some("+15550001111".to_string()),
        to: Some("+15559998888".to_string()),
    };
    let updates = vec![
        normalize_call_start(&start, Direction::Outbound).unwrap(),
        normalize_no_response(&NoResponseEvent {
            call_sid: "CA4".to_string(),
        })
        .unwrap(),
        normalize_status(&status_event("CA4", "no-answer", None)).unwrap(),
    ];

    for order in permutations(&updates) {
        let db = db();
        let mut notifications = 0;
        for update in &order {
            if db.apply_update(update).unwrap().notify.is_some() {
                notifications += 1;
            }
        }

        let session = db.get_session("CA4").unwrap().unwrap();
        assert_eq!(session.status, CallStatus::Voicemail);
        assert_eq!(session.answered_by, Some(AnsweredBy::Voicemail));
        assert_eq!(session.phone_number, "+15559998888");
        assert!(session.fallback_notified);
        assert_eq!(notifications, 1, "exactly one fallback per session");
    }
}

// ============================================
// Idempotence
// ============================================

#[test]
fn test_replaying_every_event_changes_nothing() {
    let updates: Vec<CanonicalUpdate> = vec![
        normalize_amd(&amd_event("CA3", "machine_start")).unwrap(),
        normalize_status(&status_event("CA3", "completed", Some("8"))).unwrap(),
    ];

    let db = db();
    let mut notifications = 0;
    for update in &updates {
        if db.apply_update(update).unwrap().notify.is_some() {
            notifications += 1;
        }
    }
    let first_pass = db.get_session("CA3").unwrap().unwrap();

    for update in &updates {
        let result = db.apply_update(update).unwrap();
        assert!(!result.changed, "replay must be a no-op");
        assert!(result.notify.is_none(), "replay must not re-notify");
    }

    let second_pass = db.get_session("CA3").unwrap().unwrap();
    assert_eq!(second_pass, first_pass);
    assert_eq!(notifications, 1);
}

// ============================================
// End-to-end webhook flow
// ============================================

#[tokio::test]
async fn test_outbound_call_reaching_voicemail() {
    let (db, processor) = processor();

    let start = CallStartEvent {
        call_sid: "CA10".to_string(),
        from: Some("+15550001111".to_string()),
        to: Some("+15559998888".to_string()),
    };
    let doc = processor.handle_call_start(&start, Direction::Outbound).await;
    assert!(doc.contains("<Gather"));

    processor
        .handle_amd(&amd_event("CA10", "machine_end_beep"))
        .await;
    processor
        .handle_status(&status_event("CA10", "completed", Some("12")))
        .await;

    let session = db.get_session("CA10").unwrap().unwrap();
    assert_eq!(session.phone_number, "+15559998888");
    assert_eq!(session.status, CallStatus::Voicemail);
    assert_eq!(session.answered_by, Some(AnsweredBy::Voicemail));
    assert_eq!(session.duration_seconds, Some(12));
    assert!(session.fallback_notified);
    assert!(session
        .notes
        .as_ref()
        .unwrap()
        .contains("late status 'completed' ignored"));
}

#[tokio::test]
async fn test_inbound_call_with_confirmation() {
    let (db, processor) = processor();

    let start = CallStartEvent {
        call_sid: "CA11".to_string(),
        from: Some("+15550001111".to_string()),
        to: Some("+15559998888".to_string()),
    };
    processor.handle_call_start(&start, Direction::Inbound).await;

    let doc = processor
        .handle_speech(&speech_event("CA11", "Yeah, I took them this morning"))
        .await;
    assert!(doc.contains("Thank you for confirming"));

    processor
        .handle_status(&status_event("CA11", "completed", Some("45")))
        .await;

    let session = db.get_session("CA11").unwrap().unwrap();
    assert_eq!(session.direction, Direction::Inbound);
    assert_eq!(session.phone_number, "+15550001111");
    assert_eq!(session.status, CallStatus::Completed);
    assert_eq!(
        session.response_classification,
        Some(ResponseClassification::Affirmative)
    );
    assert!(!session.fallback_notified);
}

#[tokio::test]
async fn test_gather_timeout_flags_fallback_once() {
    let (db, processor) = processor();

    let start = CallStartEvent {
        call_sid: "CA12".to_string(),
        from: None,
        to: Some("+15559998888".to_string()),
    };
    processor.handle_call_start(&start, Direction::Outbound).await;

    let timeout = NoResponseEvent {
        call_sid: "CA12".to_string(),
    };
    processor.handle_no_response(&timeout).await;
    processor.handle_no_response(&timeout).await;

    processor
        .handle_status(&status_event("CA12", "no-answer", None))
        .await;

    let session = db.get_session("CA12").unwrap().unwrap();
    assert!(session.fallback_notified);
    assert_eq!(session.status, CallStatus::Voicemail);
}

// ============================================
// Listing
// ============================================

#[test]
fn test_listing_reports_total_across_pages() {
    let db = db();
    for i in 0..25 {
        let mut update = CanonicalUpdate::new(
            format!("CA{:02}", i),
            dosecall_core::UpdateSource::CallStart,
        );
        update.phone_number = Some("+15551234567".to_string());
        update.direction = Some(Direction::Outbound);
        update.status = Some(CallStatus::Initiated);
        db.apply_update(&update).unwrap();
    }

    let page = Page {
        limit: 10,
        offset: 20,
    };
    let (sessions, total) = db.list_sessions(&SessionFilter::default(), page).unwrap();
    assert_eq!(total, 25);
    assert_eq!(sessions.len(), 5);

    let filter = SessionFilter {
        status: Some(CallStatus::Completed),
        ..Default::default()
    };
    let (sessions, total) = db.list_sessions(&filter, Page::default()).unwrap();
    assert_eq!(total, 0);
    assert!(sessions.is_empty());
}
