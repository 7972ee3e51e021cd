//! Webhook processing: raw provider callbacks → reconciled sessions + replies
//!
//! One entry point per callback type. Each handler normalizes the payload,
//! applies it to the store, and produces the acknowledgment the provider
//! expects (a voice document for call-control callbacks, nothing for status
//! callbacks). The handlers are infallible by contract: every internal
//! failure, a malformed payload or an unavailable store included, is caught
//! and logged with the call id and event type, and the acknowledgment is
//! still produced. An unacknowledged callback would make the provider retry
//! and duplicate side effects.

use std::sync::Arc;

use crate::config::CallbackConfig;
use crate::error::Result;
use crate::normalize::{
    normalize_amd, normalize_call_start, normalize_no_response, normalize_speech,
    normalize_status, AmdEvent, CallStartEvent, NoResponseEvent, SpeechEvent, StatusEvent,
};
use crate::provider::ProviderClient;
use crate::reconcile::Reconciled;
use crate::store::Database;
use crate::twiml;
use crate::types::{AnsweredBy, CanonicalUpdate, Direction, ResponseClassification, UpdateSource};

/// Processes provider callbacks against the session store.
///
/// The provider client is optional: without credentials, sessions are still
/// reconciled and listed, but no text message or redirect goes out.
pub struct WebhookProcessor {
    db: Arc<Database>,
    provider: Option<ProviderClient>,
    callbacks: CallbackConfig,
}

impl WebhookProcessor {
    pub fn new(
        db: Arc<Database>,
        provider: Option<ProviderClient>,
        callbacks: CallbackConfig,
    ) -> Self {
        Self {
            db,
            provider,
            callbacks,
        }
    }

    /// Call start: record the session and reply with the reminder prompt.
    ///
    /// The prompt goes out even when recording fails; the patient on the
    /// line still gets the reminder.
    pub async fn handle_call_start(&self, event: &CallStartEvent, direction: Direction) -> String {
        if let Err(e) = self.process_call_start(event, direction).await {
            log_contained_failure(&event.call_sid, "call_start", &e);
        }
        twiml::medication_prompt(
            &self.callbacks.speech_url(),
            &self.callbacks.no_response_url(),
        )
    }

    /// Answering-machine detection verdict.
    ///
    /// On a machine verdict, the live call is redirected to the voicemail
    /// drop message so the reminder lands on the recording.
    pub async fn handle_amd(&self, event: &AmdEvent) {
        if let Err(e) = self.process_amd(event).await {
            log_contained_failure(&event.call_sid, "amd", &e);
        }
    }

    /// Gathered speech: record transcript + classification, reply with the
    /// matching closing message.
    pub async fn handle_speech(&self, event: &SpeechEvent) -> String {
        match self.process_speech(event).await {
            Ok(doc) => doc,
            Err(e) => {
                log_contained_failure(&event.call_sid, "speech", &e);
                twiml::error_message()
            }
        }
    }

    /// Gather timeout: nobody spoke. Triggers the fallback text (at most
    /// once per session) and replies with the goodbye message.
    pub async fn handle_no_response(&self, event: &NoResponseEvent) -> String {
        if let Err(e) = self.process_no_response(event).await {
            log_contained_failure(&event.call_sid, "no_response", &e);
        }
        twiml::no_response_message()
    }

    /// Call progress / terminal status callback.
    pub async fn handle_status(&self, event: &StatusEvent) {
        if let Err(e) = self.process_status(event).await {
            log_contained_failure(&event.call_sid, "status", &e);
        }
    }

    // ============================================
    // Fallible processing, per callback type
    // ============================================

    async fn process_call_start(&self, event: &CallStartEvent, direction: Direction) -> Result<()> {
        let update = normalize_call_start(event, direction)?;
        let reconciled = self.db.apply_update(&update)?;
        tracing::info!(
            call_id = %update.call_id,
            direction = direction.as_str(),
            created = reconciled.created,
            "Call started"
        );
        Ok(())
    }

    async fn process_amd(&self, event: &AmdEvent) -> Result<()> {
        let update = normalize_amd(event)?;
        let reconciled = self.db.apply_update(&update)?;
        tracing::info!(
            call_id = %update.call_id,
            answered_by = ?reconciled.session.answered_by,
            "AMD verdict recorded"
        );

        if reconciled.changed && update.answered_by == Some(AnsweredBy::Voicemail) {
            if let Some(provider) = &self.provider {
                if let Err(e) = provider
                    .redirect_call(&update.call_id, &twiml::voicemail_drop())
                    .await
                {
                    tracing::error!(
                        call_id = %update.call_id,
                        error = %e,
                        "Failed to redirect call to voicemail message"
                    );
                }
            }
        }

        self.maybe_notify(&reconciled).await;
        Ok(())
    }

    async fn process_speech(&self, event: &SpeechEvent) -> Result<String> {
        let update = normalize_speech(event)?;
        let reconciled = self.db.apply_update(&update)?;

        let classification = reconciled
            .session
            .response_classification
            .unwrap_or(ResponseClassification::Unclear);
        tracing::info!(
            call_id = %update.call_id,
            classification = classification.as_str(),
            "Speech response recorded"
        );

        Ok(twiml::closing_message(classification))
    }

    async fn process_no_response(&self, event: &NoResponseEvent) -> Result<()> {
        let update = normalize_no_response(event)?;
        let reconciled = self.db.apply_update(&update)?;
        tracing::info!(call_id = %update.call_id, "No speech response captured");

        self.maybe_notify(&reconciled).await;
        Ok(())
    }

    async fn process_status(&self, event: &StatusEvent) -> Result<()> {
        let update = normalize_status(event)?;
        let reconciled = self.db.apply_update(&update)?;
        tracing::info!(
            call_id = %update.call_id,
            status = reconciled.session.status.as_str(),
            changed = reconciled.changed,
            "Status callback recorded"
        );

        self.maybe_notify(&reconciled).await;
        Ok(())
    }

    /// Send the fallback text when reconciliation asked for one.
    ///
    /// If the session has no phone number yet (events arrived before the
    /// start callback), it is recovered from the provider's call resource
    /// and persisted.
    async fn maybe_notify(&self, reconciled: &Reconciled) {
        let Some(reason) = reconciled.notify else {
            return;
        };

        let Some(provider) = &self.provider else {
            tracing::warn!(
                call_id = %reconciled.session.call_id,
                reason = reason.as_str(),
                "Fallback message skipped: provider not configured"
            );
            return;
        };

        let mut phone = reconciled.session.phone_number.clone();
        if phone.is_empty() {
            phone = self
                .recover_phone_number(&reconciled.session.call_id)
                .await
                .unwrap_or_default();
        }

        provider.notify_fallback(&phone, reason).await;
    }

    async fn recover_phone_number(&self, call_id: &str) -> Option<String> {
        let provider = self.provider.as_ref()?;
        match provider.fetch_call_to_number(call_id).await {
            Ok(Some(phone)) => {
                let mut update = CanonicalUpdate::new(call_id, UpdateSource::Progress);
                update.phone_number = Some(phone.clone());
                if let Err(e) = self.db.apply_update(&update) {
                    tracing::error!(call_id, error = %e, "Failed to persist recovered number");
                }
                Some(phone)
            }
            Ok(None) => {
                tracing::warn!(call_id, "Provider has no record of call");
                None
            }
            Err(e) => {
                tracing::error!(call_id, error = %e, "Failed to look up call");
                None
            }
        }
    }
}

/// Log a processing failure that was contained below the acknowledgment.
fn log_contained_failure(call_id: &str, event_type: &str, error: &crate::error::Error) {
    tracing::error!(
        call_id,
        event_type,
        error = %error,
        "Callback processing failed; acknowledging anyway"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallStatus;

    fn processor() -> WebhookProcessor {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        WebhookProcessor::new(Arc::new(db), None, CallbackConfig::default())
    }

    fn start_event(call_sid: &str) -> CallStartEvent {
        CallStartEvent {
            call_sid: call_sid.to_string(),
            from: Some("+15550009999".to_string()),
            to: Some("+15551234567".to_string()),
        }
    }

    #[tokio::test]
    async fn test_call_start_returns_prompt_and_persists() {
        let processor = processor();
        let doc = processor
            .handle_call_start(&start_event("CA1"), Direction::Outbound)
            .await;
        assert!(doc.contains("<Gather"));

        let session = processor.db.get_session("CA1").unwrap().unwrap();
        assert_eq!(session.status, CallStatus::Initiated);
        assert_eq!(session.phone_number, "+15551234567");
    }

    #[tokio::test]
    async fn test_speech_reply_matches_classification() {
        let processor = processor();
        processor
            .handle_call_start(&start_event("CA1"), Direction::Outbound)
            .await;

        let event = SpeechEvent {
            call_sid: "CA1".to_string(),
            speech_result: Some("no I haven't".to_string()),
            confidence: Some(0.9),
        };
        let doc = processor.handle_speech(&event).await;
        assert!(doc.contains("as soon as possible"));

        let session = processor.db.get_session("CA1").unwrap().unwrap();
        assert_eq!(
            session.response_classification,
            Some(ResponseClassification::Negative)
        );
    }

    #[tokio::test]
    async fn test_status_before_start_creates_session() {
        let processor = processor();
        let event = StatusEvent {
            call_sid: "CA2".to_string(),
            call_status: Some("completed".to_string()),
            call_duration: Some("42".to_string()),
            to: Some("+15551234567".to_string()),
        };
        processor.handle_status(&event).await;

        let session = processor.db.get_session("CA2").unwrap().unwrap();
        assert_eq!(session.status, CallStatus::Completed);
        assert_eq!(session.duration_seconds, Some(42));
        assert_eq!(session.phone_number, "+15551234567");
    }

    #[tokio::test]
    async fn test_no_response_marks_fallback_without_provider() {
        let processor = processor();
        processor
            .handle_call_start(&start_event("CA3"), Direction::Outbound)
            .await;

        let event = NoResponseEvent {
            call_sid: "CA3".to_string(),
        };
        let doc = processor.handle_no_response(&event).await;
        assert!(doc.contains("text message"));

        let session = processor.db.get_session("CA3").unwrap().unwrap();
        assert!(session.fallback_notified);
    }

    #[tokio::test]
    async fn test_invalid_speech_still_produces_acknowledgment() {
        let processor = processor();
        let event = SpeechEvent {
            call_sid: "CA4".to_string(),
            speech_result: None,
            confidence: None,
        };

        let doc = processor.handle_speech(&event).await;
        assert!(doc.contains("<Say>"), "expected a voice document, got: {doc}");
        // Reconciliation was skipped, not half-applied.
        assert!(processor.db.get_session("CA4").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_call_id_still_returns_prompt() {
        let processor = processor();
        let event = CallStartEvent {
            call_sid: "".to_string(),
            from: None,
            to: None,
        };

        let doc = processor.handle_call_start(&event, Direction::Outbound).await;
        assert!(doc.contains("<Gather"));
    }

    #[tokio::test]
    async fn test_store_failure_still_acknowledged() {
        // No migrations: every store access fails.
        let db = Database::open_in_memory().unwrap();
        let processor = WebhookProcessor::new(Arc::new(db), None, CallbackConfig::default());

        let doc = processor
            .handle_no_response(&NoResponseEvent {
                call_sid: "CA5".to_string(),
            })
            .await;
        assert!(doc.contains("<Say>"));

        processor
            .handle_status(&StatusEvent {
                call_sid: "CA5".to_string(),
                call_status: Some("completed".to_string()),
                call_duration: None,
                to: None,
            })
            .await;
    }
}
