//! Voice document (TwiML) builders
//!
//! Small string builders for the XML documents returned to the provider.
//! Kept separate from the webhook handlers so the exact prompt wording and
//! gather parameters live in one place.

use crate::types::ResponseClassification;

/// Spoken reminder prompt played when the callee picks up.
pub const MEDICATION_PROMPT: &str = "Hello, this is a reminder from your healthcare provider \
to confirm your medications for the day. Please confirm if you have taken your Aspirin, \
Cardivol, and Metformin today.";

/// Message left when answering machine detection reports a machine.
pub const VOICEMAIL_MESSAGE: &str = "We called to check on your medication but couldn't \
reach you. Please call us back or take your medications if you haven't done so.";

/// Escape text for inclusion in XML element content or attribute values.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn document(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>{}</Response>",
        body
    )
}

/// Initial call document: speak the reminder and gather a speech response.
///
/// If the gather times out without speech, the provider falls through to the
/// redirect, which reports a no-response event.
pub fn medication_prompt(speech_action_url: &str, no_response_url: &str) -> String {
    document(&format!(
        "<Gather input=\"speech\" timeout=\"5\" speechTimeout=\"auto\" language=\"en-US\" \
         action=\"{}\" method=\"POST\"><Say>{}</Say></Gather><Redirect method=\"POST\">{}</Redirect>",
        escape(speech_action_url),
        escape(MEDICATION_PROMPT),
        escape(no_response_url),
    ))
}

/// Closing message spoken after the callee's response has been classified.
pub fn closing_message(classification: ResponseClassification) -> String {
    let text = match classification {
        ResponseClassification::Affirmative => {
            "Great! Thank you for confirming that you've taken your medications. Have a wonderful day!"
        }
        ResponseClassification::Negative => {
            "It's important to take your medications as prescribed. Please take them as soon as possible. \
             If you have any concerns, contact your healthcare provider."
        }
        ResponseClassification::Unclear => {
            "Thank you for your response. If you haven't taken your medications yet, please do so soon. \
             Take care!"
        }
    };
    document(&format!("<Say>{}</Say>", escape(text)))
}

/// Spoken when the gather times out without any speech.
pub fn no_response_message() -> String {
    document(
        "<Say>We didn't receive a response. We'll send you a text message with your \
         medication reminder. Goodbye!</Say>",
    )
}

/// Spoken when a response could not be processed.
pub fn error_message() -> String {
    document(
        "<Say>We're sorry, we couldn't process your response. If you haven't taken your \
         medications yet, please do so soon. Goodbye!</Say>",
    )
}

/// Injected into the live call when a machine answers: a short pause so the
/// greeting finishes, then the reminder message.
pub fn voicemail_drop() -> String {
    document(&format!(
        "<Pause length=\"2\"/><Say>{}</Say>",
        escape(VOICEMAIL_MESSAGE)
    ))
}
