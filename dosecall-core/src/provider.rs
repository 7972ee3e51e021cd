//! HTTP client for the telephony provider REST API
//!
//! Covers the three provider-side operations the reconciliation flow needs:
//! sending the backup text message, recovering a call's dialed number when an
//! event omits it, and injecting a mid-call voice document after a voicemail
//! verdict. Outbound call placement lives outside this crate.

use std::time::Duration;

use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::types::NotifyReason;

/// Subset of the provider's call resource we care about
#[derive(Debug, Deserialize)]
struct CallResource {
    /// Dialed number
    to: Option<String>,
}

/// Subset of the provider's message resource
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
}

/// Client for the provider REST API.
///
/// Constructed once at startup from configuration and passed to
/// collaborators; there is no ambient global client.
pub struct ProviderClient {
    config: ProviderConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl ProviderClient {
    /// Create a new provider client from configuration.
    ///
    /// Returns an error if required credentials are missing.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    fn account_sid(&self) -> &str {
        self.config.account_sid.as_deref().unwrap_or_default()
    }

    fn auth_token(&self) -> &str {
        self.config.auth_token.as_deref().unwrap_or_default()
    }

    /// Send a text message. Returns the provider-assigned message sid.
    pub async fn send_sms(&self, to: &str, body: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url,
            urlencoding::encode(self.account_sid())
        );

        let from = self
            .config
            .from_number
            .clone()
            .ok_or_else(|| Error::Config("provider.from_number is required".to_string()))?;

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.account_sid(), Some(self.auth_token()))
            .form(&[("To", to), ("From", from.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let message: MessageResource = response
                .json()
                .await
                .map_err(|e| Error::Provider(format!("failed to parse response: {}", e)))?;
            Ok(message.sid)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Provider(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    /// Look up the dialed number for a call.
    ///
    /// Returns `None` when the provider does not know the call. Used when an
    /// AMD callback arrives for a session whose start event never did.
    pub async fn fetch_call_to_number(&self, call_id: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.base_url,
            urlencoding::encode(self.account_sid()),
            urlencoding::encode(call_id)
        );

        let response = self
            .http_client
            .get(&url)
            .basic_auth(self.account_sid(), Some(self.auth_token()))
            .send()
            .await
            .map_err(|e| Error::Provider(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let call: CallResource = response
                .json()
                .await
                .map_err(|e| Error::Provider(format!("failed to parse response: {}", e)))?;
            Ok(call.to)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Provider(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    /// Replace the in-flight call's instructions with a new voice document
    /// (e.g., the voicemail drop message after a machine verdict).
    pub async fn redirect_call(&self, call_id: &str, voice_document: &str) -> Result<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.base_url,
            urlencoding::encode(self.account_sid()),
            urlencoding::encode(call_id)
        );

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.account_sid(), Some(self.auth_token()))
            .form(&[("Twiml", voice_document)])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Provider(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    /// Best-effort fallback text message.
    ///
    /// Returns whether a delivery was attempted; failures are logged and
    /// swallowed so the webhook acknowledgment path is never blocked.
    pub async fn notify_fallback(&self, phone_number: &str, reason: NotifyReason) -> bool {
        if phone_number.is_empty() {
            tracing::warn!(reason = reason.as_str(), "No phone number for fallback message");
            return false;
        }

        match self.send_sms(phone_number, &self.config.fallback_message).await {
            Ok(sid) => {
                tracing::info!(
                    phone_number,
                    reason = reason.as_str(),
                    message_sid = sid.as_deref().unwrap_or("unknown"),
                    "Fallback message sent"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    phone_number,
                    reason = reason.as_str(),
                    error = %e,
                    "Failed to send fallback message"
                );
                true
            }
        }
    }
}
