//! Request and response bodies for the v2 notification endpoints

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::types::ApiError;
use crate::domain::notification::{DispatchOutcome, DispatchRequest, DispatchStatus};

/// E.164 with a mandatory country code
static PHONE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9]\d{7,14}$").expect("phone number regex is valid"));

/// Conservative mailbox shape; full validation is the provider's job
static EMAIL_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email address regex is valid"));

const MAX_REFERENCE_LENGTH: usize = 100;

/// Body for `POST /v2/notifications/sms`
#[derive(Debug, Clone, Deserialize)]
pub struct SendSmsRequest {
    pub phone_number: String,
    pub template_id: Uuid,
    /// Rendered message body produced by the template collaborator
    pub body: String,
    pub personalisation: Option<HashMap<String, String>>,
    pub reference: Option<String>,
    pub billing_code: Option<String>,
    pub callback_url: Option<String>,
}

impl SendSmsRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if !PHONE_NUMBER_RE.is_match(&self.phone_number) {
            return Err(ApiError::bad_request(
                "phone_number must be E.164 formatted, e.g. +18005550101",
            ));
        }
        validate_common(&self.body, self.reference.as_deref())
    }

    pub fn into_dispatch_request(self) -> DispatchRequest {
        let mut request = DispatchRequest::sms(self.phone_number, self.template_id, self.body);

        if let Some(personalisation) = self.personalisation {
            request = request.with_personalisation(personalisation);
        }
        if let Some(reference) = self.reference {
            request = request.with_reference(reference);
        }
        if let Some(billing_code) = self.billing_code {
            request = request.with_billing_code(billing_code);
        }
        if let Some(callback_url) = self.callback_url {
            request = request.with_callback_url(callback_url);
        }

        request
    }
}

/// Body for `POST /v2/notifications/email`
#[derive(Debug, Clone, Deserialize)]
pub struct SendEmailRequest {
    pub email_address: String,
    pub template_id: Uuid,
    pub subject: String,
    /// Rendered message body produced by the template collaborator
    pub body: String,
    pub personalisation: Option<HashMap<String, String>>,
    pub reference: Option<String>,
    pub billing_code: Option<String>,
    pub callback_url: Option<String>,
}

impl SendEmailRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if !EMAIL_ADDRESS_RE.is_match(&self.email_address) {
            return Err(ApiError::bad_request("email_address is not a valid address"));
        }
        if self.subject.trim().is_empty() {
            return Err(ApiError::bad_request("subject must not be empty"));
        }
        validate_common(&self.body, self.reference.as_deref())
    }

    pub fn into_dispatch_request(self) -> DispatchRequest {
        let mut request = DispatchRequest::email(
            self.email_address,
            self.template_id,
            self.subject,
            self.body,
        );

        if let Some(personalisation) = self.personalisation {
            request = request.with_personalisation(personalisation);
        }
        if let Some(reference) = self.reference {
            request = request.with_reference(reference);
        }
        if let Some(billing_code) = self.billing_code {
            request = request.with_billing_code(billing_code);
        }
        if let Some(callback_url) = self.callback_url {
            request = request.with_callback_url(callback_url);
        }

        request
    }
}

fn validate_common(body: &str, reference: Option<&str>) -> Result<(), ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::bad_request("body must not be empty"));
    }
    if reference.is_some_and(|reference| reference.len() > MAX_REFERENCE_LENGTH) {
        return Err(ApiError::bad_request(format!(
            "reference must be at most {} characters",
            MAX_REFERENCE_LENGTH
        )));
    }

    Ok(())
}

/// Response for a completed dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub to: String,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationResponse {
    pub fn completed(request: &DispatchRequest, outcome: &DispatchOutcome) -> Self {
        Self {
            id: request.id,
            to: request.recipient.clone(),
            status: outcome.status(),
            provider_message_id: outcome.provider_message_id().map(str::to_string),
            reference: request.reference.clone(),
            created_at: Utc::now(),
        }
    }
}
