//! AWS delivery provider: SNS for SMS, SES for email

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sesv2::operation::send_email::SendEmailError;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sns::error::{DisplayErrorContext, SdkError};
use aws_sdk_sns::operation::publish::PublishError;
use aws_sdk_sns::types::MessageAttributeValue;
use tracing::debug;

use crate::domain::notification::{DispatchRequest, NotificationChannel};
use crate::domain::provider::{NotificationProvider, ProviderError, ProviderResponse};

/// AWS provider settings
#[derive(Debug, Clone)]
pub struct AwsProviderConfig {
    pub region: String,
    /// Sender id attached to outbound SMS, where the destination country
    /// supports it
    pub sms_sender_id: Option<String>,
    /// Verified SES sender address
    pub email_from: String,
}

impl AwsProviderConfig {
    pub fn new(region: impl Into<String>, email_from: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            sms_sender_id: None,
            email_from: email_from.into(),
        }
    }

    pub fn with_sms_sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.sms_sender_id = Some(sender_id.into());
        self
    }
}

/// Delivery via AWS SNS (SMS) and SES (email)
#[derive(Debug, Clone)]
pub struct AwsProvider {
    sns: aws_sdk_sns::Client,
    ses: aws_sdk_sesv2::Client,
    config: AwsProviderConfig,
}

impl AwsProvider {
    pub const NAME: &'static str = "aws";

    /// Builds SNS and SES clients from the ambient AWS credential chain
    pub async fn from_config(config: AwsProviderConfig) -> Self {
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        Self {
            sns: aws_sdk_sns::Client::new(&shared_config),
            ses: aws_sdk_sesv2::Client::new(&shared_config),
            config,
        }
    }
}

#[async_trait]
impl NotificationProvider for AwsProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn supports(&self, channel: NotificationChannel) -> bool {
        matches!(
            channel,
            NotificationChannel::Sms | NotificationChannel::Email
        )
    }

    async fn send_sms(&self, request: &DispatchRequest) -> Result<ProviderResponse, ProviderError> {
        let reference_attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(request.client_reference())
            .build()
            .map_err(|e| ProviderError::permanent(Self::NAME, e.to_string()))?;

        let mut publish = self
            .sns
            .publish()
            .phone_number(request.recipient.clone())
            .message(request.content.body.clone())
            .message_attributes("client-reference", reference_attribute);

        if let Some(sender_id) = &self.config.sms_sender_id {
            let sender_attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(sender_id)
                .build()
                .map_err(|e| ProviderError::permanent(Self::NAME, e.to_string()))?;
            publish = publish.message_attributes("AWS.SNS.SMS.SenderID", sender_attribute);
        }

        match publish.send().await {
            Ok(output) => {
                debug!(message_id = ?output.message_id(), "SNS publish accepted");
                output
                    .message_id()
                    .map(ProviderResponse::new)
                    .ok_or_else(|| {
                        ProviderError::transient(Self::NAME, "publish response missing message id")
                    })
            }
            Err(err) => Err(classify_publish_error(err)),
        }
    }

    async fn send_email(
        &self,
        request: &DispatchRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let subject = Content::builder()
            .data(request.content.subject.clone().unwrap_or_default())
            .build()
            .map_err(|e| ProviderError::permanent(Self::NAME, e.to_string()))?;

        let body_text = Content::builder()
            .data(request.content.body.clone())
            .build()
            .map_err(|e| ProviderError::permanent(Self::NAME, e.to_string()))?;

        let message = Message::builder()
            .subject(subject)
            .body(Body::builder().text(body_text).build())
            .build()
            .map_err(|e| ProviderError::permanent(Self::NAME, e.to_string()))?;

        let content = EmailContent::builder().simple(message).build();

        let destination = Destination::builder()
            .to_addresses(request.recipient.clone())
            .build();

        match self
            .ses
            .send_email()
            .from_email_address(self.config.email_from.clone())
            .destination(destination)
            .content(content)
            .send()
            .await
        {
            Ok(output) => {
                debug!(message_id = ?output.message_id(), "SES send accepted");
                output
                    .message_id()
                    .map(ProviderResponse::new)
                    .ok_or_else(|| {
                        ProviderError::transient(Self::NAME, "send response missing message id")
                    })
            }
            Err(err) => Err(classify_send_email_error(err)),
        }
    }
}

/// Maps SNS publish failures onto the retry taxonomy. The service-error set
/// mirrors the SNS exceptions known to be safe to retry.
fn classify_publish_error(err: SdkError<PublishError>) -> ProviderError {
    let message = DisplayErrorContext(&err).to_string();

    match &err {
        SdkError::ServiceError(context) => {
            let service_err = context.err();
            if service_err.is_throttled_exception() || service_err.is_kms_throttling_exception() {
                ProviderError::throttled(AwsProvider::NAME, message)
            } else if service_err.is_internal_error_exception()
                || service_err.is_endpoint_disabled_exception()
                || service_err.is_platform_application_disabled_exception()
            {
                ProviderError::transient(AwsProvider::NAME, message)
            } else {
                ProviderError::permanent(AwsProvider::NAME, message)
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ProviderError::transient(AwsProvider::NAME, message)
        }
        _ => ProviderError::permanent(AwsProvider::NAME, message),
    }
}

/// Maps SES send failures onto the retry taxonomy
fn classify_send_email_error(err: SdkError<SendEmailError>) -> ProviderError {
    let message = DisplayErrorContext(&err).to_string();

    match &err {
        SdkError::ServiceError(context) => {
            let service_err = context.err();
            if service_err.is_too_many_requests_exception() {
                ProviderError::throttled(AwsProvider::NAME, message)
            } else if service_err.is_limit_exceeded_exception() {
                ProviderError::transient(AwsProvider::NAME, message)
            } else {
                ProviderError::permanent(AwsProvider::NAME, message)
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ProviderError::transient(AwsProvider::NAME, message)
        }
        _ => ProviderError::permanent(AwsProvider::NAME, message),
    }
}
