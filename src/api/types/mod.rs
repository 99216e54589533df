//! API request/response types

mod error;
mod json;
mod notification;

pub use error::{ApiError, ApiErrorDetail, ApiErrorResponse, ApiErrorType};
pub use json::Json;
pub use notification::{NotificationResponse, SendEmailRequest, SendSmsRequest};
