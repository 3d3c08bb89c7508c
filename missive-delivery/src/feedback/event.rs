//! Delivery feedback events and their JSON wire format.
//!
//! Events arrive either as the raw provider payload
//!
//! ```json
//! { "eventType": "Bounce",
//!   "bounce": { "bounceType": "Permanent", "bounceSubType": "General" },
//!   "mail": { "messageId": "...",
//!             "commonHeaders": { "from": [...], "to": [...], "subject": "..." } } }
//! ```
//!
//! or wrapped in an SNS notification whose `Message` field holds that
//! payload as a string. Older notification payloads name the tag
//! `notificationType`; both spellings are accepted.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedbackParseError {
    #[error("Malformed feedback payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown feedback event type: {0}")]
    UnknownEventType(String),

    #[error("Event has no {0} details")]
    MissingPayload(&'static str),

    #[error("SNS subscription needs confirming at {subscribe_url}")]
    SubscriptionConfirmation { subscribe_url: String },

    #[error("Unexpected SNS message: {0}")]
    UnexpectedSns(String),
}

/// Envelope details common to every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailHeaders {
    pub message_id: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub subject: String,
}

/// One delivery feedback notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    Bounce {
        mail: MailHeaders,
        bounce_type: String,
        bounce_sub_type: String,
    },
    Complaint {
        mail: MailHeaders,
        complaint_sub_type: Option<String>,
        complaint_feedback_type: Option<String>,
    },
    Reject {
        mail: MailHeaders,
        reason: String,
    },
    Send {
        mail: MailHeaders,
    },
    Delivery {
        mail: MailHeaders,
        smtp_response: Option<String>,
    },
}

impl FeedbackEvent {
    /// Parse a raw provider event.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, an unknown event type, or an event missing
    /// its type-specific details.
    pub fn from_json(json: &str) -> Result<Self, FeedbackParseError> {
        serde_json::from_str::<Wire>(json)?.try_into()
    }

    /// Parse an event wrapped in an SNS notification.
    ///
    /// # Errors
    ///
    /// As [`Self::from_json`]. A subscription confirmation request is
    /// returned as [`FeedbackParseError::SubscriptionConfirmation`] carrying
    /// the URL to visit.
    pub fn from_sns(json: &str) -> Result<Self, FeedbackParseError> {
        let envelope: SnsEnvelope = serde_json::from_str(json)?;

        match envelope.kind.as_str() {
            "Notification" => {
                let message = envelope
                    .message
                    .ok_or(FeedbackParseError::MissingPayload("Notification"))?;
                Self::from_json(&message)
            }
            "SubscriptionConfirmation" => Err(FeedbackParseError::SubscriptionConfirmation {
                subscribe_url: envelope.subscribe_url.unwrap_or_default(),
            }),
            other => Err(FeedbackParseError::UnexpectedSns(other.to_string())),
        }
    }

    #[must_use]
    pub const fn mail(&self) -> &MailHeaders {
        match self {
            Self::Bounce { mail, .. }
            | Self::Complaint { mail, .. }
            | Self::Reject { mail, .. }
            | Self::Send { mail }
            | Self::Delivery { mail, .. } => mail,
        }
    }

    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Bounce { .. } => "Bounce",
            Self::Complaint { .. } => "Complaint",
            Self::Reject { .. } => "Reject",
            Self::Send { .. } => "Send",
            Self::Delivery { .. } => "Delivery",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnsEnvelope {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "SubscribeURL")]
    subscribe_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Wire {
    #[serde(alias = "notificationType")]
    event_type: String,
    mail: WireMail,
    bounce: Option<WireBounce>,
    complaint: Option<WireComplaint>,
    reject: Option<WireReject>,
    delivery: Option<WireDelivery>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMail {
    message_id: String,
    #[serde(default)]
    common_headers: WireCommonHeaders,
}

#[derive(Debug, Default, Deserialize)]
struct WireCommonHeaders {
    #[serde(default)]
    from: Vec<String>,
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    subject: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBounce {
    bounce_type: String,
    #[serde(default)]
    bounce_sub_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComplaint {
    complaint_sub_type: Option<String>,
    complaint_feedback_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReject {
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDelivery {
    smtp_response: Option<String>,
}

impl TryFrom<Wire> for FeedbackEvent {
    type Error = FeedbackParseError;

    fn try_from(wire: Wire) -> Result<Self, Self::Error> {
        let headers = wire.mail.common_headers;
        let mail = MailHeaders {
            message_id: wire.mail.message_id,
            from: headers.from,
            to: headers.to,
            subject: headers.subject,
        };

        match wire.event_type.as_str() {
            "Bounce" => {
                let bounce = wire
                    .bounce
                    .ok_or(FeedbackParseError::MissingPayload("bounce"))?;
                Ok(Self::Bounce {
                    mail,
                    bounce_type: bounce.bounce_type,
                    bounce_sub_type: bounce.bounce_sub_type,
                })
            }
            "Complaint" => {
                let complaint = wire
                    .complaint
                    .ok_or(FeedbackParseError::MissingPayload("complaint"))?;
                Ok(Self::Complaint {
                    mail,
                    complaint_sub_type: complaint.complaint_sub_type,
                    complaint_feedback_type: complaint.complaint_feedback_type,
                })
            }
            "Reject" => {
                let reject = wire
                    .reject
                    .ok_or(FeedbackParseError::MissingPayload("reject"))?;
                Ok(Self::Reject {
                    mail,
                    reason: reject.reason,
                })
            }
            "Send" => Ok(Self::Send { mail }),
            "Delivery" => Ok(Self::Delivery {
                mail,
                smtp_response: wire.delivery.and_then(|d| d.smtp_response),
            }),
            other => Err(FeedbackParseError::UnknownEventType(other.to_string())),
        }
    }
}
