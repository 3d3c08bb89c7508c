use std::sync::Arc;

use missive_common::inbound;

use super::event::{FeedbackEvent, MailHeaders};
use crate::roster::SubscriberLifecycle;

/// Complaint reason that means the recipient wants the mail after all.
const NOT_SPAM: &str = "not-spam";

/// What a dispatch did to the subscriber set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub removed: usize,
    pub restored: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
enum Action<'a> {
    Remove(&'a str),
    Restore,
}

/// Applies delivery feedback to the subscriber set.
///
/// Bounces and complaints remove recipients; a `not-spam` complaint restores
/// them. Everything else is only logged. Failures for one recipient are
/// logged and never stop the others.
#[derive(Debug, Clone)]
pub struct FeedbackDispatcher {
    lifecycle: Arc<dyn SubscriberLifecycle>,
}

impl FeedbackDispatcher {
    #[must_use]
    pub fn new(lifecycle: Arc<dyn SubscriberLifecycle>) -> Self {
        Self { lifecycle }
    }

    pub async fn dispatch(&self, event: &FeedbackEvent) -> DispatchOutcome {
        let headers = event.mail();
        inbound!(
            event = event.event_type(),
            message_id = %headers.message_id,
            recipients = headers.to.len(),
            "Feedback received"
        );

        match event {
            FeedbackEvent::Send { mail } => {
                inbound!(level = INFO, message_id = %mail.message_id, "Message accepted for sending");
                DispatchOutcome::default()
            }
            FeedbackEvent::Delivery {
                mail,
                smtp_response,
            } => {
                inbound!(
                    level = INFO,
                    message_id = %mail.message_id,
                    smtp_response = smtp_response.as_deref().unwrap_or_default(),
                    "Message delivered"
                );
                DispatchOutcome::default()
            }
            FeedbackEvent::Reject { mail, reason } => {
                inbound!(
                    level = WARN,
                    message_id = %mail.message_id,
                    %reason,
                    "Message rejected by provider"
                );
                DispatchOutcome::default()
            }
            FeedbackEvent::Bounce {
                mail,
                bounce_type,
                bounce_sub_type,
            } => {
                if bounce_type == "Transient" {
                    inbound!(
                        level = INFO,
                        message_id = %mail.message_id,
                        %bounce_sub_type,
                        "Transient bounce, keeping recipients"
                    );
                    return DispatchOutcome::default();
                }

                let reason = format!("{bounce_type}/{bounce_sub_type}");
                self.apply(mail, Action::Remove(&reason)).await
            }
            FeedbackEvent::Complaint {
                mail,
                complaint_sub_type,
                complaint_feedback_type,
            } => {
                let reason = complaint_reason(
                    complaint_sub_type.as_deref(),
                    complaint_feedback_type.as_deref(),
                );

                if reason == NOT_SPAM {
                    self.apply(mail, Action::Restore).await
                } else {
                    self.apply(mail, Action::Remove(reason)).await
                }
            }
        }
    }

    async fn apply(&self, mail: &MailHeaders, action: Action<'_>) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for email in &mail.to {
            let result = match action {
                Action::Remove(reason) => self.lifecycle.remove(email, reason).await,
                Action::Restore => self.lifecycle.restore(email).await,
            };

            match (result, action) {
                (Ok(()), Action::Remove(reason)) => {
                    outcome.removed += 1;
                    inbound!(
                        level = INFO,
                        message_id = %mail.message_id,
                        %email,
                        %reason,
                        "Recipient removed"
                    );
                }
                (Ok(()), Action::Restore) => {
                    outcome.restored += 1;
                    inbound!(level = INFO, message_id = %mail.message_id, %email, "Recipient restored");
                }
                (Err(err), _) => {
                    outcome.failed += 1;
                    inbound!(
                        level = ERROR,
                        message_id = %mail.message_id,
                        %email,
                        action = ?action,
                        error = %err,
                        "Failed to apply feedback to recipient"
                    );
                }
            }
        }

        outcome
    }
}

/// Sub-type, else feedback type, else `unknown`.
///
/// An unclassified complaint still removes the recipient.
fn complaint_reason<'a>(sub_type: Option<&'a str>, feedback_type: Option<&'a str>) -> &'a str {
    sub_type
        .filter(|s| !s.is_empty())
        .or_else(|| feedback_type.filter(|s| !s.is_empty()))
        .unwrap_or("unknown")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{LifecycleCall, RecordingLifecycle};

    fn mail(to: &[&str]) -> MailHeaders {
        MailHeaders {
            message_id: "msg-1".to_string(),
            from: vec!["news@acme.io".to_string()],
            to: to.iter().map(ToString::to_string).collect(),
            subject: "Spring issue".to_string(),
        }
    }

    fn dispatcher(lifecycle: RecordingLifecycle) -> (FeedbackDispatcher, Arc<RecordingLifecycle>) {
        let lifecycle = Arc::new(lifecycle);
        (FeedbackDispatcher::new(lifecycle.clone()), lifecycle)
    }

    fn remove(email: &str, reason: &str) -> LifecycleCall {
        LifecycleCall::Remove {
            email: email.to_string(),
            reason: reason.to_string(),
        }
    }

    #[tokio::test]
    async fn test_permanent_bounce_removes_once() {
        let (dispatcher, lifecycle) = dispatcher(RecordingLifecycle::default());
        let event = FeedbackEvent::Bounce {
            mail: mail(&["a@x.com"]),
            bounce_type: "Permanent".to_string(),
            bounce_sub_type: "NoEmail".to_string(),
        };

        let outcome = dispatcher.dispatch(&event).await;

        assert_eq!(lifecycle.calls(), vec![remove("a@x.com", "Permanent/NoEmail")]);
        assert_eq!(
            outcome,
            DispatchOutcome {
                removed: 1,
                ..DispatchOutcome::default()
            }
        );
    }

    #[tokio::test]
    async fn test_undetermined_bounce_removes() {
        let (dispatcher, lifecycle) = dispatcher(RecordingLifecycle::default());
        let event = FeedbackEvent::Bounce {
            mail: mail(&["a@x.com", "b@x.com"]),
            bounce_type: "Undetermined".to_string(),
            bounce_sub_type: "Undetermined".to_string(),
        };

        dispatcher.dispatch(&event).await;
        assert_eq!(
            lifecycle.calls(),
            vec![
                remove("a@x.com", "Undetermined/Undetermined"),
                remove("b@x.com", "Undetermined/Undetermined"),
            ]
        );
    }

    #[tokio::test]
    async fn test_transient_bounce_is_ignored() {
        let (dispatcher, lifecycle) = dispatcher(RecordingLifecycle::default());
        let event = FeedbackEvent::Bounce {
            mail: mail(&["a@x.com"]),
            bounce_type: "Transient".to_string(),
            bounce_sub_type: "MailboxFull".to_string(),
        };

        assert_eq!(dispatcher.dispatch(&event).await, DispatchOutcome::default());
        assert!(lifecycle.calls().is_empty());
    }

    #[tokio::test]
    async fn test_not_spam_complaint_restores() {
        let (dispatcher, lifecycle) = dispatcher(RecordingLifecycle::default());
        let event = FeedbackEvent::Complaint {
            mail: mail(&["a@x.com"]),
            complaint_sub_type: None,
            complaint_feedback_type: Some("not-spam".to_string()),
        };

        let outcome = dispatcher.dispatch(&event).await;

        assert_eq!(
            lifecycle.calls(),
            vec![LifecycleCall::Restore {
                email: "a@x.com".to_string()
            }]
        );
        assert_eq!(outcome.restored, 1);
        assert_eq!(outcome.removed, 0);
    }

    #[tokio::test]
    async fn test_complaint_reason_precedence() {
        let cases = [
            (Some("OnAccountSuppressionList"), Some("abuse"), "OnAccountSuppressionList"),
            (None, Some("abuse"), "abuse"),
            (Some(""), Some("fraud"), "fraud"),
            (None, None, "unknown"),
        ];

        for (sub_type, feedback_type, expected) in cases {
            let (dispatcher, lifecycle) = dispatcher(RecordingLifecycle::default());
            let event = FeedbackEvent::Complaint {
                mail: mail(&["a@x.com"]),
                complaint_sub_type: sub_type.map(ToString::to_string),
                complaint_feedback_type: feedback_type.map(ToString::to_string),
            };

            dispatcher.dispatch(&event).await;
            assert_eq!(lifecycle.calls(), vec![remove("a@x.com", expected)]);
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_recipients() {
        let (dispatcher, lifecycle) = dispatcher(RecordingLifecycle::failing_for(&["b@x.com"]));
        let event = FeedbackEvent::Bounce {
            mail: mail(&["a@x.com", "b@x.com", "c@x.com"]),
            bounce_type: "Permanent".to_string(),
            bounce_sub_type: "General".to_string(),
        };

        let outcome = dispatcher.dispatch(&event).await;

        assert_eq!(lifecycle.calls().len(), 3);
        assert_eq!(
            outcome,
            DispatchOutcome {
                removed: 2,
                restored: 0,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_informational_events_change_nothing() {
        let (dispatcher, lifecycle) = dispatcher(RecordingLifecycle::default());
        let events = [
            FeedbackEvent::Send {
                mail: mail(&["a@x.com"]),
            },
            FeedbackEvent::Delivery {
                mail: mail(&["a@x.com"]),
                smtp_response: Some("250 OK".to_string()),
            },
            FeedbackEvent::Reject {
                mail: mail(&["a@x.com"]),
                reason: "Bad content".to_string(),
            },
        ];

        for event in &events {
            assert_eq!(dispatcher.dispatch(event).await, DispatchOutcome::default());
        }
        assert!(lifecycle.calls().is_empty());
    }
}
