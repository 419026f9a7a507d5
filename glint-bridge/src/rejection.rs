//! Why a V1 notification did not produce feedback

use std::fmt;

use chrono::{DateTime, Utc};

use glint_proto::{Notification, NotificationFlags};

use crate::analytics::NotifiedEvent;

/// Closed set of reasons a notification is not forwarded as feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The signature is already in the cache
    AlreadySent,
    /// A configuration exists but the user turned it off
    ApplicationNotActivated,
    /// Inner ring is on and the sender is not a configured contact
    Contacts,
    TooOld {
        notification_date: DateTime<Utc>,
        cutoff_date: DateTime<Utc>,
    },
    TooNew {
        notification_date: DateTime<Utc>,
        cutoff_date: DateTime<Utc>,
    },
    /// No date, and not an incoming call
    NoDate,
    /// Silent or pre-existing
    Flags(NotificationFlags),
    NoApplicationConfiguration,
}

/// A notification paired with the reason it was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub notification: Notification,
    pub reason: RejectionReason,
}

impl Rejection {
    pub fn new(notification: Notification, reason: RejectionReason) -> Self {
        Self { notification, reason }
    }

    /// The analytics event for this rejection, if the reason is worth reporting.
    ///
    /// Duplicates, date window and flag rejections are transient and produce no event.
    pub fn notified_event(&self) -> Option<NotifiedEvent> {
        let (enabled, supported) = match self.reason {
            RejectionReason::ApplicationNotActivated => (false, true),
            RejectionReason::NoApplicationConfiguration => (false, false),
            RejectionReason::Contacts => (true, true),
            _ => return None,
        };

        Some(NotifiedEvent {
            application_identifier: self.notification.application_identifier.clone(),
            sent: false,
            enabled,
            supported,
            version: self.notification.version,
        })
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = &self.notification;
        match self.reason {
            RejectionReason::AlreadySent => write!(f, "notification already sent: {n}"),
            RejectionReason::ApplicationNotActivated => {
                write!(f, "notification application not activated: {n}")
            }
            RejectionReason::Contacts => write!(f, "notification did not pass contacts test: {n}"),
            RejectionReason::TooOld { notification_date, cutoff_date } => write!(
                f,
                "notification is too old: {n}, notification date {notification_date}, cutoff date {cutoff_date}"
            ),
            RejectionReason::TooNew { notification_date, cutoff_date } => write!(
                f,
                "notification is too new: {n}, notification date {notification_date}, cutoff date {cutoff_date}"
            ),
            RejectionReason::NoDate => write!(f, "notification has no date: {n}"),
            RejectionReason::Flags(flags) => write!(f, "notification rejected for flags {flags}: {n}"),
            RejectionReason::NoApplicationConfiguration => {
                write!(f, "notification did not have application configuration: {n}")
            }
        }
    }
}

impl std::error::Error for Rejection {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use glint_proto::{Category, ProtocolVersion};
    use pretty_assertions::assert_eq;

    fn notification() -> Notification {
        Notification::new(ProtocolVersion::V1, Category::Email, "com.x.mail", "Inbox")
    }

    #[test]
    fn missing_configuration_is_unsupported() {
        let rejection = Rejection::new(notification(), RejectionReason::NoApplicationConfiguration);
        assert_eq!(
            rejection.notified_event(),
            Some(NotifiedEvent {
                application_identifier: "com.x.mail".to_string(),
                sent: false,
                enabled: false,
                supported: false,
                version: ProtocolVersion::V1,
            })
        );
    }

    #[test]
    fn deactivated_application_is_supported_but_disabled() {
        let event = Rejection::new(notification(), RejectionReason::ApplicationNotActivated)
            .notified_event()
            .unwrap();
        assert!(!event.enabled);
        assert!(event.supported);
    }

    #[test]
    fn contacts_rejection_is_enabled_and_supported() {
        let event = Rejection::new(notification(), RejectionReason::Contacts)
            .notified_event()
            .unwrap();
        assert!(!event.sent);
        assert!(event.enabled);
        assert!(event.supported);
    }

    #[test]
    fn transient_reasons_have_no_event() {
        let date = Utc.timestamp_opt(100, 0).unwrap();
        let reasons = [
            RejectionReason::AlreadySent,
            RejectionReason::NoDate,
            RejectionReason::Flags(NotificationFlags::SILENT),
            RejectionReason::TooOld { notification_date: date, cutoff_date: date },
            RejectionReason::TooNew { notification_date: date, cutoff_date: date },
        ];
        for reason in reasons {
            assert_eq!(Rejection::new(notification(), reason).notified_event(), None);
        }
    }

    #[test]
    fn window_reasons_compare_dates_by_value() {
        let a = Utc.timestamp_opt(100, 0).unwrap();
        let b = Utc.timestamp_opt(200, 0).unwrap();
        let too_old = |n, c| RejectionReason::TooOld { notification_date: n, cutoff_date: c };

        assert_eq!(too_old(a, b), too_old(a, b));
        assert_ne!(too_old(a, b), too_old(b, a));
        assert_ne!(
            too_old(a, b),
            RejectionReason::TooNew { notification_date: a, cutoff_date: b }
        );
    }

    #[test]
    fn description_mentions_both_dates() {
        let a = Utc.timestamp_opt(100, 0).unwrap();
        let b = Utc.timestamp_opt(200, 0).unwrap();
        let text = Rejection::new(
            notification(),
            RejectionReason::TooNew { notification_date: b, cutoff_date: a },
        )
        .to_string();
        assert!(text.starts_with("notification is too new"));
        assert!(text.contains(&b.to_string()));
        assert!(text.contains(&a.to_string()));
    }
}
