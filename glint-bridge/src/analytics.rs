//! Analytics events produced while handling notifications

use glint_proto::ProtocolVersion;

/// Whether feedback was produced for a notification, and why not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifiedEvent {
    pub application_identifier: String,
    pub sent: bool,
    /// The user turned feedback on for this application
    pub enabled: bool,
    /// The application has a configuration at all
    pub supported: bool,
    pub version: ProtocolVersion,
}

impl NotifiedEvent {
    pub fn sent(application_identifier: impl Into<String>, version: ProtocolVersion) -> Self {
        Self {
            application_identifier: application_identifier.into(),
            sent: true,
            enabled: true,
            supported: true,
            version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsEvent {
    Notified(NotifiedEvent),
    /// Feedback fired for a configured application, labelled with its short name
    NotificationSent { label: String },
}

impl From<NotifiedEvent> for AnalyticsEvent {
    fn from(event: NotifiedEvent) -> Self {
        Self::Notified(event)
    }
}

pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: AnalyticsEvent);
}

/// Sink that writes events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        match event {
            AnalyticsEvent::Notified(e) => tracing::info!(
                target: "glint::analytics",
                application = %e.application_identifier,
                sent = e.sent,
                enabled = e.enabled,
                supported = e.supported,
                version = %e.version,
                "notified"
            ),
            AnalyticsEvent::NotificationSent { label } => {
                tracing::info!(target: "glint::analytics", %label, "notification sent")
            }
        }
    }
}
