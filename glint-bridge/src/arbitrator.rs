//! V1 arbitration - the phone decides, per notification, whether the accessory gives feedback

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;

use glint_proto::{Command, LedColor, Notification, NotificationFlags};

use crate::accessory::Accessory;
use crate::analytics::{AnalyticsEvent, AnalyticsSink, NotifiedEvent};
use crate::configuration::{ApplicationConfiguration, BridgeConfig, Configuration, ContactConfiguration};
use crate::rejection::{Rejection, RejectionReason};
use crate::signatures::{SignatureCache, Signatures};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Acceptance window around "now" for dated notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub past: Duration,
    /// Tolerance for accessory clock skew
    pub future: Duration,
}

impl Default for DateWindow {
    fn default() -> Self {
        Self {
            past: Duration::from_secs(3600),
            future: Duration::from_secs(600),
        }
    }
}

impl DateWindow {
    pub fn check(&self, date: DateTime<Utc>, now: DateTime<Utc>) -> Option<RejectionReason> {
        let past = TimeDelta::from_std(self.past).unwrap_or(TimeDelta::MAX);
        let future = TimeDelta::from_std(self.future).unwrap_or(TimeDelta::MAX);
        let past_cutoff = now.checked_sub_signed(past).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let future_cutoff = now.checked_add_signed(future).unwrap_or(DateTime::<Utc>::MAX_UTC);

        if date < past_cutoff {
            Some(RejectionReason::TooOld {
                notification_date: date,
                cutoff_date: past_cutoff,
            })
        } else if date > future_cutoff {
            Some(RejectionReason::TooNew {
                notification_date: date,
                cutoff_date: future_cutoff,
            })
        } else {
            None
        }
    }
}

/// Decision inputs that come from bridge settings rather than the user's configuration
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub window: DateWindow,
    /// Applications whose notification titles are contact names
    pub inner_ring_applications: Vec<String>,
}

impl Policy {
    pub fn supports_inner_ring(&self, application_identifier: &str) -> bool {
        self.inner_ring_applications
            .iter()
            .any(|a| a.eq_ignore_ascii_case(application_identifier))
    }
}

impl From<&BridgeConfig> for Policy {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            window: config.date_window(),
            inner_ring_applications: config.inner_ring_applications.clone(),
        }
    }
}

/// An accepted notification and the feedback it produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub notification: Notification,
    pub application: ApplicationConfiguration,
    pub contact: Option<ContactConfiguration>,
}

impl Dispatch {
    /// Application color and vibration, with the contact's color as secondary
    pub fn command(&self) -> Command {
        Command::Notification {
            color: self.application.color,
            vibration: self.application.vibration,
            secondary_color: self.contact.as_ref().map_or(LedColor::None, |c| c.color),
        }
    }
}

/// Decide whether `notification` should produce feedback. Pure: the caller applies side effects.
pub fn evaluate(
    signatures: &Signatures,
    configuration: &Configuration,
    policy: &Policy,
    now: DateTime<Utc>,
    notification: Notification,
) -> Result<Dispatch, Rejection> {
    let reject = |notification, reason| Err(Rejection::new(notification, reason));

    if signatures.contains(&notification.signature()) {
        return reject(notification, RejectionReason::AlreadySent);
    }

    if let Some(flags) = notification.flags
        && (flags.contains(NotificationFlags::SILENT) || flags.contains(NotificationFlags::PRE_EXISTING))
    {
        return reject(notification, RejectionReason::Flags(flags));
    }

    let application = match configuration.application_matching(&notification.application_identifier) {
        Some(a) if a.activated => a.clone(),
        Some(_) => return reject(notification, RejectionReason::ApplicationNotActivated),
        None => return reject(notification, RejectionReason::NoApplicationConfiguration),
    };

    // incoming calls ring now, whatever date the accessory reports
    if !notification.is_incoming_call() {
        let Some(date) = notification.date else {
            return reject(notification, RejectionReason::NoDate);
        };
        if let Some(reason) = policy.window.check(date, now) {
            return reject(notification, reason);
        }
    }

    let contact = if policy.supports_inner_ring(&notification.application_identifier) {
        let contact = configuration.contact_matching(&notification.title).cloned();
        if contact.is_none() && configuration.inner_ring {
            return reject(notification, RejectionReason::Contacts);
        }
        contact
    } else {
        None
    };

    Ok(Dispatch {
        notification,
        application,
        contact,
    })
}

/// Applies V1 decisions for one accessory
pub struct Arbitrator {
    accessory: Arc<dyn Accessory>,
    cache: SignatureCache,
    configuration: watch::Receiver<Configuration>,
    analytics: Arc<dyn AnalyticsSink>,
    policy: Policy,
    clock: Arc<dyn Clock>,
}

impl Arbitrator {
    pub fn new(
        accessory: Arc<dyn Accessory>,
        cache: SignatureCache,
        configuration: watch::Receiver<Configuration>,
        analytics: Arc<dyn AnalyticsSink>,
        policy: Policy,
    ) -> Self {
        Self {
            accessory,
            cache,
            configuration,
            analytics,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Decide on `notification`, record its signature, then write the result to the accessory.
    ///
    /// The signature is inserted before anything is written: the accessory may redeliver the
    /// notification while the write is in flight.
    pub async fn handle(&self, notification: Notification) -> Result<Dispatch, Rejection> {
        let signature = notification.signature();

        let configuration = self.configuration.borrow().clone();
        let outcome = {
            let mut cache = self.cache.lock();
            let outcome = evaluate(&cache, &configuration, &self.policy, self.clock.now(), notification);

            match &outcome {
                Err(r) if r.reason == RejectionReason::AlreadySent => {}
                _ => cache.insert(signature),
            }
            outcome
        };

        match &outcome {
            Ok(dispatch) => {
                let command = dispatch.command();
                tracing::info!(
                    accessory = self.accessory.name(),
                    "sending {command:?} for {}",
                    dispatch.notification
                );
                if let Err(e) = self.accessory.write_command(command).await {
                    tracing::warn!(accessory = self.accessory.name(), "failed to write notification: {e}");
                }

                self.analytics.track(
                    NotifiedEvent::sent(
                        dispatch.notification.application_identifier.clone(),
                        dispatch.notification.version,
                    )
                    .into(),
                );
                self.analytics.track(AnalyticsEvent::NotificationSent {
                    label: dispatch.application.analytics_name().to_string(),
                });
            }
            Err(rejection) => {
                tracing::info!(accessory = self.accessory.name(), "{rejection}");

                // the accessory still needs to know the phone saw it
                if let Err(e) = self.accessory.write_command(Command::NoAction).await {
                    tracing::warn!(accessory = self.accessory.name(), "failed to write no-action: {e}");
                }

                if let Some(event) = rejection.notified_event() {
                    self.analytics.track(event.into());
                }
            }
        }

        outcome
    }
}
