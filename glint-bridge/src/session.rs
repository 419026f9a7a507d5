//! Per-accessory event loop: V1 arbitration or debounced V2 synchronization

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};

use glint_proto::{Notification, PackedHash};

use crate::accessory::{Accessory, AccessoryEvent, ProtocolMode};
use crate::analytics::{AnalyticsSink, NotifiedEvent};
use crate::arbitrator::{Arbitrator, Clock, Policy};
use crate::configuration::{BridgeConfig, Configuration};
use crate::hash::ConfigurationSnapshot;
use crate::signatures::SignatureCache;
use crate::sync::{SyncOutcome, Synchronizer};

/// Where V2 synchronization of one accessory stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Synced(PackedHash),
    Failed(String),
}

pub struct AccessorySession {
    name: String,
    arbitrator: Arbitrator,
    synchronizer: Synchronizer,
    configuration: watch::Receiver<Configuration>,
    analytics: Arc<dyn AnalyticsSink>,
    debounce: Duration,
    mode: ProtocolMode,
    ready: bool,
    unready_reason: Option<String>,
    sync_state: watch::Sender<SyncState>,
}

impl AccessorySession {
    pub fn new(
        accessory: Arc<dyn Accessory>,
        cache: SignatureCache,
        configuration: watch::Receiver<Configuration>,
        analytics: Arc<dyn AnalyticsSink>,
        config: &BridgeConfig,
    ) -> Self {
        let (sync_state, _) = watch::channel(SyncState::Idle);
        Self {
            name: accessory.name().to_string(),
            arbitrator: Arbitrator::new(
                accessory.clone(),
                cache,
                configuration.clone(),
                analytics.clone(),
                Policy::from(config),
            ),
            synchronizer: Synchronizer::new(accessory),
            configuration,
            analytics,
            debounce: config.debounce(),
            mode: ProtocolMode::Unknown,
            ready: false,
            unready_reason: None,
            sync_state,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.arbitrator = self.arbitrator.with_clock(clock);
        self
    }

    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        self.sync_state.subscribe()
    }

    /// Process events until the transport closes the channel
    pub async fn run(mut self, mut events: mpsc::Receiver<AccessoryEvent>) {
        let mut configuration = self.configuration.clone();
        let mut configuration_open = true;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, &mut deadline).await,
                    None => break,
                },
                changed = configuration.changed(), if configuration_open => match changed {
                    Ok(()) => self.configuration_changed(&mut deadline),
                    Err(_) => configuration_open = false,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.synchronize().await;
                }
            }
        }

        tracing::debug!(accessory = %self.name, "session ended");
    }

    async fn handle_event(&mut self, event: AccessoryEvent, deadline: &mut Option<Instant>) {
        match event {
            AccessoryEvent::Notification(notification) => self.notification(notification).await,
            AccessoryEvent::Ready(mode) => {
                tracing::info!(accessory = %self.name, ?mode, "accessory ready");
                self.mode = mode;
                self.ready = true;
                self.unready_reason = None;
                if mode == ProtocolMode::Automatic {
                    *deadline = None;
                    self.synchronize().await;
                }
            }
            AccessoryEvent::Unready(reason) => {
                tracing::info!(accessory = %self.name, "accessory not ready: {reason}");
                self.ready = false;
                self.unready_reason = Some(reason);
                *deadline = None;
            }
            AccessoryEvent::Disconnected => {
                tracing::info!(accessory = %self.name, "accessory disconnected");
                self.ready = false;
                self.mode = ProtocolMode::Unknown;
                self.unready_reason = Some("disconnected".to_string());
                *deadline = None;
                self.sync_state.send_replace(SyncState::Idle);
            }
        }
    }

    async fn notification(&self, notification: Notification) {
        match self.mode {
            ProtocolMode::Phone => {
                // logged and tracked by the arbitrator
                let _ = self.arbitrator.handle(notification).await;
            }
            ProtocolMode::Automatic => {
                let configured = self
                    .configuration
                    .borrow()
                    .application_matching(&notification.application_identifier)
                    .is_some();
                if configured {
                    self.analytics.track(
                        NotifiedEvent::sent(notification.application_identifier, notification.version).into(),
                    );
                }
            }
            ProtocolMode::Unknown => {
                tracing::debug!(accessory = %self.name, "ignoring notification before mode is known: {notification}");
            }
        }
    }

    fn configuration_changed(&self, deadline: &mut Option<Instant>) {
        if self.mode != ProtocolMode::Automatic {
            return;
        }
        if !self.ready {
            tracing::info!(
                accessory = %self.name,
                "configuration changed while not ready ({}), waiting for accessory",
                self.unready_reason.as_deref().unwrap_or("unknown")
            );
            return;
        }
        *deadline = Some(Instant::now() + self.debounce);
    }

    async fn synchronize(&self) {
        let snapshot = ConfigurationSnapshot::from_configuration(&self.configuration.borrow());
        self.sync_state.send_replace(SyncState::Syncing);

        let state = match self.synchronizer.ensure_matches(&snapshot).await {
            Ok(SyncOutcome::AlreadyMatched(hash)) | Ok(SyncOutcome::Updated { hash, .. }) => SyncState::Synced(hash),
            Err(e) => {
                tracing::warn!(accessory = %self.name, "synchronization failed: {e}");
                SyncState::Failed(e.to_string())
            }
        };
        self.sync_state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::AnalyticsEvent;
    use crate::configuration::ApplicationConfiguration;
    use crate::test_support::{FakeAccessory, FixedClock, RecordingAnalytics};
    use chrono::Utc;
    use glint_proto::{Category, Command, LedColor, ProtocolVersion, Vibration};
    use pretty_assertions::assert_eq;
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    struct Harness {
        accessory: Arc<FakeAccessory>,
        analytics: Arc<RecordingAnalytics>,
        configuration: watch::Sender<Configuration>,
        events: mpsc::Sender<AccessoryEvent>,
        state: watch::Receiver<SyncState>,
        task: JoinHandle<()>,
    }

    fn start(configuration: Configuration) -> Harness {
        let accessory = Arc::new(FakeAccessory::new("test"));
        let analytics = Arc::new(RecordingAnalytics::default());
        let (configuration_tx, configuration_rx) = watch::channel(configuration);
        let (events_tx, events_rx) = mpsc::channel(16);

        let session = AccessorySession::new(
            accessory.clone(),
            SignatureCache::in_memory(300),
            configuration_rx,
            analytics.clone(),
            &BridgeConfig::default(),
        )
        .with_clock(Arc::new(FixedClock(Utc::now())));
        let state = session.sync_state();
        let task = tokio::spawn(session.run(events_rx));

        Harness {
            accessory,
            analytics,
            configuration: configuration_tx,
            events: events_tx,
            state,
            task,
        }
    }

    fn configuration(color: LedColor) -> Configuration {
        Configuration {
            applications: vec![ApplicationConfiguration::new("com.x.mail", color, Vibration::OnePulse)],
            ..Configuration::default()
        }
    }

    fn synced_hash(configuration: &Configuration) -> SyncState {
        SyncState::Synced(ConfigurationSnapshot::from_configuration(configuration).packed_hash())
    }

    #[tokio::test(start_paused = true)]
    async fn ready_accessory_is_synchronized_immediately() {
        let mut h = start(configuration(LedColor::Blue));
        h.events.send(AccessoryEvent::Ready(ProtocolMode::Automatic)).await.unwrap();

        let expected = synced_hash(&configuration(LedColor::Blue));
        h.state.wait_for(|s| *s == expected).await.unwrap();
        assert_eq!(h.accessory.commands().len(), 2);
        assert_eq!(h.accessory.hash_writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_bursts_are_debounced() {
        let mut h = start(Configuration::default());
        h.events.send(AccessoryEvent::Ready(ProtocolMode::Automatic)).await.unwrap();
        h.state.wait_for(|s| matches!(s, SyncState::Synced(_))).await.unwrap();
        assert!(h.accessory.hash_writes().is_empty());

        h.configuration.send_replace(configuration(LedColor::Blue));
        sleep(Duration::from_secs(3)).await;
        h.configuration.send_replace(configuration(LedColor::Red));
        sleep(Duration::from_secs(3)).await;
        assert!(h.accessory.hash_writes().is_empty());

        let expected = synced_hash(&configuration(LedColor::Red));
        h.state.wait_for(|s| *s == expected).await.unwrap();
        assert_eq!(h.accessory.hash_writes().len(), 1);
        assert_eq!(
            h.accessory.commands(),
            vec![
                Command::ClearApplications,
                Command::AddApplication {
                    identifier: "com.x.mail".to_string(),
                    color: LedColor::Red,
                    vibration: Vibration::OnePulse,
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_sync() {
        let mut h = start(Configuration::default());
        h.events.send(AccessoryEvent::Ready(ProtocolMode::Automatic)).await.unwrap();
        h.state.wait_for(|s| matches!(s, SyncState::Synced(_))).await.unwrap();

        h.configuration.send_replace(configuration(LedColor::Blue));
        sleep(Duration::from_secs(1)).await;
        h.events.send(AccessoryEvent::Disconnected).await.unwrap();
        sleep(Duration::from_secs(10)).await;

        assert!(h.accessory.hash_writes().is_empty());
        assert_eq!(*h.state.borrow(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn changes_while_unready_wait_for_ready() {
        let mut h = start(Configuration::default());
        h.events.send(AccessoryEvent::Ready(ProtocolMode::Automatic)).await.unwrap();
        h.state.wait_for(|s| matches!(s, SyncState::Synced(_))).await.unwrap();

        h.events.send(AccessoryEvent::Unready("bonding".to_string())).await.unwrap();
        h.configuration.send_replace(configuration(LedColor::Green));
        sleep(Duration::from_secs(10)).await;
        assert!(h.accessory.hash_writes().is_empty());

        h.events.send(AccessoryEvent::Ready(ProtocolMode::Automatic)).await.unwrap();
        let expected = synced_hash(&configuration(LedColor::Green));
        h.state.wait_for(|s| *s == expected).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unready_cancels_pending_sync() {
        let mut h = start(Configuration::default());
        h.events.send(AccessoryEvent::Ready(ProtocolMode::Automatic)).await.unwrap();
        h.state.wait_for(|s| matches!(s, SyncState::Synced(_))).await.unwrap();

        h.configuration.send_replace(configuration(LedColor::Blue));
        sleep(Duration::from_secs(1)).await;
        h.events.send(AccessoryEvent::Unready("bonding".to_string())).await.unwrap();
        sleep(Duration::from_secs(10)).await;

        assert!(h.accessory.commands().is_empty());
        assert!(h.accessory.hash_writes().is_empty());

        h.events.send(AccessoryEvent::Ready(ProtocolMode::Automatic)).await.unwrap();
        let expected = synced_hash(&configuration(LedColor::Blue));
        h.state.wait_for(|s| *s == expected).await.unwrap();
        assert_eq!(h.accessory.hash_writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pass_is_reported_and_retried_on_next_trigger() {
        let mut h = start(configuration(LedColor::Blue));
        h.accessory.fail_reads(true);
        h.events.send(AccessoryEvent::Ready(ProtocolMode::Automatic)).await.unwrap();
        h.state.wait_for(|s| matches!(s, SyncState::Failed(_))).await.unwrap();

        h.accessory.fail_reads(false);
        h.configuration.send_replace(configuration(LedColor::Yellow));
        let expected = synced_hash(&configuration(LedColor::Yellow));
        h.state.wait_for(|s| *s == expected).await.unwrap();
    }

    #[tokio::test]
    async fn phone_mode_arbitrates_notifications() {
        let mut configuration = configuration(LedColor::Purple);
        configuration.applications[0].vibration = Vibration::ThreePulses;
        let h = start(configuration);

        let notification = Notification::new(ProtocolVersion::V1, Category::Email, "com.x.mail", "Inbox")
            .with_date(Utc::now());
        h.events.send(AccessoryEvent::Ready(ProtocolMode::Phone)).await.unwrap();
        h.events.send(AccessoryEvent::Notification(notification.clone())).await.unwrap();
        h.events.send(AccessoryEvent::Notification(notification)).await.unwrap();
        drop(h.events);
        h.task.await.unwrap();

        assert_eq!(
            h.accessory.commands(),
            vec![
                Command::Notification {
                    color: LedColor::Purple,
                    vibration: Vibration::ThreePulses,
                    secondary_color: LedColor::None,
                },
                Command::NoAction,
            ]
        );
        assert!(h.accessory.hash_writes().is_empty());
    }

    #[tokio::test]
    async fn automatic_mode_only_tracks_notifications() {
        let h = start(configuration(LedColor::Blue));
        h.accessory.set_hash(synced_hash_value(&configuration(LedColor::Blue)));

        h.events.send(AccessoryEvent::Ready(ProtocolMode::Automatic)).await.unwrap();
        for application in ["com.x.mail", "com.x.unknown"] {
            let notification = Notification::new(ProtocolVersion::V2, Category::Email, application, "Inbox");
            h.events.send(AccessoryEvent::Notification(notification)).await.unwrap();
        }
        drop(h.events);
        h.task.await.unwrap();

        assert!(h.accessory.commands().is_empty());
        assert_eq!(
            h.analytics.events(),
            vec![AnalyticsEvent::Notified(NotifiedEvent::sent("com.x.mail", ProtocolVersion::V2))]
        );
    }

    #[tokio::test]
    async fn notifications_before_ready_are_ignored() {
        let h = start(configuration(LedColor::Blue));
        let notification = Notification::new(ProtocolVersion::V1, Category::Email, "com.x.mail", "Inbox")
            .with_date(Utc::now());
        h.events.send(AccessoryEvent::Notification(notification)).await.unwrap();
        drop(h.events);
        h.task.await.unwrap();

        assert!(h.accessory.commands().is_empty());
        assert!(h.analytics.events().is_empty());
    }

    fn synced_hash_value(configuration: &Configuration) -> PackedHash {
        ConfigurationSnapshot::from_configuration(configuration).packed_hash()
    }
}
