//! V2 synchronization - keep the accessory's copy of the configuration current

use std::sync::Arc;

use glint_proto::{Command, PackedHash};

use crate::accessory::{Accessory, TransportError};
use crate::hash::ConfigurationSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The stored hash already matched, nothing was written
    AlreadyMatched(PackedHash),
    Updated { commands: usize, hash: PackedHash },
}

/// Commands that bring an accessory holding `current` in line with `snapshot`, and the hash
/// to store afterwards. `None` when nothing needs to change.
///
/// Partitions are compared separately and only a divergent partition is cleared and re-added.
pub fn commands_to_ensure(
    snapshot: &ConfigurationSnapshot,
    current: PackedHash,
) -> Option<(Vec<Command>, PackedHash)> {
    let correct = snapshot.packed_hash();
    if current == correct {
        return None;
    }

    let mut commands = Vec::new();

    if current.applications != correct.applications {
        commands.push(Command::ClearApplications);
        commands.extend(snapshot.applications.iter().map(|a| a.add_command()));
    }

    if current.contacts != correct.contacts {
        commands.push(Command::ClearContacts);
        commands.extend(snapshot.contacts.iter().flat_map(|c| c.add_commands()));
    }

    Some((commands, correct))
}

pub struct Synchronizer {
    accessory: Arc<dyn Accessory>,
}

impl Synchronizer {
    pub fn new(accessory: Arc<dyn Accessory>) -> Self {
        Self { accessory }
    }

    /// Make the accessory hold `snapshot`.
    ///
    /// The new hash is written only after every command was written, so an interrupted pass
    /// leaves the old hash in place and the next pass starts over.
    pub async fn ensure_matches(&self, snapshot: &ConfigurationSnapshot) -> Result<SyncOutcome, TransportError> {
        let name = self.accessory.name();
        let current = self.accessory.read_configuration_hash().await?;
        tracing::debug!(accessory = name, "current hash {current}, correct hash {}", snapshot.packed_hash());

        let Some((commands, hash)) = commands_to_ensure(snapshot, current) else {
            tracing::debug!(accessory = name, "configuration already matches");
            return Ok(SyncOutcome::AlreadyMatched(current));
        };

        let count = commands.len();
        for command in commands {
            tracing::trace!(accessory = name, "writing {command:?}");
            self.accessory.write_command(command).await?;
        }
        self.accessory.write_configuration_hash(hash).await?;

        tracing::info!(accessory = name, commands = count, "synchronized configuration, hash {hash}");
        Ok(SyncOutcome::Updated { commands: count, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{ApplicationConfiguration, ContactConfiguration};
    use crate::hash::packed_hash;
    use crate::test_support::FakeAccessory;
    use glint_proto::{LedColor, Vibration};
    use pretty_assertions::assert_eq;

    fn snapshot() -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            applications: vec![
                ApplicationConfiguration::new("com.apple.MobileSMS", LedColor::Green, Vibration::OnePulse),
                ApplicationConfiguration::new("com.x.mail", LedColor::Blue, Vibration::TwoPulses),
            ],
            contacts: vec![ContactConfiguration::new(
                "1",
                vec!["Alexandra".to_string(), "Alex".to_string()],
                LedColor::Red,
            )],
        }
    }

    #[test]
    fn matching_hash_needs_nothing() {
        let snapshot = snapshot();
        assert_eq!(commands_to_ensure(&snapshot, snapshot.packed_hash()), None);
    }

    #[test]
    fn contact_change_leaves_applications_alone() {
        let snapshot = snapshot();
        let stale = PackedHash::new(snapshot.packed_hash().applications, 0xdead_beef);

        let (commands, hash) = commands_to_ensure(&snapshot, stale).unwrap();
        assert_eq!(hash, snapshot.packed_hash());
        assert_eq!(
            commands,
            vec![
                Command::ClearContacts,
                Command::AddContact { name: "Alexandra".to_string(), color: LedColor::Red },
                Command::AddContact { name: "Alex".to_string(), color: LedColor::Red },
            ]
        );
    }

    #[test]
    fn both_partitions_stale() {
        let snapshot = snapshot();
        let (commands, _) = commands_to_ensure(&snapshot, PackedHash::default()).unwrap();
        assert_eq!(commands.len(), 1 + 2 + 1 + 2);
        assert_eq!(commands[0], Command::ClearApplications);
        assert_eq!(commands[3], Command::ClearContacts);
    }

    #[test]
    fn empty_partition_is_cleared() {
        let snapshot = ConfigurationSnapshot::default();
        let stale = PackedHash::new(7, 0);
        let (commands, hash) = commands_to_ensure(&snapshot, stale).unwrap();
        assert_eq!(commands, vec![Command::ClearApplications]);
        assert_eq!(hash, PackedHash::new(0, 0));
    }

    #[tokio::test]
    async fn stale_applications_are_rewritten_then_hashed() {
        let snapshot = snapshot();
        let correct = snapshot.packed_hash();
        let accessory = Arc::new(FakeAccessory::new("test"));
        accessory.set_hash(PackedHash::new(correct.applications ^ 1, correct.contacts));

        let outcome = Synchronizer::new(accessory.clone()).ensure_matches(&snapshot).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Updated { commands: 3, hash: correct });
        assert_eq!(
            accessory.commands(),
            vec![
                Command::ClearApplications,
                Command::AddApplication {
                    identifier: "com.apple.MobileSMS".to_string(),
                    color: LedColor::Green,
                    vibration: Vibration::OnePulse,
                },
                Command::AddApplication {
                    identifier: "com.x.mail".to_string(),
                    color: LedColor::Blue,
                    vibration: Vibration::TwoPulses,
                },
            ]
        );
        assert_eq!(accessory.hash_writes(), vec![correct]);
    }

    #[tokio::test]
    async fn matching_accessory_is_only_read() {
        let snapshot = snapshot();
        let accessory = Arc::new(FakeAccessory::new("test"));
        accessory.set_hash(snapshot.packed_hash());

        let outcome = Synchronizer::new(accessory.clone()).ensure_matches(&snapshot).await.unwrap();

        assert_eq!(outcome, SyncOutcome::AlreadyMatched(snapshot.packed_hash()));
        assert!(accessory.commands().is_empty());
        assert!(accessory.hash_writes().is_empty());
    }

    #[tokio::test]
    async fn write_failure_keeps_old_hash() {
        let snapshot = snapshot();
        let accessory = Arc::new(FakeAccessory::new("test"));
        accessory.fail_writes_after(2);

        let result = Synchronizer::new(accessory.clone()).ensure_matches(&snapshot).await;

        assert!(matches!(result, Err(TransportError::Disconnected)));
        assert_eq!(accessory.commands().len(), 2);
        assert!(accessory.hash_writes().is_empty());
        assert_eq!(accessory.hash(), PackedHash::default());
    }

    #[tokio::test]
    async fn read_failure_writes_nothing() {
        let accessory = Arc::new(FakeAccessory::new("test"));
        accessory.fail_reads(true);

        let result = Synchronizer::new(accessory.clone()).ensure_matches(&snapshot()).await;

        assert!(result.is_err());
        assert!(accessory.commands().is_empty());
    }

    #[tokio::test]
    async fn second_pass_after_success_is_a_no_op() {
        let snapshot = snapshot();
        let accessory = Arc::new(FakeAccessory::new("test"));
        let synchronizer = Synchronizer::new(accessory.clone());

        synchronizer.ensure_matches(&snapshot).await.unwrap();
        let again = synchronizer.ensure_matches(&snapshot).await.unwrap();

        assert_eq!(again, SyncOutcome::AlreadyMatched(packed_hash(&snapshot.applications, &snapshot.contacts)));
    }
}
