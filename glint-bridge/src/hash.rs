//! Configuration snapshot and its order-independent packed hash

use sha2::{Digest, Sha256};

use glint_proto::PackedHash;

use crate::configuration::{ApplicationConfiguration, Configuration, ContactConfiguration};

/// What a V2 accessory should hold, derived on demand from the current configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    pub applications: Vec<ApplicationConfiguration>,
    pub contacts: Vec<ContactConfiguration>,
}

impl ConfigurationSnapshot {
    /// Deactivated applications are left off the accessory
    pub fn from_configuration(configuration: &Configuration) -> Self {
        Self {
            applications: configuration
                .applications
                .iter()
                .filter(|a| a.activated)
                .cloned()
                .collect(),
            contacts: configuration.contacts.clone(),
        }
    }

    pub fn packed_hash(&self) -> PackedHash {
        packed_hash(&self.applications, &self.contacts)
    }
}

pub fn packed_hash(
    applications: &[ApplicationConfiguration],
    contacts: &[ContactConfiguration],
) -> PackedHash {
    PackedHash::new(
        fold(applications.iter().map(application_digest)),
        fold(contacts.iter().map(contact_digest)),
    )
}

fn fold(digests: impl Iterator<Item = u32>) -> u32 {
    digests.fold(0, u32::wrapping_add)
}

pub fn application_digest(application: &ApplicationConfiguration) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(b"application");
    update_str(&mut hasher, &application.identifier);
    hasher.update([
        application.color.to_byte(),
        application.vibration.to_byte(),
        u8::from(application.activated),
    ]);
    truncate(hasher)
}

pub fn contact_digest(contact: &ContactConfiguration) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(b"contact");
    update_str(&mut hasher, &contact.identifier);
    hasher.update((contact.names.len() as u32).to_be_bytes());
    for name in &contact.names {
        update_str(&mut hasher, name);
    }
    hasher.update([contact.color.to_byte()]);
    truncate(hasher)
}

// length prefix keeps ("ab", "c") and ("a", "bc") apart
fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u32).to_be_bytes());
    hasher.update(value.as_bytes());
}

fn truncate(hasher: Sha256) -> u32 {
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}
