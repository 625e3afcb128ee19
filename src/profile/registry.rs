//! Global device-type catalog.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use super::DeviceProfile;
use super::vendors;
use crate::error::ProfileError;

/// Global profile registry.
static REGISTRY: Lazy<RwLock<ProfileRegistry>> = Lazy::new(|| {
    let mut registry = ProfileRegistry::new();
    registry.register_builtin_profiles();
    RwLock::new(registry)
});

/// One catalog listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub key: String,
    pub name: String,
    pub description: String,
}

/// Registry mapping device-type keys to profiles.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: HashMap<String, DeviceProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
        }
    }

    /// Get the global registry.
    pub fn global() -> &'static RwLock<ProfileRegistry> {
        &REGISTRY
    }

    fn register_builtin_profiles(&mut self) {
        for profile in [
            vendors::junos::profile(),
            vendors::ios::profile(),
            vendors::linux::profile(),
        ] {
            self.profiles.insert(profile.name.clone(), profile);
        }
    }

    /// Register a profile under its own name.
    pub fn register(&mut self, profile: DeviceProfile) -> Result<(), ProfileError> {
        if self.profiles.contains_key(&profile.name) {
            return Err(ProfileError::AlreadyRegistered {
                name: profile.name.clone(),
            });
        }
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    /// Get a profile by key.
    pub fn get(&self, key: &str) -> Option<&DeviceProfile> {
        self.profiles.get(key)
    }

    /// List every entry, sorted by key.
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<CatalogEntry> = self
            .profiles
            .values()
            .map(|p| CatalogEntry {
                key: p.name.clone(),
                name: p.name.clone(),
                description: p.description.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }
}

/// Look up a device type in the global registry.
pub fn lookup(key: &str) -> Result<DeviceProfile, ProfileError> {
    REGISTRY
        .read()
        .expect("profile registry poisoned")
        .get(key)
        .cloned()
        .ok_or_else(|| ProfileError::UnknownType {
            name: key.to_string(),
        })
}

/// List the global catalog, sorted by key.
pub fn catalog() -> Vec<CatalogEntry> {
    REGISTRY
        .read()
        .expect("profile registry poisoned")
        .catalog()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_present() {
        assert!(lookup("junos").is_ok());
        assert!(lookup("ios").is_ok());
        assert!(lookup("linux").is_ok());
        assert!(matches!(
            lookup("nonesuch"),
            Err(ProfileError::UnknownType { .. })
        ));
    }

    #[test]
    fn catalog_sorted_by_key() {
        let entries = catalog();
        assert!(entries.len() >= 3);
        for pair in entries.windows(2) {
            assert!(pair[0].key < pair[1].key);
        }
        assert!(entries.iter().all(|e| !e.description.is_empty()));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = ProfileRegistry::new();
        registry.register_builtin_profiles();
        let err = registry.register(vendors::junos::profile()).unwrap_err();
        assert!(matches!(err, ProfileError::AlreadyRegistered { .. }));
    }
}
