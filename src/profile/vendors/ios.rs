//! Cisco IOS profile.
//!
//! IOS applies configuration lines immediately; there is no commit
//! command, so a commit-and-exit run only sends `end` and the session
//! exit commands after the configuration lines.

use indexmap::IndexMap;

use crate::profile::DeviceProfile;

/// Catalog key for Cisco IOS.
pub const DEVICE_TYPE: &str = "ios";

/// Create the IOS profile.
pub fn profile() -> DeviceProfile {
    let mut prompts = IndexMap::new();
    prompts.insert(
        "exec".to_string(),
        r"[a-zA-Z0-9\.\-_]+[>#]\s?".to_string(),
    );
    prompts.insert(
        "config".to_string(),
        r"[a-zA-Z0-9\.\-_]+\([\w\-]+\)#\s?".to_string(),
    );

    DeviceProfile {
        name: DEVICE_TYPE.to_string(),
        description: "cisco ios and ios-xe".to_string(),
        prompts,
        paging_disable_commands: vec!["terminal length 0".to_string()],
        config_entry_command: Some("configure terminal".to_string()),
        config_exit_command: Some("end".to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Mode;

    #[test]
    fn compiles_and_supports_both_modes() {
        let profile = profile();
        assert!(profile.ensure_supports(Mode::Exec).is_ok());
        assert!(profile.ensure_supports(Mode::Config).is_ok());
        profile.compile().unwrap();
    }

    #[test]
    fn exec_prompt_match() {
        let compiled = profile().compile().unwrap();
        let exec = compiled.prompt("exec").unwrap();

        assert!(exec.is_match(b"router>"));
        assert!(exec.is_match(b"core-sw1# "));
        // the '#' must directly follow the hostname
        assert!(!exec.is_match(b"router(config)#"));
    }

    #[test]
    fn config_prompt_match() {
        let compiled = profile().compile().unwrap();
        let config = compiled.prompt("config").unwrap();

        assert!(config.is_match(b"router(config)#"));
        assert!(config.is_match(b"router(config-if)# "));
        assert!(!config.is_match(b"router#"));
    }

    #[test]
    fn no_commit_command() {
        let profile = profile();
        assert!(profile.commit_command.is_none());
        assert_eq!(profile.config_exit_command.as_deref(), Some("end"));
    }
}
