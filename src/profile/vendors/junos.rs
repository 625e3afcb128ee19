//! Juniper JUNOS profile.
//!
//! `configure private` gives each operator an isolated candidate config;
//! `commit and-quit` commits and leaves configuration mode in one step, so
//! no separate config-exit command is needed.
//!
//! # Prompt examples
//!
//! ```text
//! user@router>          exec (operational) mode
//! user@router#          configuration mode
//! user@router:RE:0%     routing-engine shell
//! ```

use indexmap::IndexMap;

use crate::profile::DeviceProfile;

/// Catalog key for Juniper JUNOS.
pub const DEVICE_TYPE: &str = "junos";

/// Create the JUNOS profile.
pub fn profile() -> DeviceProfile {
    let mut prompts = IndexMap::new();
    prompts.insert(
        "exec".to_string(),
        r"[a-zA-Z0-9\.\-_]+@[a-zA-Z0-9\.\-_]+>\s?".to_string(),
    );
    prompts.insert(
        "config".to_string(),
        r"[a-zA-Z0-9\.\-_]+@[a-zA-Z0-9\.\-_]+#\s?".to_string(),
    );
    prompts.insert(
        "shell".to_string(),
        r"[a-zA-Z0-9\.\-_]+@\S+:RE:.%".to_string(),
    );

    DeviceProfile {
        name: DEVICE_TYPE.to_string(),
        description: "juniper networks junos".to_string(),
        prompts,
        paging_disable_commands: vec![
            "set cli screen-length 0".to_string(),
            "set cli screen-width 1000".to_string(),
        ],
        config_entry_command: Some("configure private".to_string()),
        post_config_commands: vec!["show | compare".to_string()],
        commit_command: Some("commit and-quit".to_string()),
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

        assert!(exec.is_match(b"user@router> "));
        assert!(exec.is_match(b"admin@mx960.lab>"));
        assert!(!exec.is_match(b"user@router# "));
    }

    #[test]
    fn config_prompt_match() {
        let compiled = profile().compile().unwrap();
        let config = compiled.prompt("config").unwrap();

        assert!(config.is_match(b"user@router# "));
        assert!(config.is_match(b"admin@mx960#"));
        assert!(!config.is_match(b"user@router> "));
    }

    #[test]
    fn shell_prompt_match() {
        let compiled = profile().compile().unwrap();
        let shell = compiled.prompt("shell").unwrap();

        assert!(shell.is_match(b"root@router:RE:0% "));
        assert!(!shell.is_match(b"user@router> "));
    }

    #[test]
    fn classification() {
        let compiled = profile().compile().unwrap();
        assert_eq!(compiled.classify(b"user@router> "), Some("exec"));
        assert_eq!(compiled.classify(b"root@router:RE:0% "), Some("shell"));
    }

    #[test]
    fn commit_quits_config_mode() {
        let profile = profile();
        assert_eq!(profile.commit_command.as_deref(), Some("commit and-quit"));
        // commit and-quit already leaves config mode
        assert!(profile.config_exit_command.is_none());
    }
}
