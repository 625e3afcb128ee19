//! Generic Linux shell profile.
//!
//! Exec-only: there is no configuration mode, so config runs against this
//! profile are rejected before any connection is made.

use indexmap::IndexMap;

use crate::profile::DeviceProfile;

/// Catalog key for a generic Linux host.
pub const DEVICE_TYPE: &str = "linux";

/// Create the Linux profile.
pub fn profile() -> DeviceProfile {
    let mut prompts = IndexMap::new();
    prompts.insert("exec".to_string(), r"[$#]\s?$".to_string());

    DeviceProfile {
        name: DEVICE_TYPE.to_string(),
        description: "generic linux shell".to_string(),
        username_prompt: r"login:".to_string(),
        password_prompt: r"[Pp]assword:".to_string(),
        prompts,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Mode;

    #[test]
    fn exec_only() {
        let profile = profile();
        assert!(profile.ensure_supports(Mode::Exec).is_ok());
        assert!(profile.ensure_supports(Mode::Config).is_err());
        profile.compile().unwrap();
    }

    #[test]
    fn prompt_match() {
        let compiled = profile().compile().unwrap();
        let exec = compiled.prompt("exec").unwrap();
        assert!(exec.is_match(b"user@host:~$ "));
        assert!(exec.is_match(b"# "));
    }
}
