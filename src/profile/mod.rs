//! Device profiles: per-device-family prompts and mode-transition commands.
//!
//! A profile is plain data. One session automaton implementation is
//! parameterized by an immutable [`DeviceProfile`] value selected from the
//! registry, instead of one driver subtype per device family.

pub mod registry;
pub mod vendors;

use std::fmt;

use indexmap::IndexMap;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// The operating mode a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Send lines at the baseline (exec) prompt.
    Exec,
    /// Enter configuration mode before sending lines.
    Config,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Exec => write!(f, "exec"),
            Mode::Config => write!(f, "config"),
        }
    }
}

/// Immutable description of one device family.
///
/// Prompts and auth patterns are regex source strings; [`DeviceProfile::compile`]
/// validates them and produces the matchers a session uses. Command fields
/// that are `None` or empty mean "skip that step", never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Catalog key, e.g. "junos".
    pub name: String,

    /// Human-readable description for catalog listings.
    pub description: String,

    /// Regex for the username prompt during authentication.
    pub username_prompt: String,

    /// Regex for the password prompt during authentication.
    pub password_prompt: String,

    /// Phase name (`exec`, `config`, `shell`, ...) to prompt regex.
    /// Declaration order is preserved and used for classification.
    pub prompts: IndexMap<String, String>,

    /// Commands sent once after the baseline prompt, before any mode work.
    pub paging_disable_commands: Vec<String>,

    /// Command that enters configuration mode.
    pub config_entry_command: Option<String>,

    /// Commands sent after entering config mode, before the caller's lines.
    pub pre_config_commands: Vec<String>,

    /// Commands sent after the caller's lines, before commit/exit.
    pub post_config_commands: Vec<String>,

    /// Command that commits staged configuration.
    pub commit_command: Option<String>,

    /// Command that leaves configuration mode (when commit does not).
    pub config_exit_command: Option<String>,

    /// Commands that end the device session.
    pub session_exit_commands: Vec<String>,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            username_prompt: r"Username:".to_string(),
            password_prompt: r"Password:".to_string(),
            prompts: IndexMap::new(),
            paging_disable_commands: vec![],
            config_entry_command: None,
            pre_config_commands: vec![],
            post_config_commands: vec![],
            commit_command: None,
            config_exit_command: None,
            session_exit_commands: vec!["exit".to_string()],
        }
    }
}

impl DeviceProfile {
    /// Validate the profile and compile its patterns.
    pub fn compile(self) -> Result<CompiledProfile, ProfileError> {
        CompiledProfile::new(self)
    }

    /// Check that this profile carries what `mode` needs.
    ///
    /// Config mode requires a `config` prompt and an entry command; exec
    /// mode requires an `exec` prompt. Runs fail here before any
    /// connection is attempted.
    pub fn ensure_supports(&self, mode: Mode) -> Result<(), ProfileError> {
        let missing = match mode {
            Mode::Exec => {
                if self.prompts.contains_key("exec") {
                    None
                } else {
                    Some("an 'exec' prompt")
                }
            }
            Mode::Config => {
                if !self.prompts.contains_key("config") {
                    Some("a 'config' prompt")
                } else if self.config_entry_command.is_none() {
                    Some("a config entry command")
                } else {
                    None
                }
            }
        };

        match missing {
            None => Ok(()),
            Some(missing) => Err(ProfileError::Incompatible {
                name: self.name.clone(),
                mode: mode.to_string(),
                missing: missing.to_string(),
            }),
        }
    }
}

/// A validated profile with compiled prompt matchers.
///
/// Shared by `Arc` across every automaton in a batch run; never mutated.
pub struct CompiledProfile {
    profile: DeviceProfile,
    username_prompt: Regex,
    password_prompt: Regex,
    prompts: IndexMap<String, Regex>,
    any_prompt: Regex,
}

impl CompiledProfile {
    fn new(profile: DeviceProfile) -> Result<Self, ProfileError> {
        if profile.prompts.is_empty() {
            return Err(ProfileError::NoPrompts {
                name: profile.name.clone(),
            });
        }

        // Two phases with the same pattern would make classification
        // undecidable.
        let keys: Vec<&String> = profile.prompts.keys().collect();
        for (i, first) in keys.iter().enumerate() {
            for second in &keys[i + 1..] {
                if profile.prompts[*first] == profile.prompts[*second] {
                    return Err(ProfileError::DuplicatePrompt {
                        first: (*first).clone(),
                        second: (*second).clone(),
                    });
                }
            }
        }

        let compile = |name: &str, pattern: &str| {
            Regex::new(pattern).map_err(|source| ProfileError::InvalidPattern {
                name: name.to_string(),
                source,
            })
        };

        let username_prompt = compile("username_prompt", &profile.username_prompt)?;
        let password_prompt = compile("password_prompt", &profile.password_prompt)?;

        let mut prompts = IndexMap::with_capacity(profile.prompts.len());
        for (phase, pattern) in &profile.prompts {
            prompts.insert(phase.clone(), compile(phase, pattern)?);
        }

        // Combined pattern matching any phase prompt.
        let combined = profile
            .prompts
            .values()
            .map(|p| format!("(?:{p})"))
            .collect::<Vec<_>>()
            .join("|");
        let any_prompt = compile("prompts", &combined)?;

        Ok(Self {
            profile,
            username_prompt,
            password_prompt,
            prompts,
            any_prompt,
        })
    }

    /// The underlying profile definition.
    pub fn definition(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    /// Matcher for one phase's prompt.
    pub fn prompt(&self, phase: &str) -> Option<&Regex> {
        self.prompts.get(phase)
    }

    /// Matcher for the config-mode prompt; an error if the profile has none.
    pub fn config_prompt(&self) -> Result<&Regex, ProfileError> {
        self.prompts
            .get("config")
            .ok_or_else(|| ProfileError::Incompatible {
                name: self.profile.name.clone(),
                mode: Mode::Config.to_string(),
                missing: "a 'config' prompt".to_string(),
            })
    }

    /// Matcher accepting any known prompt.
    pub fn any_prompt(&self) -> &Regex {
        &self.any_prompt
    }

    pub fn username_prompt(&self) -> &Regex {
        &self.username_prompt
    }

    pub fn password_prompt(&self) -> &Regex {
        &self.password_prompt
    }

    /// Name the phase whose prompt matches `text`, in declaration order.
    pub fn classify(&self, text: &[u8]) -> Option<&str> {
        self.prompts
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(phase, _)| phase.as_str())
    }
}

impl fmt::Debug for CompiledProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledProfile")
            .field("name", &self.profile.name)
            .field("phases", &self.prompts.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(prompts: &[(&str, &str)]) -> DeviceProfile {
        DeviceProfile {
            name: "test".to_string(),
            description: "test profile".to_string(),
            prompts: prompts
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn compile_minimal() {
        let compiled = minimal(&[("exec", r">\s?$")]).compile().unwrap();
        assert_eq!(compiled.name(), "test");
        assert!(compiled.prompt("exec").is_some());
        assert!(compiled.prompt("config").is_none());
    }

    #[test]
    fn empty_prompt_set_rejected() {
        let err = minimal(&[]).compile().unwrap_err();
        assert!(matches!(err, ProfileError::NoPrompts { .. }));
    }

    #[test]
    fn duplicate_prompts_rejected() {
        let err = minimal(&[("exec", r"#\s?$"), ("config", r"#\s?$")])
            .compile()
            .unwrap_err();
        match err {
            ProfileError::DuplicatePrompt { first, second } => {
                assert_eq!(first, "exec");
                assert_eq!(second, "config");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_pattern_rejected() {
        let err = minimal(&[("exec", r"[unclosed")]).compile().unwrap_err();
        assert!(matches!(err, ProfileError::InvalidPattern { .. }));
    }

    #[test]
    fn any_prompt_matches_every_phase() {
        let compiled = minimal(&[("exec", r"user@\w+>\s?"), ("config", r"user@\w+#\s?")])
            .compile()
            .unwrap();

        assert!(compiled.any_prompt().is_match(b"user@router> "));
        assert!(compiled.any_prompt().is_match(b"user@router# "));
        assert!(!compiled.any_prompt().is_match(b"Password:"));
    }

    #[test]
    fn classify_uses_declaration_order() {
        let compiled = minimal(&[("exec", r"user@\w+>\s?"), ("config", r"user@\w+#\s?")])
            .compile()
            .unwrap();

        assert_eq!(compiled.classify(b"user@router> "), Some("exec"));
        assert_eq!(compiled.classify(b"user@router# "), Some("config"));
        assert_eq!(compiled.classify(b"nothing here"), None);
    }

    #[test]
    fn exec_mode_compatibility() {
        let profile = minimal(&[("exec", r">\s?$")]);
        assert!(profile.ensure_supports(Mode::Exec).is_ok());
        assert!(profile.ensure_supports(Mode::Config).is_err());
    }

    #[test]
    fn config_mode_requires_entry_command() {
        let mut profile = minimal(&[("exec", r">\s?$"), ("config", r"#\s?$")]);
        assert!(profile.ensure_supports(Mode::Config).is_err());

        profile.config_entry_command = Some("configure".to_string());
        assert!(profile.ensure_supports(Mode::Config).is_ok());
    }
}
