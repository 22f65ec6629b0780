//! TOML-backed convenience constructor for `init`'s tagged config list
//! (`SPEC_FULL.md` §A.3), gated behind the `config-file` feature, mirroring
//! the teacher's `config-file = ["dep:toml"]` feature.
//!
//! Subscribers are trait objects and can't be named in a TOML document, so
//! a parsed `tracing_config` section always starts with the same empty
//! subscriber list `TracingConfig::default()` does — attach subscribers to
//! the returned record yourself before passing it to [`crate::context::init`].
//! This is purely a convenience reader for the §6.1 tagged-record list;
//! it introduces no new wire or ABI semantics.

use std::sync::Arc;

use serde::Deserialize;

use crate::context::{ConfigRecord, FeatureFlag, FeatureRequest, ModulesConfig, Profile, TracingConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::tracing::Level;

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum LevelName {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LevelName> for Level {
    fn from(name: LevelName) -> Self {
        match name {
            LevelName::Off => Self::Off,
            LevelName::Error => Self::Error,
            LevelName::Warn => Self::Warn,
            LevelName::Info => Self::Info,
            LevelName::Debug => Self::Debug,
            LevelName::Trace => Self::Trace,
        }
    }
}

#[derive(Deserialize, Default)]
struct TracingConfigFile {
    max_level: Option<LevelName>,
    format_buffer_len: Option<usize>,
    app_name: Option<String>,
    register_thread: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum ProfileName {
    Release,
    Dev,
}

impl From<ProfileName> for Profile {
    fn from(name: ProfileName) -> Self {
        match name {
            ProfileName::Release => Self::Release,
            ProfileName::Dev => Self::Dev,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum FeatureFlagName {
    Required,
    On,
    Off,
}

impl From<FeatureFlagName> for FeatureFlag {
    fn from(name: FeatureFlagName) -> Self {
        match name {
            FeatureFlagName::Required => Self::Required,
            FeatureFlagName::On => Self::On,
            FeatureFlagName::Off => Self::Off,
        }
    }
}

#[derive(Deserialize)]
struct FeatureRequestFile {
    tag: u16,
    flag: FeatureFlagName,
}

#[derive(Deserialize, Default)]
struct ModulesConfigFile {
    profile: Option<ProfileName>,
    feature_requests: Option<Vec<FeatureRequestFile>>,
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    tracing_config: Option<TracingConfigFile>,
    modules_config: Option<ModulesConfigFile>,
}

/// Reads the tagged `init(options)` list out of a TOML document instead of
/// constructing [`ConfigRecord`]s by hand.
pub struct ConfigBuilder;

impl ConfigBuilder {
    /// Parses `source`, returning one [`ConfigRecord`] per section present
    /// in the document, `tracing_config` before `modules_config`. A section
    /// absent from the document is simply absent from the returned list —
    /// `init` already supplies its own default for a missing tag.
    ///
    /// # Errors
    /// Returns [`ErrorKind::InvalidInput`] wrapping the underlying parse
    /// error if `source` is not valid TOML or doesn't match the expected
    /// shape.
    pub fn from_toml_str(source: &str) -> Result<Vec<ConfigRecord>> {
        let parsed: ConfigFile = toml::from_str(source).map_err(|error| Error::wrap(ErrorKind::InvalidInput, error))?;
        let mut records = Vec::new();

        if let Some(tracing) = parsed.tracing_config {
            let mut cfg = TracingConfig::default();
            if let Some(level) = tracing.max_level {
                cfg.max_level = level.into();
            }
            if let Some(len) = tracing.format_buffer_len {
                cfg.format_buffer_len = len;
            }
            if let Some(name) = tracing.app_name {
                cfg.app_name = Arc::from(name.as_str());
            }
            if let Some(register_thread) = tracing.register_thread {
                cfg.register_thread = register_thread;
            }
            records.push(ConfigRecord::TracingConfig(cfg));
        }

        if let Some(modules) = parsed.modules_config {
            let mut cfg = ModulesConfig::default();
            if let Some(profile) = modules.profile {
                cfg.profile = profile.into();
            }
            if let Some(requests) = modules.feature_requests {
                cfg.feature_requests = requests
                    .into_iter()
                    .map(|r| FeatureRequest {
                        tag: r.tag,
                        flag: r.flag.into(),
                    })
                    .collect();
            }
            records.push(ConfigRecord::ModulesConfig(cfg));
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_no_records() {
        let records = ConfigBuilder::from_toml_str("").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn parses_both_sections() {
        let source = r#"
            [tracing_config]
            max_level = "debug"
            app_name = "acme"
            register_thread = false

            [modules_config]
            profile = "dev"

            [[modules_config.feature_requests]]
            tag = 7
            flag = "required"
        "#;
        let records = ConfigBuilder::from_toml_str(source).unwrap();
        assert_eq!(records.len(), 2);
        let ConfigRecord::TracingConfig(tracing) = &records[0] else {
            panic!("tracing_config must come first");
        };
        assert_eq!(tracing.max_level, Level::Debug);
        assert_eq!(tracing.app_name.as_ref(), "acme");
        assert!(!tracing.register_thread);

        let ConfigRecord::ModulesConfig(modules) = &records[1] else {
            panic!("modules_config must come second");
        };
        assert_eq!(modules.profile, Profile::Dev);
        assert_eq!(modules.feature_requests.len(), 1);
        assert_eq!(modules.feature_requests[0].tag, 7);
        assert_eq!(modules.feature_requests[0].flag, FeatureFlag::Required);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = ConfigBuilder::from_toml_str("not = [valid").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
