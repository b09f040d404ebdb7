//! Stack configuration - `vfstack.toml` (or `.json`)
//!
//! ```toml
//! [stack]
//! name = "VfAmiCdkStack"
//!
//! [environment]
//! account = "123456789012"
//! region = "us-east-1"
//!
//! [parameters]
//! bucketNamePrefix = "voice-focus-processing-bucket"
//! maxFleetCapacity = 5
//!
//! [assets]
//! root = "assets"
//!
//! [output]
//! dir = "cdk.out"
//! ```

use anyhow::{Context, Result};
use declarative::Environment;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the target account
pub const ENV_ACCOUNT: &str = "VFSTACK_ACCOUNT";

/// Environment variable overriding the target region
pub const ENV_REGION: &str = "VFSTACK_REGION";

const CONFIG_STEM: &str = "vfstack";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unsupported config format for {}: expected .toml or .json", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("invalid parameter override '{0}': expected name=value")]
    InvalidOverride(String),
}

/// On-disk config format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StackSection {
    pub name: String,
}

impl Default for StackSection {
    fn default() -> Self {
        Self {
            name: "VfAmiCdkStack".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvironmentSection {
    pub account: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssetsSection {
    /// Directory holding `s3/`, `sqs/` and `codebuild/`
    pub root: String,
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            root: "assets".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputSection {
    /// Where `synth` writes templates
    pub dir: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: "cdk.out".to_string(),
        }
    }
}

/// A parameter value as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ParamSetting {
    Integer(i64),
    Text(String),
}

impl fmt::Display for ParamSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// The whole stack configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StackConfig {
    pub stack: StackSection,
    pub environment: EnvironmentSection,
    pub parameters: BTreeMap<String, ParamSetting>,
    pub assets: AssetsSection,
    pub output: OutputSection,
}

impl StackConfig {
    /// Load config from an explicit path, or from the config directory
    ///
    /// Without an explicit path, `vfstack.toml` then `vfstack.json` are tried;
    /// if neither exists the defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::from_path(path)?, Some(path.to_path_buf())));
        }

        let dir = crate::paths::config_dir()?;
        for format in [ConfigFormat::Toml, ConfigFormat::Json] {
            let path = dir.join(format!("{CONFIG_STEM}.{}", format.extension()));
            if path.exists() {
                return Ok((Self::from_path(&path)?, Some(path)));
            }
        }

        log::debug!("No config file in {}, using defaults", dir.display());
        Ok((Self::default(), None))
    }

    /// Parse a config file, picking the format from its extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = match format {
            ConfigFormat::Toml => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            ConfigFormat::Json => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        };
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Target environment, with `VFSTACK_*` and `AWS_*` variables taking precedence
    pub fn environment(&self) -> Environment {
        self.environment_with(|key| std::env::var(key).ok())
    }

    fn environment_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Environment {
        let account = lookup(ENV_ACCOUNT).or_else(|| self.environment.account.clone());
        let region = lookup(ENV_REGION)
            .or_else(|| self.environment.region.clone())
            .or_else(|| lookup("AWS_REGION"))
            .or_else(|| lookup("AWS_DEFAULT_REGION"));
        Environment { account, region }
    }

    /// Raw parameter values: the config file, overridden by `name=value` pairs
    pub fn supplied_parameters(&self, overrides: &[String]) -> Result<BTreeMap<String, String>> {
        let mut supplied: BTreeMap<String, String> = self
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();

        let pattern = Regex::new(r"^([A-Za-z][A-Za-z0-9]*)=(.*)$")?;
        for raw in overrides {
            let caps = pattern
                .captures(raw)
                .ok_or_else(|| ConfigError::InvalidOverride(raw.clone()))?;
            supplied.insert(caps[1].to_string(), caps[2].to_string());
        }
        Ok(supplied)
    }

    /// Absolute assets root
    pub fn assets_root(&self) -> PathBuf {
        crate::paths::expand(&self.assets.root)
    }

    /// Absolute synth output directory
    pub fn output_dir(&self) -> PathBuf {
        crate::paths::expand(&self.output.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vfstack.toml");
        fs::write(
            &path,
            r#"
[stack]
name = "Demo"

[environment]
account = "123456789012"
region = "eu-west-1"

[parameters]
bucketNamePrefix = "demo"
maxFleetCapacity = 3
"#,
        )
        .unwrap();

        let config = StackConfig::from_path(&path).unwrap();
        assert_eq!(config.stack.name, "Demo");
        assert_eq!(
            config.parameters.get("maxFleetCapacity"),
            Some(&ParamSetting::Integer(3))
        );
        assert_eq!(config.assets.root, "assets");
    }

    #[test]
    fn test_parse_json_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vfstack.json");
        fs::write(&path, r#"{"parameters": {"bucketNamePrefix": "demo"}}"#).unwrap();

        let config = StackConfig::from_path(&path).unwrap();
        assert_eq!(
            config.parameters.get("bucketNamePrefix"),
            Some(&ParamSetting::Text("demo".into()))
        );
        assert_eq!(config.stack.name, "VfAmiCdkStack");
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let err = StackConfig::from_path(Path::new("/tmp/vfstack.yaml")).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = StackConfig::default();
        config
            .parameters
            .insert("maxFleetCapacity".into(), ParamSetting::Integer(5));

        let supplied = config
            .supplied_parameters(&["maxFleetCapacity=2".to_string()])
            .unwrap();
        assert_eq!(supplied["maxFleetCapacity"], "2");

        assert!(config.supplied_parameters(&["=2".to_string()]).is_err());
    }

    #[test]
    fn test_environment_precedence() {
        let config = StackConfig {
            environment: EnvironmentSection {
                account: Some("111111111111".into()),
                region: None,
            },
            ..Default::default()
        };

        let env = config.environment_with(|key| match key {
            "AWS_REGION" => Some("ap-south-1".into()),
            _ => None,
        });
        assert_eq!(env.account.as_deref(), Some("111111111111"));
        assert_eq!(env.region.as_deref(), Some("ap-south-1"));

        let env = config.environment_with(|key| match key {
            ENV_ACCOUNT => Some("222222222222".into()),
            ENV_REGION => Some("us-west-2".into()),
            "AWS_REGION" => Some("ap-south-1".into()),
            _ => None,
        });
        assert_eq!(env.account.as_deref(), Some("222222222222"));
        assert_eq!(env.region.as_deref(), Some("us-west-2"));
    }
}
