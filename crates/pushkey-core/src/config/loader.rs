//! Configuration file loading and parsing

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

/// Configuration file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["pushkey.yaml", "pushkey.yml"];

/// Fixed parameter-store path for the access key id
pub const ACCESS_KEY_ID_PARAMETER: &str = "/ci-cd/github-actions/access-key-id";

/// Fixed parameter-store path for the secret access key
pub const SECRET_ACCESS_KEY_PARAMETER: &str = "/ci-cd/github-actions/secret-access-key";

const DEFAULT_IDENTITY_NAME: &str = "github-actions-ecr";
const DEFAULT_NAMESPACE_PATH: &str = "/ci-cd/";
const DEFAULT_POLICY_NAME: &str = "github-actions-ecr-push";
const DEFAULT_POLICY_DESCRIPTION: &str =
    "Push access for GitHub Actions to the retail-store ECR repositories";
const DEFAULT_STATE_DIR: &str = ".pushkey";

/// On-disk representation of `pushkey.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PushkeyConfigFile {
    /// Config format version
    pub version: String,

    /// AWS region; falls back to the SDK's region chain when unset
    pub region: Option<String>,

    /// Named AWS profile
    pub profile: Option<String>,

    /// Directory holding the state file, relative to the config file
    pub state_dir: Utf8PathBuf,

    pub identity: IdentityConfig,

    pub policy: PolicyConfig,

    pub secrets: SecretsConfig,
}

impl Default for PushkeyConfigFile {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            region: None,
            profile: None,
            state_dir: Utf8PathBuf::from(DEFAULT_STATE_DIR),
            identity: IdentityConfig::default(),
            policy: PolicyConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }
}

/// Service identity settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    pub name: String,
    pub path: String,
    pub tags: BTreeMap<String, String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("Purpose".to_string(), "github-actions-ecr-push".to_string());
        tags.insert("ManagedBy".to_string(), "pushkey".to_string());
        Self {
            name: DEFAULT_IDENTITY_NAME.to_string(),
            path: DEFAULT_NAMESPACE_PATH.to_string(),
            tags,
        }
    }
}

/// Managed policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub name: String,
    pub path: String,
    pub description: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_POLICY_NAME.to_string(),
            path: DEFAULT_NAMESPACE_PATH.to_string(),
            description: DEFAULT_POLICY_DESCRIPTION.to_string(),
        }
    }
}

/// Parameter store settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// Customer managed KMS key; `None` uses the store's managed key
    pub kms_key_id: Option<String>,
}

/// Loaded and validated pushkey configuration
#[derive(Debug, Clone)]
pub struct PushkeyConfig {
    /// The parsed configuration
    pub config: PushkeyConfigFile,

    /// Path to the configuration file
    pub config_path: Utf8PathBuf,

    /// Directory containing the configuration file
    pub working_dir: Utf8PathBuf,
}

impl PushkeyConfig {
    /// Load configuration from the specified path or search for it
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let (config_path, content) = if let Some(p) = path {
            let content = fs::read_to_string(p).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::config_not_found(p.as_str())
                } else {
                    Error::Io(e)
                }
            })?;
            (p.to_owned(), content)
        } else {
            Self::find_config()?
        };

        tracing::debug!("Loading configuration from {}", config_path);
        Self::parse(&content, config_path)
    }

    /// Parse configuration content as if it were read from `config_path`
    pub fn parse(content: &str, config_path: Utf8PathBuf) -> Result<Self> {
        let working_dir = config_path
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .map(|p| p.to_owned())
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        let config: PushkeyConfigFile = if content.trim().is_empty() {
            PushkeyConfigFile::default()
        } else {
            serde_yaml_ng::from_str(content)?
        };
        config.validate()?;

        Ok(Self {
            config,
            config_path,
            working_dir,
        })
    }

    /// Find configuration file in current directory or parent directories
    fn find_config() -> Result<(Utf8PathBuf, String)> {
        let cwd = std::env::current_dir().map_err(Error::Io)?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|_| Error::invalid_config("Current directory path is not valid UTF-8"))?;

        let mut current = cwd.as_path();

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.exists() {
                    let content = fs::read_to_string(&path)?;
                    return Ok((path, content));
                }
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Err(Error::config_not_found(
            "pushkey.yaml (searched current and parent directories)",
        ))
    }

    /// Get the inner configuration file
    pub fn inner(&self) -> &PushkeyConfigFile {
        &self.config
    }

    /// Identity settings
    pub fn identity(&self) -> &IdentityConfig {
        &self.config.identity
    }

    /// Policy settings
    pub fn policy(&self) -> &PolicyConfig {
        &self.config.policy
    }

    /// Parameter store settings
    pub fn secrets(&self) -> &SecretsConfig {
        &self.config.secrets
    }

    /// Configured region, if any
    pub fn region(&self) -> Option<&str> {
        self.config.region.as_deref()
    }

    /// Configured AWS profile, if any
    pub fn profile(&self) -> Option<&str> {
        self.config.profile.as_deref()
    }

    /// Absolute-or-relative state directory resolved against the config location
    pub fn state_dir(&self) -> Utf8PathBuf {
        if self.config.state_dir.is_absolute() {
            self.config.state_dir.clone()
        } else {
            self.working_dir.join(&self.config.state_dir)
        }
    }
}

impl PushkeyConfigFile {
    /// Validate naming rules IAM would otherwise reject mid-apply
    pub fn validate(&self) -> Result<()> {
        validate_name("identity.name", &self.identity.name)?;
        validate_name("policy.name", &self.policy.name)?;
        validate_iam_path("identity.path", &self.identity.path)?;
        validate_iam_path("policy.path", &self.policy.path)?;

        for key in self.identity.tags.keys() {
            if key.is_empty() {
                return Err(Error::invalid_config("identity.tags: empty tag key"));
            }
            if key.to_ascii_lowercase().starts_with("aws:") {
                return Err(Error::invalid_config(format!(
                    "identity.tags: tag key '{}' uses the reserved 'aws:' prefix",
                    key
                )));
            }
        }

        if let Some(region) = &self.region {
            if region.trim().is_empty() {
                return Err(Error::invalid_config("region must not be empty when set"));
            }
        }

        Ok(())
    }
}

fn validate_name(field: &str, name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "+=,.@_-".contains(c));
    if name.is_empty() || name.len() > 64 || !valid_chars {
        return Err(Error::invalid_config(format!(
            "{}: '{}' is not a valid IAM name",
            field, name
        )));
    }
    Ok(())
}

fn validate_iam_path(field: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') || !path.ends_with('/') || path.contains("//") {
        return Err(Error::invalid_config(format!(
            "{}: '{}' must start and end with '/'",
            field, path
        )));
    }
    Ok(())
}

/// Render a default `pushkey.yaml`
pub fn generate_default_config(region: Option<&str>) -> Result<String> {
    let config = PushkeyConfigFile {
        region: region.map(str::to_string),
        ..Default::default()
    };
    let body = serde_yaml_ng::to_string(&config)?;
    Ok(format!(
        "# pushkey configuration\n\
         # Provisions a push-only CI identity for the retail-store ECR repositories.\n\
         {}",
        body
    ))
}
