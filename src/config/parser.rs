//! Invocation file parser.
//!
//! This module handles loading invocation files from YAML and applying
//! environment overrides, with proper precedence and error handling.

use crate::error::{ArmStateError, ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::InvocationFile;

/// Overrides `provider.subscription_id` unconditionally.
pub const ENV_SUBSCRIPTION_OVERRIDE: &str = "ARMSTATE_SUBSCRIPTION_ID";

/// Fills `provider.subscription_id` when the file leaves it empty.
pub const ENV_SUBSCRIPTION_FALLBACK: &str = "AZURE_SUBSCRIPTION_ID";

/// Overrides `provider.endpoint`.
pub const ENV_ENDPOINT: &str = "ARMSTATE_ENDPOINT";

/// Default invocation file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["armstate.yaml", "armstate.yml"];

/// Parser for invocation files.
#[derive(Debug, Default)]
pub struct InvocationParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl InvocationParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Creates a parser whose base path is the directory of `file`.
    #[must_use]
    pub fn for_file(file: &Path) -> Self {
        match file.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => Self::new().with_base_path(dir),
            None => Self::new(),
        }
    }

    /// Loads an invocation from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<InvocationFile> {
        let path = path.as_ref();
        info!("Loading invocation from: {}", path.display());

        if !path.exists() {
            return Err(ArmStateError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ArmStateError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses an invocation from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<InvocationFile> {
        debug!("Parsing YAML invocation");

        let invocation: InvocationFile = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ArmStateError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed invocation for {} ({})",
            invocation.resource.resource_type.as_deref().unwrap_or("custom schema"),
            invocation.resource.state
        );
        Ok(invocation)
    }

    /// Loads an invocation and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<InvocationFile> {
        let mut invocation = self.load_file(path)?;
        Self::apply_env_overrides(&mut invocation, |name| std::env::var(name).ok());
        Ok(invocation)
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env_overrides(invocation: &mut InvocationFile, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(subscription) = get(ENV_SUBSCRIPTION_OVERRIDE) {
            debug!("Overriding provider.subscription_id from environment");
            invocation.provider.subscription_id = subscription;
        } else if invocation.provider.subscription_id.is_empty()
            && let Some(subscription) = get(ENV_SUBSCRIPTION_FALLBACK)
        {
            debug!("Using {ENV_SUBSCRIPTION_FALLBACK} for provider.subscription_id");
            invocation.provider.subscription_id = subscription;
        }

        if let Some(endpoint) = get(ENV_ENDPOINT) {
            debug!("Overriding provider.endpoint from environment");
            invocation.provider.endpoint = endpoint;
        }
    }

    /// Resolves the custom schema path of an invocation against the base
    /// path.
    #[must_use]
    pub fn schema_path(&self, invocation: &InvocationFile) -> Option<PathBuf> {
        let file = invocation.resource.schema_file.as_ref()?;
        if file.is_absolute() {
            return Some(file.clone());
        }
        Some(
            self.base_path
                .as_ref()
                .map_or_else(|| file.clone(), |base| base.join(file)),
        )
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ArmStateError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Finds the invocation file in `start_dir` or its parents, then in the
/// user configuration directory.
///
/// # Errors
///
/// Returns an error if no invocation file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        if let Some(found) = find_in(&current) {
            return Ok(found);
        }
        if !current.pop() {
            break;
        }
    }

    if let Some(found) = dirs::config_dir().and_then(|dir| find_in(&dir.join("armstate"))) {
        return Ok(found);
    }

    Err(ArmStateError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES.iter().map(|name| dir.join(name)).find(|path| {
        let exists = path.exists();
        if exists {
            info!("Found invocation file: {}", path.display());
        }
        exists
    })
}
