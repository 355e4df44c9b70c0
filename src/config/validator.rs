use crate::config::{Config, InstallConfig, ServerConfig};
use crate::error::{Error, Result};

/// Validates a server configuration.
///
/// The controller name is deliberately not checked here; an unknown
/// controller is reported by the controller when it dispatches.
pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(Error::ConfigInvalid("Server name is empty".to_string()));
    }

    if config.instances == 0 {
        return Err(Error::ConfigInvalid(format!(
            "Server '{}' must run at least one instance",
            config.name
        )));
    }

    Ok(())
}

/// Validates install activation settings
pub fn validate_install_config(config: &InstallConfig) -> Result<()> {
    if config.host_uri.is_empty() {
        return Err(Error::ConfigInvalid("Install hostUri is empty".to_string()));
    }
    if config.max_attempts == 0 {
        return Err(Error::ConfigInvalid(
            "Install maxAttempts must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_install_config(&config.install)?;

    Ok(())
}

/// Validation run before starting: the entry point must exist.
pub fn validate_for_start(config: &ServerConfig) -> Result<()> {
    validate_server_config(config)?;

    if config.path.as_os_str().is_empty() {
        return Err(Error::ConfigValidation(
            "Missing server path".to_string(),
        ));
    }
    if !config.path.is_file() {
        return Err(Error::ConfigValidation(format!(
            "Server entry point '{}' does not exist",
            config.path.display()
        )));
    }

    Ok(())
}
