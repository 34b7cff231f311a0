//! Config file discovery, loading, and environment variable overlay.

use std::env;
use std::path::{Path, PathBuf};

use crate::{ConfigError, ZnpConfig};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub files: Vec<PathBuf>,
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// Returns paths in load order (system, user, local/cli); only files that
/// exist are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/znp-api/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("znp-api/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("znp.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load and parse a TOML config file.
pub fn load_from_file(path: &Path) -> Result<ZnpConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Later-wins merge: any field present in `overlay`'s file replaces the
/// corresponding field in `base`. Since each section already carries serde
/// defaults, `overlay` is simply taken whole per-section.
pub fn merge(_base: ZnpConfig, overlay: ZnpConfig) -> ZnpConfig {
    overlay
}

/// Apply `ZNP_*` environment variable overrides.
pub fn apply_env_overrides(config: &mut ZnpConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("ZNP_TRANSPORT_PORT") {
        config.transport.port = v;
        sources.env_overrides.push("ZNP_TRANSPORT_PORT".to_string());
    }
    if let Ok(v) = env::var("ZNP_TRANSPORT_BAUD_RATE") {
        if let Ok(baud) = v.parse() {
            config.transport.baud_rate = baud;
            sources
                .env_overrides
                .push("ZNP_TRANSPORT_BAUD_RATE".to_string());
        }
    }
    if let Ok(v) = env::var("ZNP_WAITER_SECS") {
        if let Ok(secs) = v.parse() {
            config.timeouts.waiter_secs = secs;
            sources.env_overrides.push("ZNP_WAITER_SECS".to_string());
        }
    }
    if let Ok(v) = env::var("ZNP_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("ZNP_LOG_LEVEL".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[transport]\nport = \"/dev/ttyUSB3\"\nbaud_rate = 57600\n"
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.transport.port, "/dev/ttyUSB3");
        assert_eq!(config.transport.baud_rate, 57600);
    }

    #[test]
    fn env_override_wins() {
        env::set_var("ZNP_WAITER_SECS", "42");
        let mut config = ZnpConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides(&mut config, &mut sources);
        assert_eq!(config.timeouts.waiter_secs, 42);
        assert!(sources.env_overrides.contains(&"ZNP_WAITER_SECS".to_string()));
        env::remove_var("ZNP_WAITER_SECS");
    }

    #[test]
    fn discover_skips_missing_files() {
        let files = discover_config_files_with_override(Some(Path::new(
            "/nonexistent/path/znp.toml",
        )));
        assert!(files.iter().all(|p| p.exists()));
    }
}
