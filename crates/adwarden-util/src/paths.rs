//! Default paths for adwarden components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/adwarden/adwardend.sock` or `/tmp/adwarden-$USER/adwardend.sock`
//! - Config: `$XDG_CONFIG_HOME/adwarden/config.toml` or `~/.config/adwarden/config.toml`
//! - Data: `$XDG_DATA_HOME/adwarden` or `~/.local/share/adwarden`
//! - Logs: `$XDG_STATE_HOME/adwarden` or `~/.local/state/adwarden`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const ADWARDEN_SOCKET_ENV: &str = "ADWARDEN_SOCKET";

/// Environment variable for overriding the data directory
pub const ADWARDEN_DATA_DIR_ENV: &str = "ADWARDEN_DATA_DIR";

const SOCKET_FILENAME: &str = "adwardend.sock";
const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "adwarden";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$ADWARDEN_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/adwarden/adwardend.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/adwarden-$USER/adwardend.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(ADWARDEN_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking the ADWARDEN_SOCKET env var.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$ADWARDEN_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/adwarden` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/adwarden` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(ADWARDEN_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the ADWARDEN_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default log directory.
pub fn default_log_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_names_the_daemon() {
        let path = socket_path_without_env();
        assert!(path.to_string_lossy().contains("adwarden"));
        assert!(path.to_string_lossy().ends_with("adwardend.sock"));
    }

    #[test]
    fn config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.file_name().unwrap(), "config.toml");
        assert!(path.to_string_lossy().contains("adwarden"));
    }

    #[test]
    fn data_and_log_dirs_contain_app_dir() {
        assert!(data_dir_without_env().to_string_lossy().contains("adwarden"));
        assert!(default_log_dir().to_string_lossy().contains("adwarden"));
    }
}
