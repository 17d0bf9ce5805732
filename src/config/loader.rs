//! Loads and parses the top-level configuration file.

use std::path::Path;

use crate::config::types::Config;
use crate::error::{ErrorExt, Result};

pub fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).config_error(&format!("reading config file {}", path.display()))?;
    let config: Config = serde_json::from_str(&text).config_error("parsing config JSON")?;
    Ok(config)
}

/// The conventional class-directory path for a given config file:
/// `<config>.d/classes` (§6).
pub fn user_class_directory(config_path: &Path) -> std::path::PathBuf {
    let mut dir = config_path.as_os_str().to_os_string();
    dir.push(".d");
    std::path::PathBuf::from(dir).join("classes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_class_directory_appends_dot_d_classes() {
        let dir = user_class_directory(Path::new("/etc/smartweb-gateway.conf"));
        assert_eq!(dir, Path::new("/etc/smartweb-gateway.conf.d/classes"));
    }
}
