//! Bridge config loading.

use std::path::Path;

use gangway_types::{BridgeConfig, BridgeError};

/// Fixed path of the package's typed configuration message.
pub const CONFIG_PATH: &str = "/sandstorm-http-bridge-config";

/// Read the config once at startup.
pub fn load(path: impl AsRef<Path>) -> Result<BridgeConfig, BridgeError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|error| BridgeError::Config(format!("cannot read {}: {error}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|error| BridgeError::Config(format!("cannot parse {}: {error}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_view_info_and_api_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"viewInfo": {{"permissions": [{{"name": "read"}}, {{"name": "write"}}]}}, "apiPath": "/api/"}}"#
        )
        .unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.api_path, "/api/");
        let names: Vec<_> = config
            .view_info
            .permissions
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, ["read", "write"]);
    }

    #[test]
    fn missing_or_malformed_config_is_an_error() {
        assert!(load("/nonexistent/bridge-config").is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load(file.path()).is_err());
    }
}
