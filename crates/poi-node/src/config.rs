//! Configuration loading

use std::path::Path;

use poi_core::{NodeConfig, PoiError, Result};

/// Read and validate a TOML node configuration.
pub fn load_config(path: &Path) -> Result<NodeConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| PoiError::config(format!("cannot read {}: {err}", path.display())))?;
    parse_config(&raw)
}

/// Parse and validate a TOML node configuration.
pub fn parse_config(raw: &str) -> Result<NodeConfig> {
    let config: NodeConfig =
        toml::from_str(raw).map_err(|err| PoiError::config(format!("invalid config: {err}")))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
        node_name = "alpha"
        list_signing_key = "0101010101010101010101010101010101010101010101010101010101010101"
        peers = ["beta"]

        [[chains]]
        network = "Ethereum"
        txidVersion = "V2PoseidonMerkle"
    "#;

    #[test]
    fn test_loads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.node_name, "alpha");
        assert_eq!(config.peers, vec!["beta".to_string()]);
        assert_eq!(config.all_list_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_unusable_config() {
        assert!(matches!(
            parse_config("node_name = \"alpha\""),
            Err(PoiError::Config { .. })
        ));
        assert!(matches!(
            parse_config("node_name = 3"),
            Err(PoiError::Config { .. })
        ));
        assert!(load_config(Path::new("/nonexistent/poi.toml")).is_err());
    }
}
