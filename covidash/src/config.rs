use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `dim_time`, `dim_country`, `deaths`, `cases` and `tests` tables.
    pub data_path: String,
    /// Upper bound on the initial reference-data load.
    pub connect_timeout_secs: u64,
    /// When false, a failed reference-data load leaves the catalogs empty instead of aborting.
    pub require_catalog: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_path: "data".into(),
            connect_timeout_secs: 3,
            require_catalog: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"data_path": "/srv/pandemic"}"#).unwrap();
        assert_eq!(config.data_path, "/srv/pandemic");
        assert_eq!(config.connect_timeout_secs, 3);
        assert!(!config.require_catalog);
    }
}
