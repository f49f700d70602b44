use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sampling: SamplingConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval_ms: u64,
    /// Number of cycles to run; 0 keeps sampling until interrupted.
    pub cycles: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            interval_ms: 2000,
            cycles: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Memory,
    Cpu,
    Pid,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub top: usize,
    pub sort: SortKey,
    pub command_width: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: OutputFormat::Text,
            top: 15,
            sort: SortKey::Memory,
            command_width: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "warn".to_string(),
            json: false,
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("procsnap").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.sampling.interval_ms, 2000);
        assert_eq!(config.sampling.cycles, 0);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(config.output.sort, SortKey::Memory);
        assert_eq!(config.output.top, 15);
        assert_eq!(config.logging.level, "warn");
        assert!(!config.logging.json);
    }

    #[test]
    fn parse_partial_toml() {
        let toml_str = r#"
[sampling]
interval_ms = 500
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sampling.interval_ms, 500);
        assert_eq!(config.sampling.cycles, 0);
        assert_eq!(config.output.command_width, 60);
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
[sampling]
interval_ms = 1000
cycles = 3

[output]
format = "json"
top = 5
sort = "cpu"
command_width = 40

[logging]
level = "procsnap=debug"
json = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sampling.interval_ms, 1000);
        assert_eq!(config.sampling.cycles, 3);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.top, 5);
        assert_eq!(config.output.sort, SortKey::Cpu);
        assert_eq!(config.output.command_width, 40);
        assert_eq!(config.logging.level, "procsnap=debug");
        assert!(config.logging.json);
    }

    #[test]
    fn unknown_sort_key_falls_back_to_default_config() {
        let temp = std::env::temp_dir().join("procsnap_test_bad_sort.toml");
        std::fs::write(&temp, "[output]\nsort = \"name\"\n").unwrap();
        let config = load_config_from_path(&temp);
        assert_eq!(config.output.sort, SortKey::Memory);
        let _ = std::fs::remove_file(&temp);
    }

    #[test]
    fn missing_file_returns_default() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.toml"));
        assert_eq!(config.sampling.interval_ms, 2000);
    }

    #[test]
    fn invalid_toml_returns_default() {
        let temp = std::env::temp_dir().join("procsnap_test_invalid.toml");
        std::fs::write(&temp, "this is not valid toml {{{{").unwrap();
        let config = load_config_from_path(&temp);
        assert_eq!(config.sampling.interval_ms, 2000);
        let _ = std::fs::remove_file(&temp);
    }
}
