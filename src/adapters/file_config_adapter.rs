//! INI file configuration adapter.

use crate::domain::error::DeskError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DeskError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| DeskError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, DeskError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| DeskError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[universe]
symbols = SPY,QQQ,IWM

[ibkr]
host = 127.0.0.1
port = 7497
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("universe", "symbols"),
            Some("SPY,QQQ,IWM".to_string())
        );
        assert_eq!(adapter.get_int("ibkr", "port", 0), 7497);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[risk]\nmax_position_pct = 0.2\n").unwrap();
        assert_eq!(adapter.get_string("risk", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_default_for_missing_or_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[ibkr]\nclient_id = abc\n").unwrap();
        assert_eq!(adapter.get_int("ibkr", "client_id", 42), 42);
        assert_eq!(adapter.get_int("ibkr", "missing", 7), 7);
    }




    #[test]
    fn has_key_ignores_blank_values() {
        let adapter = FileConfigAdapter::from_string("[logs]\ndir =\n").unwrap();
        assert!(!adapter.has_key("logs", "dir"));
        assert!(!adapter.has_key("logs", "missing"));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[data]\npath = /srv/bars\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("data", "path"),
            Some("/srv/bars".to_string())
        );
    }

    #[test]
    fn from_file_returns_config_parse_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(DeskError::ConfigParse { .. })));
    }
}
