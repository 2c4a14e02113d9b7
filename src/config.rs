use anyhow::{anyhow, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::database::ConnectionOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhisperConfig {
    /// Path to the directory holding Whisper's database
    pub data_dir: String,

    /// Database file name inside `data_dir` (absolute paths are used as-is)
    pub database_file: String,

    /// Directory with migration files; `<data_dir>/migrations` when unset
    pub migrations_dir: Option<String>,

    /// SQLite busy timeout in milliseconds (default: 5 seconds)
    pub busy_timeout_ms: u64,

    /// Use write-ahead logging (default: off)
    pub wal: bool,
}

const EMPTY_CONFIG: &str = r#"### whisper storage configuration file

### directory holding the recordings database
# data_dir = "~/.local/share/whisper"

### database file name, relative to data_dir
# database_file = "whisper.sqlite3"

### directory containing <YYYYMMDDHHMMSS>_<name>.sql migration files
# migrations_dir = "~/.local/share/whisper/migrations"

### connection settings
# busy_timeout_ms = 5000
# wal = false
"#;

const DEFAULT_DATABASE_FILE: &str = "whisper.sqlite3";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

fn default_data_dir() -> String {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join("whisper").to_string_lossy().to_string())
        .unwrap_or_else(|| "./whisper".to_string())
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            migrations_dir: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            wal: false,
        }
    }
}

impl WhisperConfig {
    /// Function to create and initialize a new configuration
    ///
    /// Reads the TOML file at `path` (by default the platform config dir's
    /// `whisper/whisper.toml`), then `WHISPER_*` environment variables, which
    /// take precedence. A commented template is written when the file does
    /// not exist yet.
    pub fn new(path: &Option<String>) -> Result<WhisperConfig> {
        // pick up WHISPER_* variables from a .env file during development
        let _ = dotenvy::dotenv();

        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => {
                let dir = dirs::config_dir()
                    .ok_or_else(|| anyhow!("Could not find config directory"))?
                    .join("whisper");
                std::fs::create_dir_all(&dir)
                    .map_err(|e| anyhow!("Unable to create whisper config directory: {}", e))?;
                dir.join("whisper.toml")
            }
        };

        // Add in settings from the environment (with a prefix of WHISPER)
        // E.g., `WHISPER_DATA_DIR=/tmp/whisper` would set the data directory
        Self::load(&config_path, Some(config::Environment::with_prefix("WHISPER")))
    }

    /// Build the configuration from the file at `config_path`, layering
    /// `env` on top when given
    fn load(config_path: &Path, env: Option<config::Environment>) -> Result<WhisperConfig> {
        let mut builder = Config::builder();

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow!("Could not convert path to string"))?;
            builder = builder.add_source(config::File::with_name(path_str));
        } else {
            std::fs::write(config_path, EMPTY_CONFIG).map_err(|e| {
                anyhow!(
                    "Unable to create config file {}: {}",
                    config_path.display(),
                    e
                )
            })?;
        }

        if let Some(env) = env {
            builder = builder.add_source(env);
        }

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_map(&config)
    }

    fn from_map(config: &HashMap<String, String>) -> Result<WhisperConfig> {
        let data_dir = match config.get("data_dir") {
            Some(p) => expand_home(p),
            None => default_data_dir(),
        };

        let database_file = config
            .get("database_file")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DATABASE_FILE.to_string());

        let migrations_dir = config.get("migrations_dir").map(|p| expand_home(p));

        let busy_timeout_ms = match config.get("busy_timeout_ms") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|e| anyhow!("Invalid busy_timeout_ms '{}': {}", v, e))?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };

        let wal = match config.get("wal") {
            Some(v) => v
                .parse::<bool>()
                .map_err(|e| anyhow!("Invalid wal value '{}': {}", v, e))?,
            None => false,
        };

        Ok(WhisperConfig {
            data_dir,
            database_file,
            migrations_dir,
            busy_timeout_ms,
            wal,
        })
    }

    /// Get the path to the SQLite database file
    pub fn sqlite_path(&self) -> PathBuf {
        let file = Path::new(&self.database_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            Path::new(&self.data_dir).join(file)
        }
    }

    /// Get the directory migrations are read from
    pub fn migrations_path(&self) -> PathBuf {
        match &self.migrations_dir {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(&self.data_dir).join("migrations"),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            busy_timeout: self.busy_timeout(),
            wal: self.wal,
        }
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        [
            format!("Data Directory:     {}", self.data_dir),
            format!("SQLite Path:        {}", self.sqlite_path().display()),
            format!("Migrations:         {}", self.migrations_path().display()),
            format!("Busy Timeout:       {} ms", self.busy_timeout_ms),
            format!("WAL Journal:        {}", self.wal),
        ]
        .join("\n")
    }
}

/// Replace a leading `~` with the home directory
fn expand_home(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            format!("{}{}", home.to_string_lossy(), rest)
        }
        _ => path.to_string(),
    }
}
