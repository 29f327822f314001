// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::{Path, PathBuf};

use config::ConfigError;
use freezer_common_telemetry::LoggingOptions;
use freezer_queue::{MessageSinkConfig, MessageSourceConfig};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Prefix of environment overrides, e.g.
/// `FREEZER__SINK__MAX_UNFLUSHED_MESSAGES=100`.
const ENV_PREFIX: &str = "FREEZER";

/// Everything the binary can be configured with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct FreezerSettings {
    /// Directory the filesystem store lives in.
    #[default(_code = "PathBuf::from(\"data\")")]
    pub store_dir: PathBuf,

    /// Queue root inside the store, shared by `sink` and `source`.
    #[default(_code = "PathBuf::from(\"/\")")]
    pub queue_path: PathBuf,

    pub sink: MessageSinkConfig,

    pub source: MessageSourceConfig,

    #[default(_code = "default_logging()")]
    pub logging: LoggingOptions,
}

/// Program output goes to stdout, so only warnings are logged there unless
/// configured otherwise.
fn default_logging() -> LoggingOptions { LoggingOptions::builder().level("warn").build() }

impl FreezerSettings {
    /// Loads settings from an optional TOML file, then `FREEZER__*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::Message(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));

        let mut settings: Self = builder.build()?.try_deserialize()?;
        settings.apply_queue_path();
        Ok(settings)
    }

    /// Points both ends at `path`.
    pub fn set_queue_path(&mut self, path: impl Into<PathBuf>) {
        self.queue_path = path.into();
        self.apply_queue_path();
    }

    fn apply_queue_path(&mut self) {
        self.sink.path.clone_from(&self.queue_path);
        self.source.path.clone_from(&self.queue_path);
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use freezer_queue::Compression;

    use super::*;

    #[test]
    fn test_defaults() {
        let settings = FreezerSettings::default();
        assert_eq!(settings.store_dir, PathBuf::from("data"));
        assert_eq!(settings.queue_path, PathBuf::from("/"));
        assert_eq!(settings.logging.level.as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
store_dir = "/var/lib/freezer"
queue_path = "/events"

[sink]
max_unflushed_messages = 1000
max_unflushed_time = "30s"
compression = "zstd"

[source]
poll_period = "250ms"
compression = "zstd"

[logging]
level = "debug"
"#
        )
        .unwrap();

        let settings = FreezerSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.store_dir, PathBuf::from("/var/lib/freezer"));
        assert_eq!(settings.sink.path, PathBuf::from("/events"));
        assert_eq!(settings.source.path, PathBuf::from("/events"));
        assert_eq!(settings.sink.max_unflushed_messages, 1000);
        assert_eq!(settings.sink.max_unflushed_time, Duration::from_secs(30));
        assert_eq!(settings.sink.compression, Compression::Zstd);
        assert_eq!(settings.source.poll_period, Duration::from_millis(250));
        assert_eq!(settings.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(FreezerSettings::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_set_queue_path_updates_both_ends() {
        let mut settings = FreezerSettings::default();
        settings.set_queue_path("/orders");
        assert_eq!(settings.sink.path, PathBuf::from("/orders"));
        assert_eq!(settings.source.path, PathBuf::from("/orders"));
    }
}
