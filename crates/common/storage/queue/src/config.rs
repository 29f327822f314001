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

use std::{path::PathBuf, time::Duration};

use bon::Builder;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::compression::Compression;

/// Poll period used when a source is configured with none.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(5);

/// Writer-side configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct MessageSinkConfig {
    /// Root path of the queue in the store.
    #[builder(into)]
    #[default(_code = "PathBuf::from(\"/\")")]
    pub path: PathBuf,

    /// Rotate after this many messages. `0` disables count-based rotation.
    #[builder(default)]
    pub max_unflushed_messages: u64,

    /// Rotate once this much time has passed since the last rotation. Only
    /// checked when a message is appended. Zero disables time-based rotation.
    #[builder(default)]
    #[serde(with = "humantime_serde")]
    pub max_unflushed_time: Duration,

    #[builder(default)]
    pub compression: Compression,
}

/// Reader-side configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct MessageSourceConfig {
    /// Root path of the queue in the store.
    #[builder(into)]
    #[default(_code = "PathBuf::from(\"/\")")]
    pub path: PathBuf,

    /// How long to wait before looking again for a segment that does not
    /// exist yet. Zero means [`DEFAULT_POLL_PERIOD`].
    #[builder(default = DEFAULT_POLL_PERIOD)]
    #[default(_code = "DEFAULT_POLL_PERIOD")]
    #[serde(with = "humantime_serde")]
    pub poll_period: Duration,

    /// Must match the compression the queue was written with.
    #[builder(default)]
    pub compression: Compression,
}

/// When the sink finalizes the current segment and starts the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotationPolicy {
    pub max_unflushed_messages: u64,
    pub max_unflushed_time:     Duration,
}

impl RotationPolicy {
    /// Returns `true` if either configured limit has been reached. Limits
    /// set to zero never trigger.
    pub fn should_rotate(&self, unflushed: u64, elapsed: Duration) -> bool {
        let by_count = self.max_unflushed_messages > 0 && unflushed >= self.max_unflushed_messages;
        let by_time = !self.max_unflushed_time.is_zero() && elapsed >= self.max_unflushed_time;
        by_count || by_time
    }
}

impl From<&MessageSinkConfig> for RotationPolicy {
    fn from(config: &MessageSinkConfig) -> Self {
        Self {
            max_unflushed_messages: config.max_unflushed_messages,
            max_unflushed_time:     config.max_unflushed_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_by_count() {
        let policy = RotationPolicy {
            max_unflushed_messages: 100,
            ..Default::default()
        };
        assert!(!policy.should_rotate(99, Duration::from_secs(3600)));
        assert!(policy.should_rotate(100, Duration::ZERO));
        assert!(policy.should_rotate(101, Duration::ZERO));
    }

    #[test]
    fn test_rotate_by_time() {
        let policy = RotationPolicy {
            max_unflushed_time: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(!policy.should_rotate(1_000_000, Duration::from_secs(59)));
        assert!(policy.should_rotate(0, Duration::from_secs(60)));
        assert!(policy.should_rotate(0, Duration::from_secs(61)));
    }

    #[test]
    fn test_rotate_combined() {
        let policy = RotationPolicy {
            max_unflushed_messages: 10,
            max_unflushed_time:     Duration::from_millis(5),
        };
        assert!(!policy.should_rotate(9, Duration::from_millis(4)));
        assert!(policy.should_rotate(10, Duration::from_millis(4)));
        assert!(policy.should_rotate(9, Duration::from_millis(5)));
    }

    #[test]
    fn test_rotation_disabled_by_default() {
        let policy = RotationPolicy::from(&MessageSinkConfig::default());
        assert!(!policy.should_rotate(u64::MAX, Duration::MAX));
    }

    #[test]
    fn test_source_config_defaults() {
        let config = MessageSourceConfig::builder().path("/foo").build();
        assert_eq!(config.path, PathBuf::from("/foo"));
        assert_eq!(config.poll_period, DEFAULT_POLL_PERIOD);
        assert_eq!(config.compression, Compression::None);
        assert_eq!(MessageSourceConfig::default().poll_period, DEFAULT_POLL_PERIOD);
    }

    #[test]
    fn test_sink_config_from_json() {
        let config: MessageSinkConfig = serde_json::from_str(
            r#"{"path": "/q", "max_unflushed_messages": 10, "max_unflushed_time": "250ms", "compression": "zstd"}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            MessageSinkConfig::builder()
                .path("/q")
                .max_unflushed_messages(10)
                .max_unflushed_time(Duration::from_millis(250))
                .compression(Compression::Zstd)
                .build()
        );
    }

    #[test]
    fn test_source_config_missing_fields_use_defaults() {
        let config: MessageSourceConfig = serde_json::from_str(r#"{"path": "/q"}"#).unwrap();
        assert_eq!(config.poll_period, DEFAULT_POLL_PERIOD);
    }
}
