/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::agent::RetryConfig;
use crate::common::{HarnessError, HarnessResult};
use crate::message::DeliveryMode;

/// Configuration for the ringload harness.
///
/// Loaded from TOML files in XDG-compliant directories. Every section and
/// every field is optional; anything missing falls back to its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Parameters of the load test itself.
    pub run: LoadTestConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Limits and capacity configuration
    pub limits: LimitsConfig,
    /// Publish retry and backoff configuration
    pub retry: RetryConfig,
    /// Tracing and logging configuration
    pub tracing: TracingConfig,
}

/// Parameters of one load test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadTestConfig {
    /// Number of relay agents between the controller's entry and terminal channels.
    ///
    /// Signed so that a negative value from a config file is reported as a
    /// configuration error instead of a parse failure.
    pub number_of_clients: i64,
    /// Delivery mode passed to every publish.
    pub delivery_mode: DeliveryMode,
    /// Messages per batch.
    pub batch_size: usize,
    /// Batches injected by the controller.
    pub number_of_batches: usize,
    /// How long the controller waits for arrivals, in milliseconds. Unset means unbounded.
    pub timeout_ms: Option<u64>,
    /// Open and close a transport connection around every single publish.
    pub connection_per_message: bool,
    /// Prefix of every channel name created by the run.
    pub channel_prefix: String,
    /// Fixed run identifier. A random one is generated when unset.
    pub run_id: Option<String>,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Longest wait for an agent's tasks to finish after `stop`, in milliseconds.
    pub agent_shutdown_timeout_ms: u64,
}

/// Limits and capacity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Queue depth of each subscription in the in-memory broker.
    pub subscription_capacity: usize,
}

/// Tracing and logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// `EnvFilter` directive string, e.g. `info` or `ringload=trace`.
    pub filter: String,
    /// Directory for log files
    pub log_directory: String,
    /// File name prefix for the daily rolling log.
    pub log_file: String,
    /// Write to stdout instead of the rolling file.
    pub stdout: bool,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            number_of_clients: 50,
            delivery_mode: DeliveryMode::Persistent,
            batch_size: 1000,
            number_of_batches: 10,
            timeout_ms: None,
            connection_per_message: false,
            channel_prefix: "ringload".to_string(),
            run_id: None,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            agent_shutdown_timeout_ms: 10_000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            subscription_capacity: 1024,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            log_directory: "logs".to_string(),
            log_file: "ringload.log".to_string(),
            stdout: false,
        }
    }
}

impl LoadTestConfig {
    /// Checks every parameter and returns the number of messages the run must deliver.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Configuration`] if the client count is negative, a batch
    /// parameter is zero, the expected total overflows, or the channel prefix is empty.
    pub fn validate(&self) -> HarnessResult<u64> {
        if self.number_of_clients < 0 {
            return Err(HarnessError::configuration(format!(
                "number_of_clients must be >= 0, got {}",
                self.number_of_clients
            )));
        }
        if self.batch_size == 0 {
            return Err(HarnessError::configuration("batch_size must be > 0"));
        }
        if self.number_of_batches == 0 {
            return Err(HarnessError::configuration("number_of_batches must be > 0"));
        }
        if self.channel_prefix.is_empty() {
            return Err(HarnessError::configuration("channel_prefix must not be empty"));
        }
        expected_total(self.batch_size, self.number_of_batches)
    }

    /// The controller's wait budget. `Duration::MAX` when unbounded.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout_ms.map_or(Duration::MAX, Duration::from_millis)
    }
}

/// `batch_size × number_of_batches`, rejecting overflow.
pub(crate) fn expected_total(batch_size: usize, number_of_batches: usize) -> HarnessResult<u64> {
    u64::try_from(batch_size)
        .ok()
        .zip(u64::try_from(number_of_batches).ok())
        .and_then(|(size, batches)| size.checked_mul(batches))
        .ok_or_else(|| {
            HarnessError::configuration(format!(
                "{number_of_batches} batches of {batch_size} messages overflow the arrival counter"
            ))
        })
}

impl HarnessConfig {
    /// Agent shutdown timeout as a `Duration`.
    #[must_use]
    pub const fn agent_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.agent_shutdown_timeout_ms)
    }

    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Configuration`] when the document is not valid TOML or
    /// a value has the wrong type.
    pub fn from_toml_str(source: &str) -> HarnessResult<Self> {
        toml::from_str(source)
            .map_err(|e| HarnessError::configuration(format!("malformed configuration: {e}")))
    }

    /// Loads configuration from an explicit file. Unlike [`HarnessConfig::load`]
    /// this does not fall back to defaults.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Configuration`] if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `ringload/config.toml` under `$XDG_CONFIG_HOME` (falling back
    /// to `~/.config`). A missing file yields the defaults; a malformed one is
    /// logged and also yields the defaults.
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("ringload") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e}; using defaults");
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Global configuration loaded once from XDG-compliant locations.
    ///
    /// Supplies process-wide tuning defaults (shutdown timeout, subscription
    /// capacity, retry backoff) for components constructed without explicit
    /// settings.
    pub static ref CONFIG: HarnessConfig = HarnessConfig::load();
}
