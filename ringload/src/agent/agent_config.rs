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

use std::time::Duration;

use crate::agent::RetryConfig;
use crate::common::config::CONFIG;
use crate::message::DeliveryMode;
use crate::traits::Channel;

/// Wiring and behavior of one relay agent.
///
/// A relay consumes `input_channel` and republishes onto `output_channel`.
/// The configuration is fixed once the agent is constructed: fields are
/// private and the `with_*` builders consume `self`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    id: String,
    input_channel: Channel,
    output_channel: Channel,
    delivery_mode: DeliveryMode,
    connection_per_message: bool,
    /// Retry budget for a single publish.
    timeout: Duration,
    retry: RetryConfig,
}

impl AgentConfig {
    /// Creates a configuration with persistent delivery, a shared connection,
    /// an unbounded retry budget and the globally configured backoff.
    pub fn new(id: impl Into<String>, input_channel: Channel, output_channel: Channel) -> Self {
        Self {
            id: id.into(),
            input_channel,
            output_channel,
            delivery_mode: DeliveryMode::default(),
            connection_per_message: false,
            timeout: Duration::MAX,
            retry: CONFIG.retry.clone(),
        }
    }

    /// Sets the delivery mode forwarded with every publish.
    #[must_use]
    pub const fn with_delivery_mode(mut self, delivery_mode: DeliveryMode) -> Self {
        self.delivery_mode = delivery_mode;
        self
    }

    /// Opens and closes a connection around every publish when `enabled`.
    #[must_use]
    pub const fn with_connection_per_message(mut self, enabled: bool) -> Self {
        self.connection_per_message = enabled;
        self
    }

    /// Sets how long a failing publish may be retried before the agent gives up.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the backoff between publish retries.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Agent identifier, used in logs and reports.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Channel the agent consumes.
    #[inline]
    #[must_use]
    pub const fn input_channel(&self) -> &Channel {
        &self.input_channel
    }

    /// Channel the agent publishes to.
    #[inline]
    #[must_use]
    pub const fn output_channel(&self) -> &Channel {
        &self.output_channel
    }

    /// Delivery mode forwarded with every publish.
    #[inline]
    #[must_use]
    pub const fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    /// Whether every publish gets its own connection.
    #[inline]
    #[must_use]
    pub const fn connection_per_message(&self) -> bool {
        self.connection_per_message
    }

    /// Retry budget for a single publish.
    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Backoff between publish retries.
    #[inline]
    #[must_use]
    pub const fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}
