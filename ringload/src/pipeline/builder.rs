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

use tracing::{instrument, trace};

use crate::agent::{AgentConfig, RetryConfig, CONTROLLER_ID};
use crate::common::config::CONFIG;
use crate::common::{HarnessError, HarnessResult};
use crate::message::DeliveryMode;
use crate::pipeline::{ChannelNaming, PipelineTopology, RunScopedNaming};
use crate::traits::Channel;

/// Default channel prefix for pipelines built without an explicit naming strategy.
pub const DEFAULT_CHANNEL_PREFIX: &str = "ringload";

/// Derives the topology of a pipeline and the configuration of every agent in it.
///
/// ```
/// # use ringload::prelude::*;
/// let pipeline = PipelineBuilder::new(3)?
///     .with_naming(RunScopedNaming::new("demo", "run1"))
///     .build();
/// assert_eq!(pipeline.clients.len(), 3);
/// assert_eq!(pipeline.clients[0].input_channel().name(), "demo.run1.start");
/// assert_eq!(pipeline.clients[2].output_channel().name(), "demo.run1.end");
/// # Ok::<(), ringload::HarnessError>(())
/// ```
#[derive(Debug)]
pub struct PipelineBuilder {
    number_of_clients: usize,
    naming: Box<dyn ChannelNaming>,
    delivery_mode: DeliveryMode,
    connection_per_message: bool,
    timeout: Duration,
    retry: RetryConfig,
}

/// The output of [`PipelineBuilder::build`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Every channel of the run, in traversal order.
    pub topology: PipelineTopology,
    /// One configuration per relay, `clients[i]` reading `topology.channels()[i]`.
    pub clients: Vec<AgentConfig>,
    /// Controller wiring: input is the terminal channel, output the entry channel.
    pub controller: AgentConfig,
}

impl PipelineBuilder {
    /// Starts a pipeline of `number_of_clients` relays with run-scoped naming
    /// under a random run id.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Configuration`] if `number_of_clients` is negative.
    pub fn new(number_of_clients: i64) -> HarnessResult<Self> {
        let number_of_clients = usize::try_from(number_of_clients).map_err(|_| {
            HarnessError::configuration(format!(
                "number_of_clients must be >= 0, got {number_of_clients}"
            ))
        })?;
        Ok(Self {
            number_of_clients,
            naming: Box::new(RunScopedNaming::random(DEFAULT_CHANNEL_PREFIX)),
            delivery_mode: DeliveryMode::default(),
            connection_per_message: false,
            timeout: Duration::MAX,
            retry: CONFIG.retry.clone(),
        })
    }

    /// Replaces the channel naming strategy.
    #[must_use]
    pub fn with_naming(mut self, naming: impl ChannelNaming + 'static) -> Self {
        self.naming = Box::new(naming);
        self
    }

    /// Delivery mode for every agent.
    #[must_use]
    pub const fn with_delivery_mode(mut self, delivery_mode: DeliveryMode) -> Self {
        self.delivery_mode = delivery_mode;
        self
    }

    /// Connection-per-message mode for every agent.
    #[must_use]
    pub const fn with_connection_per_message(mut self, enabled: bool) -> Self {
        self.connection_per_message = enabled;
        self
    }

    /// Publish retry budget for every agent.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry backoff for every agent.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Derives the topology and the agent configurations.
    #[instrument(skip(self), fields(clients = self.number_of_clients))]
    pub fn build(&self) -> Pipeline {
        let topology = PipelineTopology::new(self.number_of_clients, self.naming.as_ref());
        let channels = topology.channels();
        let clients = channels
            .windows(2)
            .enumerate()
            .map(|(index, hop)| self.agent_config(format!("client-{index}"), &hop[0], &hop[1]))
            .collect::<Vec<_>>();
        let controller =
            self.agent_config(CONTROLLER_ID.to_string(), topology.terminal(), topology.entry());

        trace!(
            entry = %topology.entry(),
            terminal = %topology.terminal(),
            "Pipeline built"
        );
        Pipeline {
            topology,
            clients,
            controller,
        }
    }

    fn agent_config(&self, id: String, input: &Channel, output: &Channel) -> AgentConfig {
        AgentConfig::new(id, input.clone(), output.clone())
            .with_delivery_mode(self.delivery_mode)
            .with_connection_per_message(self.connection_per_message)
            .with_timeout(self.timeout)
            .with_retry(self.retry.clone())
    }
}
