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

use std::fmt;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{error, info, instrument, trace, warn};

use crate::agent::{AgentState, Controller, ControllerHandle, RelayAgent, RetryConfig};
use crate::common::config::{HarnessConfig, LoadTestConfig, CONFIG};
use crate::common::{AgentHandle, HarnessError, HarnessResult, TransportRef};
use crate::message::AckMode;
use crate::pipeline::{random_run_id, Pipeline, PipelineBuilder, RunScopedNaming};
use crate::traits::{Connection, Session};

/// One end-to-end load test: build the pipeline, start every agent, inject,
/// wait, compare, tear down.
///
/// Teardown always runs once any agent has started, whether the run completed,
/// timed out or failed part way through. If the future returned by
/// [`LoadTestRun::execute`] is dropped early, every started agent is cancelled.
#[derive(Debug)]
pub struct LoadTestRun {
    transport: TransportRef,
    config: LoadTestConfig,
    retry: RetryConfig,
    shutdown_timeout: Duration,
}

/// What a completed run observed.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifier embedded in every channel name of the run.
    pub run_id: String,
    /// Messages injected: batch size times number of batches.
    pub expected: u64,
    /// Messages counted at the terminal channel.
    pub received: u64,
    /// Time from the controller starting until counting finished or timed out.
    pub elapsed: Duration,
    /// Mean injection-to-arrival latency, `None` when nothing arrived.
    pub mean_latency: Option<Duration>,
    /// Largest injection-to-arrival latency.
    pub max_latency: Duration,
    /// Agents that gave up after exhausting their retry budget.
    pub failed_agents: Vec<String>,
    /// Agents that did not stop cleanly, and a management session that did not close.
    pub teardown_errors: Vec<HarnessError>,
}

impl RunReport {
    /// `true` when every injected message arrived.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.received == self.expected
    }

    /// Messages that did not arrive.
    #[must_use]
    pub const fn shortfall(&self) -> u64 {
        self.expected.saturating_sub(self.received)
    }

    /// Converts a failed run into an error.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Incomplete`] carrying the expected and observed counts.
    pub const fn ensure_passed(&self) -> HarnessResult<()> {
        if self.passed() {
            Ok(())
        } else {
            Err(HarnessError::Incomplete {
                expected: self.expected,
                received: self.received,
            })
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed() { "PASS" } else { "FAIL" };
        write!(
            f,
            "run {}: {verdict} received {}/{} in {:.3?}",
            self.run_id, self.received, self.expected, self.elapsed
        )?;
        if !self.passed() {
            write!(f, " (shortfall {})", self.shortfall())?;
        }
        if let Some(mean) = self.mean_latency {
            write!(f, ", latency mean {mean:.3?} max {:.3?}", self.max_latency)?;
        }
        if !self.failed_agents.is_empty() {
            write!(f, ", failed agents: {}", self.failed_agents.join(", "))?;
        }
        if !self.teardown_errors.is_empty() {
            write!(f, ", {} teardown error(s)", self.teardown_errors.len())?;
        }
        Ok(())
    }
}

/// Observations of the drive phase.
#[derive(Debug)]
struct DriveOutcome {
    received: u64,
    elapsed: Duration,
    mean_latency: Option<Duration>,
    max_latency: Duration,
    failed_agents: Vec<String>,
}

/// Every agent started so far. Dropping it cancels whatever has not been stopped.
#[derive(Debug, Default)]
struct StartedAgents {
    controller: Option<ControllerHandle>,
    relays: Vec<AgentHandle>,
}

impl StartedAgents {
    fn failed(&self) -> Vec<String> {
        self.relays
            .iter()
            .chain(self.controller.as_deref())
            .filter(|agent| agent.state() == AgentState::Failed)
            .map(|agent| agent.id().to_string())
            .collect()
    }

    /// Cancels the controller, then every relay, and waits for all of them
    /// concurrently so a stuck agent costs one shutdown timeout, not one per
    /// agent. Errors come back in pipeline order, controller first.
    ///
    /// An agent blocked inside a publish by backpressure from a stalled hop
    /// cannot observe cancellation either, so it is reported alongside the
    /// stalled agent. The last relay in that list is where the stall began.
    async fn stop_all(&mut self) -> Vec<HarnessError> {
        let controller = self.controller.take();
        let relays = std::mem::take(&mut self.relays);
        let agents: Vec<&AgentHandle> = controller
            .as_deref()
            .into_iter()
            .chain(&relays)
            .collect();
        for agent in &agents {
            agent.cancel();
        }
        join_all(agents.into_iter().map(AgentHandle::stop))
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }
}

impl Drop for StartedAgents {
    fn drop(&mut self) {
        if let Some(controller) = &self.controller {
            controller.cancel();
        }
        for relay in &self.relays {
            relay.cancel();
        }
    }
}

/// The connection and session used to create the run's channels.
#[derive(Debug)]
struct Management {
    connection: Box<dyn Connection>,
    session: Box<dyn Session>,
}

impl Management {
    async fn open(transport: &TransportRef) -> HarnessResult<Self> {
        let connection = transport.create_connection().await?;
        match connection.create_session(false, AckMode::Auto).await {
            Ok(session) => Ok(Self {
                connection,
                session,
            }),
            Err(e) => {
                let _ = connection.close().await;
                Err(e)
            }
        }
    }

    async fn close(self) -> HarnessResult<()> {
        let session = self.session.close().await;
        let connection = self.connection.close().await;
        session.and(connection)
    }
}

impl LoadTestRun {
    /// Prepares a run of `config` against `transport`.
    ///
    /// Retry backoff and the agent shutdown timeout come from the global
    /// [`CONFIG`]; use [`LoadTestRun::from_config`] to take them from a
    /// specific configuration instead.
    pub fn new(transport: TransportRef, config: LoadTestConfig) -> Self {
        Self {
            transport,
            config,
            retry: CONFIG.retry.clone(),
            shutdown_timeout: CONFIG.agent_shutdown_timeout(),
        }
    }

    /// Prepares a run whose parameters, retry backoff and shutdown timeout all
    /// come from `config`.
    pub fn from_config(transport: TransportRef, config: &HarnessConfig) -> Self {
        Self::new(transport, config.run.clone())
            .with_retry(config.retry.clone())
            .with_shutdown_timeout(config.agent_shutdown_timeout())
    }

    /// Retry backoff for every agent of the run.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// How long teardown waits for each agent to stop.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The run's parameters.
    #[must_use]
    pub const fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Runs the load test to completion and reports what arrived.
    ///
    /// A run that loses messages or times out still returns `Ok`; use
    /// [`RunReport::passed`] or [`RunReport::ensure_passed`] to judge it.
    ///
    /// # Errors
    ///
    /// * [`HarnessError::Configuration`] for invalid parameters, before anything starts.
    /// * [`HarnessError::Transport`] if channels cannot be created or an agent
    ///   cannot be started. Agents already started are stopped first.
    #[instrument(skip(self), fields(clients = self.config.number_of_clients))]
    pub async fn execute(&self) -> HarnessResult<RunReport> {
        let expected = self.config.validate()?;
        let run_id = self.config.run_id.clone().unwrap_or_else(random_run_id);
        let pipeline = PipelineBuilder::new(self.config.number_of_clients)?
            .with_naming(RunScopedNaming::new(
                self.config.channel_prefix.clone(),
                run_id.clone(),
            ))
            .with_delivery_mode(self.config.delivery_mode)
            .with_connection_per_message(self.config.connection_per_message)
            .with_timeout(self.config.timeout())
            .with_retry(self.retry.clone())
            .build();
        info!(
            run_id = %run_id,
            expected,
            delivery_mode = %self.config.delivery_mode,
            connection_per_message = self.config.connection_per_message,
            "Starting load test"
        );

        let management = Management::open(&self.transport).await?;
        let mut agents = StartedAgents::default();
        let driven = self.drive(&pipeline, &management, &mut agents).await;

        let mut teardown_errors = agents.stop_all().await;
        if let Err(e) = management.close().await {
            teardown_errors.push(HarnessError::teardown("management", e.to_string()));
        }
        for e in &teardown_errors {
            warn!("{e}");
        }

        let outcome = driven?;
        let report = RunReport {
            run_id,
            expected,
            received: outcome.received,
            elapsed: outcome.elapsed,
            mean_latency: outcome.mean_latency,
            max_latency: outcome.max_latency,
            failed_agents: outcome.failed_agents,
            teardown_errors,
        };
        if report.passed() {
            info!("{report}");
        } else {
            error!("{report}");
        }
        Ok(report)
    }

    async fn drive(
        &self,
        pipeline: &Pipeline,
        management: &Management,
        agents: &mut StartedAgents,
    ) -> HarnessResult<DriveOutcome> {
        for channel in pipeline.topology.channels() {
            management.session.create_channel(channel.name()).await?;
        }
        trace!(channels = pipeline.topology.channels().len(), "Channels created");

        for config in &pipeline.clients {
            let relay = RelayAgent::new(config.clone(), self.transport.clone());
            let handle = relay.start().await?;
            agents.relays.push(handle.with_shutdown_timeout(self.shutdown_timeout));
        }
        trace!(relays = agents.relays.len(), "Relays started");

        let mut controller = Controller::from_config(&pipeline.controller, self.transport.clone());
        controller
            .set_batch_size(self.config.batch_size)
            .set_number_of_batches(self.config.number_of_batches);
        let started = Instant::now();
        let controller = agents.controller.insert(
            controller
                .start()
                .await?
                .with_shutdown_timeout(self.shutdown_timeout),
        );

        let received = controller.await_test_complete().await;
        let elapsed = started.elapsed();
        Ok(DriveOutcome {
            received,
            elapsed,
            mean_latency: controller.mean_latency(),
            max_latency: controller.max_latency(),
            failed_agents: agents.failed(),
        })
    }
}
