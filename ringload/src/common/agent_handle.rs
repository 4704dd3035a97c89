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

use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{instrument, trace, warn};

use crate::agent::agent_state::AgentStateCell;
use crate::agent::AgentState;
use crate::common::config::CONFIG;
use crate::common::{HarnessError, HarnessResult};

/// A clonable handle to a started agent.
///
/// `AgentHandle` is what [`RelayAgent::start`](crate::agent::RelayAgent::start)
/// returns and what a [`ControllerHandle`](crate::agent::ControllerHandle)
/// dereferences to. It exposes the agent's identity, lifecycle state and
/// progress counter, and it is how the agent is stopped.
///
/// Equality and hashing are based solely on the agent's identifier.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    id: Arc<str>,
    pub(crate) state: Arc<AgentStateCell>,
    /// Messages relayed (relay agents) or injected (controller).
    pub(crate) processed: Arc<AtomicU64>,
    /// Tracks every task belonging to the agent.
    tracker: TaskTracker,
    pub(crate) cancellation_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl PartialEq for AgentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AgentHandle {}

impl Hash for AgentHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl AgentHandle {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: Arc::from(id),
            state: Arc::new(AgentStateCell::default()),
            processed: Arc::new(AtomicU64::new(0)),
            tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
            shutdown_timeout: CONFIG.agent_shutdown_timeout(),
        }
    }

    /// Overrides how long [`AgentHandle::stop`] waits for the agent's tasks.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Spawns one of the agent's tasks onto the current runtime.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// The agent's identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> AgentState {
        self.state.get()
    }

    /// Messages relayed by a relay agent, or injected by the controller.
    #[inline]
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Requests cancellation without waiting for the agent to wind down.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Stops the agent and waits for its tasks to release their transport resources.
    ///
    /// Cancellation is cooperative: an in-flight publish completes first. The
    /// wait is bounded by the configured shutdown timeout. Calling `stop` on an
    /// agent that is already stopped (or failed) returns `Ok(())` immediately.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Teardown`] if the agent's tasks are still running when
    /// the shutdown timeout elapses.
    #[instrument(skip(self), fields(agent = %self.id))]
    pub async fn stop(&self) -> HarnessResult<()> {
        if self.state.advance(AgentState::Stopping) {
            trace!("Stop requested");
        }
        self.cancellation_token.cancel();
        self.tracker.close();

        if tokio::time::timeout(self.shutdown_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!("Agent did not stop within {:?}", self.shutdown_timeout);
            return Err(HarnessError::teardown(
                self.id(),
                format!("tasks still running after {:?}", self.shutdown_timeout),
            ));
        }

        self.state.finish();
        trace!(state = %self.state(), "Agent stopped");
        Ok(())
    }
}
