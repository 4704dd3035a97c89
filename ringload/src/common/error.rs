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

use thiserror::Error;

/// Errors surfaced by the harness.
///
/// Only [`HarnessError::Configuration`] and setup-time
/// [`HarnessError::Transport`] failures abort a run. Transport failures that
/// happen while messages are flowing are absorbed by the agent that hit them
/// and show up as a deficit in the controller's arrival count. Running out of
/// time is not an error at all: the controller returns whatever it counted.
#[derive(Debug, Clone, Error)]
pub enum HarnessError {
    /// Invalid topology or run parameters, detected before any agent starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A publish, subscribe or session operation failed at a channel boundary.
    #[error("transport failure on '{channel}': {reason}")]
    Transport {
        /// Channel (or connection scope) the operation targeted.
        channel: String,
        /// Backend-provided description.
        reason: String,
    },

    /// An agent did not shut down cleanly.
    #[error("agent '{agent}' did not stop cleanly: {reason}")]
    Teardown {
        /// Identifier of the agent being stopped.
        agent: String,
        /// What went wrong.
        reason: String,
    },

    /// The run finished with fewer arrivals than were injected.
    #[error("expected {expected} messages but received {received} (shortfall {})", expected.saturating_sub(*received))]
    Incomplete {
        /// Messages injected by the controller.
        expected: u64,
        /// Messages counted at the terminal channel.
        received: u64,
    },
}

impl HarnessError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn transport(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn teardown(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Teardown {
            agent: agent.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors originating in the transport.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Result alias used throughout the crate.
pub type HarnessResult<T, E = HarnessError> = std::result::Result<T, E>;
