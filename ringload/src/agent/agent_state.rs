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
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a relay agent or controller.
///
/// ```text
/// Created -> Running -> Stopping -> Stopped
///                  \-> Failed
/// ```
///
/// Transitions only move forward. `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AgentState {
    /// Configured but not started.
    Created = 0,
    /// Consuming and forwarding.
    Running = 1,
    /// Asked to stop; finishing the in-flight publish.
    Stopping = 2,
    /// Stopped; transport resources released.
    Stopped = 3,
    /// Gave up after a publish failure outlived its retry budget.
    Failed = 4,
}

impl AgentState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Stopped,
            _ => Self::Failed,
        }
    }

    const fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running)
                | (Self::Running, Self::Stopping | Self::Failed)
                | (Self::Stopping, Self::Stopped)
        )
    }

    /// `true` for `Stopped` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Atomic holder for an [`AgentState`], shared between an agent's task and its handle.
#[derive(Debug)]
pub(crate) struct AgentStateCell(AtomicU8);

impl Default for AgentStateCell {
    fn default() -> Self {
        Self(AtomicU8::new(AgentState::Created as u8))
    }
}

impl AgentStateCell {
    pub(crate) fn get(&self) -> AgentState {
        AgentState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` if that is a legal forward transition from the current state.
    /// Returns whether the transition happened.
    pub(crate) fn advance(&self, next: AgentState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                AgentState::from_u8(raw)
                    .can_become(next)
                    .then_some(next as u8)
            })
            .is_ok()
    }

    /// Walks a running or stopping agent to `Stopped`. Failed agents stay failed.
    pub(crate) fn finish(&self) {
        self.advance(AgentState::Stopping);
        self.advance(AgentState::Stopped);
    }
}
