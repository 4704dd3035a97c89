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

use std::fmt::Debug;

/// Names the channels of a pipeline.
///
/// Names must be deterministic for a given strategy value and distinct from
/// each other, so that a run never shares a channel with a stale one.
pub trait ChannelNaming: Debug + Send + Sync {
    /// The channel the controller injects into.
    fn entry(&self) -> String;

    /// The channel the controller counts arrivals on.
    fn terminal(&self) -> String;

    /// The channel between client `index - 1` and client `index`, for `index >= 1`.
    fn hop(&self, index: usize) -> String;
}

/// Default naming: `{prefix}.{run_id}.start`, `{prefix}.{run_id}.end` and
/// `{prefix}.{run_id}.client.{index}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScopedNaming {
    prefix: String,
    run_id: String,
}

impl RunScopedNaming {
    /// Naming under `prefix` for the run `run_id`.
    pub fn new(prefix: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            run_id: run_id.into(),
        }
    }

    /// Naming under `prefix` with a freshly generated run id.
    pub fn random(prefix: impl Into<String>) -> Self {
        Self::new(prefix, random_run_id())
    }

    /// Leading component of every name.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Run identifier embedded in every name.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl ChannelNaming for RunScopedNaming {
    fn entry(&self) -> String {
        format!("{}.{}.start", self.prefix, self.run_id)
    }

    fn terminal(&self) -> String {
        format!("{}.{}.end", self.prefix, self.run_id)
    }

    fn hop(&self, index: usize) -> String {
        format!("{}.{}.client.{index}", self.prefix, self.run_id)
    }
}

/// Sixteen hex digits of randomness.
#[must_use]
pub fn random_run_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}
