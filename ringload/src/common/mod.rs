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

//! Shared infrastructure: agent handles, the run orchestration, the in-memory
//! backend, configuration, errors and logging.

// --- Public Re-exports ---
pub use agent_handle::AgentHandle;
pub use config::{HarnessConfig, LimitsConfig, LoadTestConfig, TimeoutConfig, TracingConfig};
pub use error::{HarnessError, HarnessResult};
pub use load_test_run::{LoadTestRun, RunReport};
pub use logging::init_tracing;
pub use memory_broker::MemoryBroker;
pub use types::*;

// --- Submodules ---

/// Shared type aliases.
mod types;

/// The `AgentHandle` returned by every started agent.
mod agent_handle;
/// End-to-end run orchestration and its report.
mod load_test_run;
/// In-process pub/sub backend.
mod memory_broker;
/// Tracing subscriber setup.
mod logging;
/// Error taxonomy.
mod error;
/// Layered configuration loaded from XDG locations.
pub mod config;
