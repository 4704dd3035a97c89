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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Ringload
//!
//! A load-test harness for publish/subscribe backends. Ringload wires a chain
//! of relay agents over named channels, injects batches of messages at one end
//! and counts what comes out of the other, reporting loss and latency.
//!
//! ## Key Concepts
//!
//! - **Relay agents (`RelayAgent`)**: consume one channel and republish every
//!   message onto the next.
//! - **Controller (`Controller`)**: injects `number_of_batches` batches of
//!   `batch_size` messages into the entry channel and counts arrivals on the
//!   terminal channel, on two independent tasks.
//! - **Pipeline (`PipelineBuilder`)**: derives the channel chain
//!   `entry -> client 0 -> ... -> client N-1 -> terminal` and every agent's
//!   configuration.
//! - **Runs (`LoadTestRun`)**: builds, starts, waits, compares and always tears
//!   down, producing a `RunReport`.
//! - **Transport (`Transport`, `Connection`, `Session`)**: the seam to the
//!   backend under test. `MemoryBroker` is an in-process implementation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ringload::prelude::*;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = LoadTestConfig {
//!     number_of_clients: 3,
//!     batch_size: 100,
//!     number_of_batches: 2,
//!     ..LoadTestConfig::default()
//! };
//! let report = LoadTestRun::new(Arc::new(MemoryBroker::default()), config)
//!     .execute()
//!     .await?;
//! report.ensure_passed()?;
//! # Ok(())
//! # }
//! ```

/// Agent handles, configuration, errors, logging, the memory broker and run orchestration.
pub(crate) mod common;

/// Relay agents and the controller.
pub(crate) mod agent;

/// Messages and delivery metadata.
pub(crate) mod message;

/// Topology derivation and channel naming.
pub(crate) mod pipeline;

/// The transport seam.
pub(crate) mod traits;

pub use agent::{
    AgentConfig, AgentState, Controller, ControllerHandle, RelayAgent, RetryConfig, CONTROLLER_ID,
};
pub use common::config::CONFIG;
pub use common::{
    init_tracing, AgentHandle, HarnessConfig, HarnessError, HarnessResult, LimitsConfig,
    LoadTestConfig, LoadTestRun, MemoryBroker, RunReport, TimeoutConfig, TracingConfig,
    TransportRef,
};
pub use message::{AckMode, DeliveryMode, Message};
pub use pipeline::{
    random_run_id, ChannelNaming, Pipeline, PipelineBuilder, PipelineTopology, RunScopedNaming,
    DEFAULT_CHANNEL_PREFIX,
};
pub use traits::{Channel, Connection, Session, Subscription, Transport};

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## External Crates
/// *   [`async_trait::async_trait`](https://docs.rs/async-trait/latest/async_trait/attr.async_trait.html):
///     needed to implement the transport traits for another backend.
///
/// ## Core Types
/// *   [`crate::LoadTestRun`], [`crate::LoadTestConfig`], [`crate::RunReport`]: running a load test.
/// *   [`crate::RelayAgent`], [`crate::Controller`], [`crate::AgentHandle`],
///     [`crate::ControllerHandle`], [`crate::AgentConfig`], [`crate::AgentState`]: the agents.
/// *   [`crate::PipelineBuilder`], [`crate::RunScopedNaming`], [`crate::ChannelNaming`]: wiring.
/// *   [`crate::Transport`], [`crate::Connection`], [`crate::Session`], [`crate::Channel`],
///     [`crate::MemoryBroker`]: the backend seam.
pub mod prelude {
    // External crate re-exports
    pub use async_trait::async_trait;

    // Core types
    pub use crate::agent::{AgentConfig, AgentState, Controller, ControllerHandle, RelayAgent, RetryConfig};
    pub use crate::common::{
        AgentHandle, HarnessConfig, HarnessError, HarnessResult, LoadTestConfig, LoadTestRun,
        MemoryBroker, RunReport, TransportRef,
    };
    pub use crate::message::{AckMode, DeliveryMode, Message};
    pub use crate::pipeline::{ChannelNaming, Pipeline, PipelineBuilder, PipelineTopology, RunScopedNaming};
    pub use crate::traits::{Channel, Connection, Session, Subscription, Transport};
}
