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

use std::sync::atomic::Ordering;

use tracing::{error, instrument, trace, warn};

use crate::agent::consumer::Consumer;
use crate::agent::publisher::{PublishOutcome, Publisher};
use crate::agent::{AgentConfig, AgentState};
use crate::common::{AgentHandle, HarnessResult, TransportRef};

/// One hop of the pipeline: consumes its input channel and republishes every
/// message, unchanged, onto its output channel.
///
/// A `RelayAgent` is the idle form of the agent. [`RelayAgent::start`] consumes
/// it and returns an [`AgentHandle`], so a stopped relay cannot be restarted.
///
/// # Failure
///
/// A publish that keeps failing is retried with exponential backoff until the
/// configured timeout is spent. The relay then logs the error, moves to
/// [`AgentState::Failed`] and stops forwarding. Other relays are unaffected;
/// the lost messages show up as a shortfall at the controller.
#[derive(Debug)]
pub struct RelayAgent {
    config: AgentConfig,
    transport: TransportRef,
}

impl RelayAgent {
    /// Creates an idle relay for `config` on `transport`.
    pub fn new(config: AgentConfig, transport: TransportRef) -> Self {
        Self { config, transport }
    }

    /// The relay's configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Subscribes to the input channel and starts relaying.
    ///
    /// The subscription is in place when this returns, so anything published
    /// to the input channel afterwards reaches this relay.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Transport`](crate::common::HarnessError::Transport) if
    /// the consumer or the run-scoped publisher cannot be opened. Nothing is
    /// left running in that case.
    #[instrument(skip(self), fields(agent = %self.config.id()))]
    pub async fn start(self) -> HarnessResult<AgentHandle> {
        let Self { config, transport } = self;
        let consumer = Consumer::open(&transport, config.input_channel()).await?;
        let publisher = match Publisher::open(transport, &config).await {
            Ok(publisher) => publisher,
            Err(e) => {
                let _ = consumer.close().await;
                return Err(e);
            }
        };

        let handle = AgentHandle::new(config.id());
        handle.state.advance(AgentState::Running);
        trace!(
            input = %config.input_channel(),
            output = %config.output_channel(),
            "Relay running"
        );
        handle.spawn(relay(consumer, publisher, handle.clone()));
        Ok(handle)
    }
}

async fn relay(mut consumer: Consumer, mut publisher: Publisher, handle: AgentHandle) {
    let cancel = handle.cancellation_token.clone();
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                trace!(agent = handle.id(), "Relay cancelled");
                break;
            }
            next = consumer.next() => match next {
                Some(message) => message,
                None => {
                    trace!(agent = handle.id(), "Input channel closed");
                    break;
                }
            },
        };

        match publisher.publish(message, &cancel).await {
            Ok(PublishOutcome::Delivered) => {
                handle.processed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(PublishOutcome::Cancelled) => break,
            Err(e) => {
                error!(agent = handle.id(), "Relay giving up: {e}");
                handle.state.advance(AgentState::Failed);
                break;
            }
        }
    }

    if let Err(e) = publisher.close().await {
        warn!(agent = handle.id(), "Failed to close publisher: {e}");
    }
    if let Err(e) = consumer.close().await {
        warn!(agent = handle.id(), "Failed to close consumer: {e}");
    }
    handle.state.finish();
    trace!(
        agent = handle.id(),
        relayed = handle.processed(),
        state = %handle.state(),
        "Relay finished"
    );
}
