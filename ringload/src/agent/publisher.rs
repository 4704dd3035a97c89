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

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace, warn};

use crate::agent::retry_backoff::RetryBackoff;
use crate::agent::{AgentConfig, RetryConfig};
use crate::common::{HarnessResult, TransportRef};
use crate::message::{AckMode, DeliveryMode, Message};
use crate::traits::{Channel, Connection, Session};

/// How a publish ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PublishOutcome {
    Delivered,
    /// Stop was requested while waiting to retry. The message is dropped.
    Cancelled,
}

/// A connection, a session on it and the resolved output channel.
#[derive(Debug)]
struct ScopedSession {
    connection: Box<dyn Connection>,
    session: Box<dyn Session>,
    channel: Channel,
}

impl ScopedSession {
    async fn open(transport: &TransportRef, channel: &Channel) -> HarnessResult<Self> {
        let connection = transport.create_connection().await?;
        let session = match connection.create_session(false, AckMode::Auto).await {
            Ok(session) => session,
            Err(e) => {
                let _ = connection.close().await;
                return Err(e);
            }
        };
        match session.create_channel(channel.name()).await {
            Ok(channel) => Ok(Self {
                connection,
                session,
                channel,
            }),
            Err(e) => {
                let _ = session.close().await;
                let _ = connection.close().await;
                Err(e)
            }
        }
    }

    async fn publish(&self, message: Message, mode: DeliveryMode) -> HarnessResult<()> {
        self.session.publish(&self.channel, message, mode).await
    }

    async fn close(self) -> HarnessResult<()> {
        let session = self.session.close().await;
        let connection = self.connection.close().await;
        session.and(connection)
    }
}

/// Publishing side of an agent.
///
/// With `connection_per_message` off, one session is opened up front and
/// reused for the whole run; a failed attempt discards it and the next attempt
/// reconnects. With it on, every attempt opens and closes its own connection.
#[derive(Debug)]
pub(crate) struct Publisher {
    agent_id: Arc<str>,
    transport: TransportRef,
    channel: Channel,
    delivery_mode: DeliveryMode,
    connection_per_message: bool,
    timeout: Duration,
    retry: RetryConfig,
    scoped: Option<ScopedSession>,
}

impl Publisher {
    /// Builds the publisher for `config`'s output channel, opening the
    /// run-scoped session unless every message gets its own connection.
    pub(crate) async fn open(transport: TransportRef, config: &AgentConfig) -> HarnessResult<Self> {
        let channel = config.output_channel().clone();
        let scoped = if config.connection_per_message() {
            None
        } else {
            Some(ScopedSession::open(&transport, &channel).await?)
        };
        Ok(Self {
            agent_id: Arc::from(config.id()),
            transport,
            channel,
            delivery_mode: config.delivery_mode(),
            connection_per_message: config.connection_per_message(),
            timeout: config.timeout(),
            retry: config.retry().clone(),
            scoped,
        })
    }

    /// Publishes `message`, retrying with backoff until it succeeds, the
    /// retry budget runs out, or `cancel` fires.
    ///
    /// # Errors
    ///
    /// The last transport error once the budget is spent.
    #[instrument(level = "trace", skip(self, message, cancel), fields(agent = %self.agent_id, channel = %self.channel))]
    pub(crate) async fn publish(
        &mut self,
        message: Message,
        cancel: &CancellationToken,
    ) -> HarnessResult<PublishOutcome> {
        let mut backoff = RetryBackoff::new(self.retry.clone(), self.timeout);
        loop {
            let error = match self.attempt(message.clone()).await {
                Ok(()) => return Ok(PublishOutcome::Delivered),
                Err(e) => e,
            };
            let Some(delay) = backoff.next_delay() else {
                return Err(error);
            };
            warn!(
                attempt = backoff.attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Publish failed, retrying: {error}"
            );
            tokio::select! {
                () = cancel.cancelled() => return Ok(PublishOutcome::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&mut self, message: Message) -> HarnessResult<()> {
        if self.connection_per_message {
            trace!("Opening per-message connection");
            let scoped = ScopedSession::open(&self.transport, &self.channel).await?;
            let published = scoped.publish(message, self.delivery_mode).await;
            // Delivered messages are never retried, even when the close fails.
            if let Err(e) = scoped.close().await {
                warn!("Failed to close per-message connection: {e}");
            }
            return published;
        }

        let scoped = match self.scoped.take() {
            Some(scoped) => scoped,
            None => {
                trace!("Reopening run-scoped session");
                ScopedSession::open(&self.transport, &self.channel).await?
            }
        };
        match scoped.publish(message, self.delivery_mode).await {
            Ok(()) => {
                self.scoped = Some(scoped);
                Ok(())
            }
            Err(e) => {
                let _ = scoped.close().await;
                Err(e)
            }
        }
    }

    /// Releases the run-scoped session. Calling it again does nothing.
    pub(crate) async fn close(&mut self) -> HarnessResult<()> {
        match self.scoped.take() {
            Some(scoped) => scoped.close().await,
            None => Ok(()),
        }
    }
}
