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

use futures::StreamExt;
use tracing::trace;

use crate::common::{HarnessResult, TransportRef};
use crate::message::{AckMode, Message};
use crate::traits::{Channel, Connection, Session, Subscription};

/// Receiving side of an agent: its own connection, session and subscription.
pub(crate) struct Consumer {
    connection: Box<dyn Connection>,
    session: Box<dyn Session>,
    subscription: Subscription,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("connection", &self.connection)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Consumer {
    /// Subscribes to `channel`. Messages published after this returns are delivered.
    pub(crate) async fn open(transport: &TransportRef, channel: &Channel) -> HarnessResult<Self> {
        let connection = transport.create_connection().await?;
        let session = match connection.create_session(false, AckMode::Auto).await {
            Ok(session) => session,
            Err(e) => {
                let _ = connection.close().await;
                return Err(e);
            }
        };
        let subscribed = match session.create_channel(channel.name()).await {
            Ok(channel) => session.subscribe(&channel).await,
            Err(e) => Err(e),
        };
        match subscribed {
            Ok(subscription) => {
                trace!(channel = %channel, "Subscribed");
                Ok(Self {
                    connection,
                    session,
                    subscription,
                })
            }
            Err(e) => {
                let _ = session.close().await;
                let _ = connection.close().await;
                Err(e)
            }
        }
    }

    /// Next message, or `None` once the channel is closed.
    ///
    /// Cancel safe: dropping the future loses no message.
    pub(crate) async fn next(&mut self) -> Option<Message> {
        self.subscription.next().await
    }

    pub(crate) async fn close(self) -> HarnessResult<()> {
        let session = self.session.close().await;
        let connection = self.connection.close().await;
        session.and(connection)
    }
}
