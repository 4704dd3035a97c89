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

use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::common::HarnessResult;
use crate::message::{AckMode, DeliveryMode, Message};

/// Stream of messages delivered to one subscriber, in arrival order.
///
/// The stream stays pending while the channel is empty and ends only when the
/// subscription is closed (its session closed or the backend shut down).
pub type Subscription = BoxStream<'static, Message>;

/// A named publish/subscribe topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    name: Arc<str>,
}

impl Channel {
    /// Creates a handle for the topic called `name`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    /// The topic name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Entry point into a publish/subscribe backend.
///
/// Implementations must be shareable across every agent of a run; each agent
/// opens its own connections from the same transport.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Opens a new connection to the backend.
    async fn create_connection(&self) -> HarnessResult<Box<dyn Connection>>;
}

/// An open connection. Sessions are created from it.
#[async_trait]
pub trait Connection: Debug + Send + Sync {
    /// Opens a session on this connection.
    async fn create_session(
        &self,
        transacted: bool,
        ack_mode: AckMode,
    ) -> HarnessResult<Box<dyn Session>>;

    /// Closes the connection and every session opened from it.
    ///
    /// Closing an already closed connection is a no-op.
    async fn close(&self) -> HarnessResult<()>;
}

/// A session: the unit that publishes and subscribes.
#[async_trait]
pub trait Session: Debug + Send + Sync {
    /// Looks up or creates the topic called `name`.
    async fn create_channel(&self, name: &str) -> HarnessResult<Channel>;

    /// Publishes `message` to every current subscriber of `channel`.
    ///
    /// `delivery_mode` is forwarded to the backend untouched.
    async fn publish(
        &self,
        channel: &Channel,
        message: Message,
        delivery_mode: DeliveryMode,
    ) -> HarnessResult<()>;

    /// Subscribes to `channel`. Messages published after this call returns are delivered.
    async fn subscribe(&self, channel: &Channel) -> HarnessResult<Subscription>;

    /// Closes the session, ending every subscription it opened.
    ///
    /// Closing an already closed session is a no-op.
    async fn close(&self) -> HarnessResult<()>;
}
