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

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{instrument, trace};

use crate::common::config::CONFIG;
use crate::common::{HarnessError, HarnessResult};
use crate::message::{AckMode, DeliveryMode, Message};
use crate::traits::{Channel, Connection, Session, Subscription, Transport};

/// An in-process publish/subscribe backend.
///
/// Topics fan out: every live subscription on a topic receives its own copy of
/// each message. A message published to a topic with no subscribers is
/// discarded. Each subscription is a bounded queue, so a slow consumer applies
/// backpressure to its publishers.
///
/// Closing a session removes its subscriptions and ends their streams once
/// drained. [`MemoryBroker::shutdown`] does the same for every topic. Any
/// operation on a closed session or connection, or on a broker that has been
/// shut down, fails with [`HarnessError::Transport`].
///
/// `MemoryBroker` is cheap to clone; clones share the same topics.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Debug)]
struct BrokerInner {
    topics: DashMap<String, Vec<Subscriber>>,
    capacity: usize,
    next_id: AtomicU64,
    connections_opened: AtomicU64,
    open_connections: AtomicUsize,
    published: AtomicU64,
    shut_down: AtomicBool,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    session: u64,
    sender: mpsc::Sender<Message>,
}

impl Default for MemoryBroker {
    /// A broker whose subscription queues hold `limits.subscription_capacity` messages.
    fn default() -> Self {
        Self::new(CONFIG.limits.subscription_capacity)
    }
}

impl MemoryBroker {
    /// Creates a broker whose subscription queues hold `capacity` messages (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: DashMap::new(),
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                connections_opened: AtomicU64::new(0),
                open_connections: AtomicUsize::new(0),
                published: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Closes every topic. Subscription streams end once drained, and every
    /// later operation fails.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        self.inner.topics.clear();
        trace!("Memory broker shut down");
    }

    /// Connections created over the broker's lifetime.
    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.inner.connections_opened.load(Ordering::Relaxed)
    }

    /// Connections created and not yet closed.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::Acquire)
    }

    /// Successful publish calls, whether or not anyone was subscribed.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Live subscriptions on the topic `name`.
    #[must_use]
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner.topics.get(name).map_or(0, |subscribers| subscribers.len())
    }

    /// Whether a topic called `name` has been created.
    #[must_use]
    pub fn has_channel(&self, name: &str) -> bool {
        self.inner.topics.contains_key(name)
    }
}

impl BrokerInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn remove_session(&self, session: u64) {
        for mut topic in self.topics.iter_mut() {
            topic.retain(|subscriber| subscriber.session != session);
        }
    }

    fn remove_subscribers(&self, topic: &str, ids: &[u64]) {
        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            subscribers.retain(|subscriber| !ids.contains(&subscriber.id));
        }
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn create_connection(&self) -> HarnessResult<Box<dyn Connection>> {
        if self.inner.is_shut_down() {
            return Err(HarnessError::transport("<connection>", "broker is shut down"));
        }
        self.inner.connections_opened.fetch_add(1, Ordering::Relaxed);
        self.inner.open_connections.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemoryConnection {
            broker: self.inner.clone(),
            id: self.inner.next_id(),
            closed: AtomicBool::new(false),
            sessions: DashMap::new(),
        }))
    }
}

#[derive(Debug)]
struct MemoryConnection {
    broker: Arc<BrokerInner>,
    id: u64,
    closed: AtomicBool,
    sessions: DashMap<u64, Arc<SessionState>>,
}

#[derive(Debug)]
struct SessionState {
    id: u64,
    closed: AtomicBool,
    connection_closed: AtomicBool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn create_session(
        &self,
        transacted: bool,
        ack_mode: AckMode,
    ) -> HarnessResult<Box<dyn Session>> {
        if self.closed.load(Ordering::Acquire) || self.broker.is_shut_down() {
            return Err(HarnessError::transport(
                "<session>",
                format!("connection {} is closed", self.id),
            ));
        }
        let state = Arc::new(SessionState {
            id: self.broker.next_id(),
            closed: AtomicBool::new(false),
            connection_closed: AtomicBool::new(false),
        });
        self.sessions.insert(state.id, state.clone());
        trace!(connection = self.id, session = state.id, transacted, ?ack_mode, "Session created");
        Ok(Box::new(MemorySession {
            broker: self.broker.clone(),
            state,
        }))
    }

    async fn close(&self) -> HarnessResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        for session in self.sessions.iter() {
            session.connection_closed.store(true, Ordering::Release);
            session.closed.store(true, Ordering::Release);
            self.broker.remove_session(session.id);
        }
        self.sessions.clear();
        self.broker.open_connections.fetch_sub(1, Ordering::AcqRel);
        trace!(connection = self.id, "Connection closed");
        Ok(())
    }
}

#[derive(Debug)]
struct MemorySession {
    broker: Arc<BrokerInner>,
    state: Arc<SessionState>,
}

impl MemorySession {
    fn ensure_open(&self, channel: &str) -> HarnessResult<()> {
        if self.broker.is_shut_down() {
            Err(HarnessError::transport(channel, "broker is shut down"))
        } else if self.state.connection_closed.load(Ordering::Acquire) {
            Err(HarnessError::transport(channel, "connection is closed"))
        } else if self.state.closed.load(Ordering::Acquire) {
            Err(HarnessError::transport(channel, "session is closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn create_channel(&self, name: &str) -> HarnessResult<Channel> {
        self.ensure_open(name)?;
        self.broker.topics.entry(name.to_string()).or_default();
        Ok(Channel::new(name))
    }

    async fn publish(
        &self,
        channel: &Channel,
        message: Message,
        delivery_mode: DeliveryMode,
    ) -> HarnessResult<()> {
        self.ensure_open(channel.name())?;
        let message = message.with_delivery_mode(delivery_mode);

        // Clone the senders out so no map guard is held while sending.
        let senders: Vec<(u64, mpsc::Sender<Message>)> = match self.broker.topics.get(channel.name()) {
            Some(subscribers) => subscribers
                .iter()
                .map(|subscriber| (subscriber.id, subscriber.sender.clone()))
                .collect(),
            None => Vec::new(),
        };
        self.broker.published.fetch_add(1, Ordering::Relaxed);
        if senders.is_empty() {
            trace!(channel = %channel, "No subscribers, message discarded");
            return Ok(());
        }

        let sends = senders.into_iter().map(|(id, sender)| {
            let message = message.clone();
            async move { sender.send(message).await.map_err(|_| id) }
        });
        let gone: Vec<u64> = join_all(sends)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();
        if !gone.is_empty() {
            trace!(channel = %channel, count = gone.len(), "Pruning dropped subscriptions");
            self.broker.remove_subscribers(channel.name(), &gone);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &Channel) -> HarnessResult<Subscription> {
        self.ensure_open(channel.name())?;
        let (sender, receiver) = mpsc::channel(self.broker.capacity);
        self.broker
            .topics
            .entry(channel.name().to_string())
            .or_default()
            .push(Subscriber {
                id: self.broker.next_id(),
                session: self.state.id,
                sender,
            });
        trace!(channel = %channel, session = self.state.id, "Subscribed");
        Ok(futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|message| (message, receiver))
        })
        .boxed())
    }

    async fn close(&self) -> HarnessResult<()> {
        if !self.state.closed.swap(true, Ordering::AcqRel) {
            self.broker.remove_session(self.state.id);
            trace!(session = self.state.id, "Session closed");
        }
        Ok(())
    }
}
