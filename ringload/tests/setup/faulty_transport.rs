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
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringload::prelude::*;

/// What goes wrong when publishing to a faulted channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Every `n`th publish reports success but is silently discarded.
    DropEvery(u64),
    /// Every publish fails with a transport error.
    RejectAll,
    /// Every publish waits forever.
    Stall,
}

#[derive(Debug)]
struct Fault {
    mode: FaultMode,
    publishes: AtomicU64,
    dropped: AtomicU64,
}

type Faults = Arc<HashMap<String, Fault>>;

/// Wraps a transport and injects faults into publishes, keyed by channel name.
///
/// Counters are shared by every connection and session opened through the
/// wrapper, so `DropEvery` counts across per-message connections too.
#[derive(Debug, Clone)]
pub struct FaultyTransport {
    inner: TransportRef,
    faults: Faults,
}

impl FaultyTransport {
    pub fn new(inner: TransportRef) -> Self {
        Self {
            inner,
            faults: Arc::new(HashMap::new()),
        }
    }

    /// Adds a fault. Call before the transport is shared.
    pub fn with_fault(mut self, channel: &str, mode: FaultMode) -> Self {
        if let Some(faults) = Arc::get_mut(&mut self.faults) {
            faults.insert(
                channel.to_string(),
                Fault {
                    mode,
                    publishes: AtomicU64::new(0),
                    dropped: AtomicU64::new(0),
                },
            );
        }
        self
    }

    /// Publish attempts made on `channel` so far, including failed ones.
    pub fn attempts(&self, channel: &str) -> u64 {
        self.faults
            .get(channel)
            .map_or(0, |fault| fault.publishes.load(Ordering::SeqCst))
    }

    /// Messages silently discarded on `channel` so far.
    pub fn dropped(&self, channel: &str) -> u64 {
        self.faults
            .get(channel)
            .map_or(0, |fault| fault.dropped.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Transport for FaultyTransport {
    async fn create_connection(&self) -> HarnessResult<Box<dyn Connection>> {
        Ok(Box::new(FaultyConnection {
            inner: self.inner.create_connection().await?,
            faults: self.faults.clone(),
        }))
    }
}

#[derive(Debug)]
struct FaultyConnection {
    inner: Box<dyn Connection>,
    faults: Faults,
}

#[async_trait]
impl Connection for FaultyConnection {
    async fn create_session(
        &self,
        transacted: bool,
        ack_mode: AckMode,
    ) -> HarnessResult<Box<dyn Session>> {
        Ok(Box::new(FaultySession {
            inner: self.inner.create_session(transacted, ack_mode).await?,
            faults: self.faults.clone(),
        }))
    }

    async fn close(&self) -> HarnessResult<()> {
        self.inner.close().await
    }
}

#[derive(Debug)]
struct FaultySession {
    inner: Box<dyn Session>,
    faults: Faults,
}

#[async_trait]
impl Session for FaultySession {
    async fn create_channel(&self, name: &str) -> HarnessResult<Channel> {
        self.inner.create_channel(name).await
    }

    async fn publish(
        &self,
        channel: &Channel,
        message: Message,
        delivery_mode: DeliveryMode,
    ) -> HarnessResult<()> {
        if let Some(fault) = self.faults.get(channel.name()) {
            let count = fault.publishes.fetch_add(1, Ordering::SeqCst) + 1;
            match fault.mode {
                FaultMode::DropEvery(n) => {
                    if count % n == 0 {
                        fault.dropped.fetch_add(1, Ordering::SeqCst);
                        return Ok(());
                    }
                }
                FaultMode::RejectAll => {
                    return Err(HarnessError::Transport {
                        channel: channel.name().to_string(),
                        reason: "injected fault".to_string(),
                    });
                }
                FaultMode::Stall => std::future::pending::<()>().await,
            }
        }
        self.inner.publish(channel, message, delivery_mode).await
    }

    async fn subscribe(&self, channel: &Channel) -> HarnessResult<Subscription> {
        self.inner.subscribe(channel).await
    }

    async fn close(&self) -> HarnessResult<()> {
        self.inner.close().await
    }
}
