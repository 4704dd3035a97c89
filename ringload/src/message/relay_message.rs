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
use std::time::{Duration, Instant};

use crate::message::DeliveryMode;

/// A message travelling through the ring.
///
/// The payload is opaque to every agent. Cloning is cheap (the payload is
/// reference counted), which keeps fan-out in the broker and republishing in
/// relays allocation free.
///
/// `created_at` is stamped once by the controller and carried unchanged by
/// every hop, so the controller can compute end-to-end latency on arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Arc<[u8]>,
    delivery_mode: DeliveryMode,
    created_at: Instant,
}

impl Message {
    /// Creates a message with the given payload and the default delivery mode.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: Arc::from(payload.into()),
            delivery_mode: DeliveryMode::default(),
            created_at: Instant::now(),
        }
    }

    /// Builds the payload the controller injects for message `index` of batch `batch`.
    #[must_use]
    pub fn for_batch(batch: usize, index: usize) -> Self {
        Self::new(format!("batch-{batch}-message-{index}"))
    }

    /// The raw payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as UTF-8, if it is valid UTF-8.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Delivery mode recorded by the last publish.
    #[inline]
    #[must_use]
    pub const fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    /// Time elapsed since the controller created this message.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Returns the message stamped with `mode`. Transports call this on publish.
    #[must_use]
    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }
}
