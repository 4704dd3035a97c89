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

//! The controller at both ends of the pipeline.
//!
//! A started controller runs two tasks on independent sessions. The counting
//! task subscribes to the terminal channel before anything is injected and
//! counts arrivals. The injection task publishes every batch onto the entry
//! channel. The two share only the arrival counters and a `Notify`.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, trace, warn};

use crate::agent::consumer::Consumer;
use crate::agent::publisher::{PublishOutcome, Publisher};
use crate::agent::{AgentConfig, AgentState, RetryConfig};
use crate::common::config::{expected_total, CONFIG};
use crate::common::{AgentHandle, HarnessError, HarnessResult, TransportRef};
use crate::message::{DeliveryMode, Message};
use crate::traits::Channel;

/// Identifier used by the controller in logs and reports.
pub const CONTROLLER_ID: &str = "controller";

/// Injects batches into the entry channel and counts arrivals on the terminal channel.
///
/// Configure it with the chainable setters, then call [`Controller::start`].
///
/// ```no_run
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use ringload::prelude::*;
/// # async fn demo() -> ringload::HarnessResult<()> {
/// let broker = Arc::new(MemoryBroker::default());
/// let mut controller = Controller::new(broker);
/// controller
///     .set_batch_size(100)
///     .set_number_of_batches(2)
///     .set_start_destination(Channel::new("demo.start"))
///     .set_next_destination(Channel::new("demo.end"))
///     .set_timeout(Duration::from_secs(5));
/// let handle = controller.start().await?;
/// let received = handle.await_test_complete().await;
/// handle.stop().await?;
/// # let _ = received;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Controller {
    id: String,
    transport: TransportRef,
    batch_size: usize,
    number_of_batches: usize,
    delivery_mode: DeliveryMode,
    connection_per_message: bool,
    start_destination: Option<Channel>,
    next_destination: Option<Channel>,
    timeout: Duration,
    retry: RetryConfig,
}

impl Controller {
    /// Creates a controller with no destinations and an unbounded timeout.
    pub fn new(transport: TransportRef) -> Self {
        Self {
            id: CONTROLLER_ID.to_string(),
            transport,
            batch_size: 0,
            number_of_batches: 0,
            delivery_mode: DeliveryMode::default(),
            connection_per_message: false,
            start_destination: None,
            next_destination: None,
            timeout: Duration::MAX,
            retry: CONFIG.retry.clone(),
        }
    }

    /// Creates a controller wired from a pipeline's controller configuration:
    /// it publishes to the config's output channel and counts on its input channel.
    pub fn from_config(config: &AgentConfig, transport: TransportRef) -> Self {
        let mut controller = Self::new(transport);
        controller.id = config.id().to_string();
        controller
            .set_start_destination(config.output_channel().clone())
            .set_next_destination(config.input_channel().clone())
            .set_delivery_mode(config.delivery_mode())
            .set_connection_per_message(config.connection_per_message())
            .set_timeout(config.timeout())
            .set_retry(config.retry().clone());
        controller
    }

    /// Messages per batch.
    pub fn set_batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.batch_size = batch_size;
        self
    }

    /// Number of batches to inject.
    pub fn set_number_of_batches(&mut self, number_of_batches: usize) -> &mut Self {
        self.number_of_batches = number_of_batches;
        self
    }

    /// Delivery mode of every injected message.
    pub fn set_delivery_mode(&mut self, delivery_mode: DeliveryMode) -> &mut Self {
        self.delivery_mode = delivery_mode;
        self
    }

    /// Opens and closes a connection around every injected message when `enabled`.
    pub fn set_connection_per_message(&mut self, enabled: bool) -> &mut Self {
        self.connection_per_message = enabled;
        self
    }

    /// The entry channel injection publishes to.
    pub fn set_start_destination(&mut self, channel: Channel) -> &mut Self {
        self.start_destination = Some(channel);
        self
    }

    /// The terminal channel arrivals are counted on.
    pub fn set_next_destination(&mut self, channel: Channel) -> &mut Self {
        self.next_destination = Some(channel);
        self
    }

    /// Bounds [`ControllerHandle::await_test_complete`] and the retry budget
    /// of each injected message. `Duration::MAX` waits forever.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Backoff between injection retries.
    pub fn set_retry(&mut self, retry: RetryConfig) -> &mut Self {
        self.retry = retry;
        self
    }

    /// Validates the configuration, subscribes to the terminal channel and
    /// starts injecting.
    ///
    /// # Errors
    ///
    /// * [`HarnessError::Configuration`] if a destination is missing, a batch
    ///   parameter is zero or the expected total overflows.
    /// * [`HarnessError::Transport`] if the counting subscription or the
    ///   injection publisher cannot be opened.
    #[instrument(skip(self), fields(controller = %self.id))]
    pub async fn start(self) -> HarnessResult<ControllerHandle> {
        let entry = self
            .start_destination
            .clone()
            .ok_or_else(|| HarnessError::configuration("controller has no start destination"))?;
        let terminal = self
            .next_destination
            .clone()
            .ok_or_else(|| HarnessError::configuration("controller has no next destination"))?;
        if self.batch_size == 0 {
            return Err(HarnessError::configuration("batch_size must be > 0"));
        }
        if self.number_of_batches == 0 {
            return Err(HarnessError::configuration("number_of_batches must be > 0"));
        }
        let expected = expected_total(self.batch_size, self.number_of_batches)?;

        let consumer = Consumer::open(&self.transport, &terminal).await?;
        let publisher_config = AgentConfig::new(self.id.clone(), terminal, entry)
            .with_delivery_mode(self.delivery_mode)
            .with_connection_per_message(self.connection_per_message)
            .with_timeout(self.timeout)
            .with_retry(self.retry.clone());
        let publisher = match Publisher::open(self.transport.clone(), &publisher_config).await {
            Ok(publisher) => publisher,
            Err(e) => {
                let _ = consumer.close().await;
                return Err(e);
            }
        };

        let handle = AgentHandle::new(&self.id);
        let progress = Arc::new(Progress::new(expected));
        handle.state.advance(AgentState::Running);
        info!(
            expected,
            batches = self.number_of_batches,
            batch_size = self.batch_size,
            "Controller running"
        );

        handle.spawn(count_arrivals(
            consumer,
            progress.clone(),
            handle.cancellation_token.clone(),
        ));
        handle.spawn(inject(
            publisher,
            self.batch_size,
            self.number_of_batches,
            handle.clone(),
        ));

        Ok(ControllerHandle {
            handle,
            progress,
            timeout: self.timeout,
        })
    }
}

/// Arrival counters shared by the counting task and the handle.
#[derive(Debug)]
struct Progress {
    expected: u64,
    received: AtomicU64,
    latency_total_micros: AtomicU64,
    latency_max_micros: AtomicU64,
    /// Set once the counting task has exited; no more arrivals can be recorded.
    counting_done: AtomicBool,
    notify: Notify,
}

impl Progress {
    fn new(expected: u64) -> Self {
        Self {
            expected,
            received: AtomicU64::new(0),
            latency_total_micros: AtomicU64::new(0),
            latency_max_micros: AtomicU64::new(0),
            counting_done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }

    fn record(&self, message: &Message) -> u64 {
        let latency = u64::try_from(message.age().as_micros()).unwrap_or(u64::MAX);
        self.latency_total_micros.fetch_add(latency, Ordering::Relaxed);
        self.latency_max_micros.fetch_max(latency, Ordering::Relaxed);
        self.received.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn is_settled(&self) -> bool {
        self.received() >= self.expected || self.counting_done.load(Ordering::Acquire)
    }
}

async fn count_arrivals(mut consumer: Consumer, progress: Arc<Progress>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = consumer.next() => match next {
                Some(message) => {
                    let received = progress.record(&message);
                    trace!(received, "Arrival");
                    if received == progress.expected {
                        info!(received, "Every expected message arrived");
                        progress.notify.notify_waiters();
                    }
                }
                None => {
                    warn!("Terminal channel closed");
                    break;
                }
            },
        }
    }
    progress.counting_done.store(true, Ordering::Release);
    progress.notify.notify_waiters();
    if let Err(e) = consumer.close().await {
        warn!("Failed to close counting session: {e}");
    }
}

async fn inject(
    mut publisher: Publisher,
    batch_size: usize,
    number_of_batches: usize,
    handle: AgentHandle,
) {
    let cancel = handle.cancellation_token.clone();
    'batches: for batch in 0..number_of_batches {
        for index in 0..batch_size {
            if cancel.is_cancelled() {
                break 'batches;
            }
            match publisher.publish(Message::for_batch(batch, index), &cancel).await {
                Ok(PublishOutcome::Delivered) => {
                    handle.processed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(PublishOutcome::Cancelled) => break 'batches,
                Err(e) => {
                    error!(batch, index, "Injection failed: {e}");
                    handle.state.advance(AgentState::Failed);
                    break 'batches;
                }
            }
        }
        info!(batch, injected = handle.processed(), "Batch injected");
    }
    if let Err(e) = publisher.close().await {
        warn!("Failed to close injection session: {e}");
    }
}

/// A started [`Controller`].
///
/// Dereferences to its [`AgentHandle`] for `id`, `state`, `processed` (messages
/// injected) and `stop`.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    handle: AgentHandle,
    progress: Arc<Progress>,
    timeout: Duration,
}

impl Deref for ControllerHandle {
    type Target = AgentHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl ControllerHandle {
    /// Overrides how long [`AgentHandle::stop`] waits for the controller's tasks.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.handle = self.handle.with_shutdown_timeout(timeout);
        self
    }

    /// Waits until every expected message has arrived or the timeout elapses,
    /// and returns the number of arrivals.
    ///
    /// The timeout is measured from this call. Reaching it is not an error: the
    /// partial count is returned. The wait also ends early if the terminal
    /// channel closes, since nothing more can arrive.
    #[instrument(skip(self), fields(controller = %self.handle.id()))]
    pub async fn await_test_complete(&self) -> u64 {
        let deadline = tokio::time::Instant::now().checked_add(self.timeout);
        loop {
            let notified = self.progress.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.progress.is_settled() {
                return self.progress.received();
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        let received = self.progress.received();
                        warn!(
                            received,
                            expected = self.progress.expected,
                            "Timed out waiting for arrivals"
                        );
                        return received;
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Total the run must deliver: batch size times number of batches.
    #[must_use]
    pub fn expected(&self) -> u64 {
        self.progress.expected
    }

    /// Arrivals counted so far.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.progress.received()
    }

    /// Mean injection-to-arrival latency, `None` before the first arrival.
    #[must_use]
    pub fn mean_latency(&self) -> Option<Duration> {
        let received = self.progress.received();
        (received > 0).then(|| {
            Duration::from_micros(
                self.progress.latency_total_micros.load(Ordering::Relaxed) / received,
            )
        })
    }

    /// Largest injection-to-arrival latency seen.
    #[must_use]
    pub fn max_latency(&self) -> Duration {
        Duration::from_micros(self.progress.latency_max_micros.load(Ordering::Relaxed))
    }
}
