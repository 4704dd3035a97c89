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
use std::sync::Once;
use std::time::Duration;

use anyhow::{anyhow, Context};
use futures::StreamExt;
use ringload::prelude::*;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub use faulty_transport::{FaultMode, FaultyTransport};

pub mod faulty_transport;

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// How long a test waits for something that should happen promptly.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Initializes the global tracing subscriber for tests, writing to
/// `logs/ringload_tests.txt`. Per-message `trace!` events are filtered out so
/// large runs stay fast.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "ringload_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("info")
            .add_directive("ringload=debug".parse().unwrap())
            .add_directive("ringload::common::memory_broker=info".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::DEBUG)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// Backoff short enough for retry tests to finish quickly.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        initial_backoff_ms: 5,
        max_backoff_ms: 20,
        backoff_multiplier: 2.0,
    }
}

/// Opens a connection and session on `transport`, the way a test driver would.
pub async fn open_session(
    transport: &dyn Transport,
) -> anyhow::Result<(Box<dyn Connection>, Box<dyn Session>)> {
    let connection = transport.create_connection().await?;
    let session = connection.create_session(false, AckMode::Auto).await?;
    Ok((connection, session))
}

/// Next message on `subscription`, failing the test if none arrives in time.
pub async fn receive(subscription: &mut Subscription) -> anyhow::Result<Message> {
    tokio::time::timeout(PATIENCE, subscription.next())
        .await
        .context("timed out waiting for a message")?
        .ok_or_else(|| anyhow!("subscription ended"))
}

/// Polls `condition` until it holds, failing after [`PATIENCE`].
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow!("timed out waiting for {what}"));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

/// Waits until `handle` reaches `state`.
pub async fn wait_for_state(handle: &AgentHandle, state: AgentState) -> anyhow::Result<()> {
    eventually(&format!("{} to become {state}", handle.id()), || {
        handle.state() == state
    })
    .await
}
