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
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use ringload::prelude::*;
use ringload_test::prelude::*;

use crate::setup::{eventually, initialize_tracing, FaultMode, FaultyTransport};

mod setup;

fn run_config(run_id: &str, clients: i64, batch_size: usize, batches: usize) -> LoadTestConfig {
    LoadTestConfig {
        number_of_clients: clients,
        batch_size,
        number_of_batches: batches,
        timeout_ms: Some(30_000),
        channel_prefix: "it".to_string(),
        run_id: Some(run_id.to_string()),
        ..LoadTestConfig::default()
    }
}

/// Output channel of relay `client-{index}` for a run built by [`run_config`].
fn hop(run_id: &str, index: usize) -> String {
    format!("it.{run_id}.client.{}", index + 1)
}

/// Five relays, ten batches of twenty, nothing lost.
#[ringload_test]
async fn test_lossless_run_passes() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new(1024);
    let run = LoadTestRun::new(Arc::new(broker.clone()), run_config("lossless", 5, 20, 10));

    let report = run.execute().await?;
    assert_eq!(report.run_id, "lossless");
    assert_eq!(report.expected, 200);
    assert_eq!(report.received, 200);
    assert!(report.passed());
    report.ensure_passed()?;
    assert!(report.failed_agents.is_empty());
    assert!(report.teardown_errors.is_empty());
    assert!(report.mean_latency.is_some());

    assert!(broker.has_channel("it.lossless.start"));
    assert!(broker.has_channel("it.lossless.end"));
    assert_eq!(broker.open_connections(), 0);
    Ok(())
}

/// With no relays the controller's own injections are counted.
#[ringload_test]
async fn test_run_without_relays_passes() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new(1024);
    let run = LoadTestRun::new(Arc::new(broker.clone()), run_config("empty", 0, 5, 2));

    let report = run.execute().await?;
    assert_eq!(report.received, 10);
    assert!(report.passed());
    assert!(!broker.has_channel("it.empty.end"));
    assert_eq!(broker.open_connections(), 0);
    Ok(())
}

/// Invalid parameters are rejected before a single connection is opened.
#[ringload_test]
async fn test_invalid_run_is_rejected_before_starting() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new(8);

    let negative = LoadTestRun::new(Arc::new(broker.clone()), run_config("neg", -1, 1, 1));
    assert!(matches!(
        negative.execute().await,
        Err(HarnessError::Configuration(_))
    ));

    let empty = LoadTestRun::new(Arc::new(broker.clone()), run_config("zero", 1, 0, 1));
    assert!(matches!(
        empty.execute().await,
        Err(HarnessError::Configuration(_))
    ));

    assert_eq!(broker.connections_opened(), 0);
    Ok(())
}

/// Fifty relays, ten batches of a thousand, one hop silently dropping every
/// hundredth message: the run times out with exactly 9,900 arrivals.
#[ringload_test]
async fn test_lossy_hop_is_reported_as_shortfall() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new(1024);
    let lossy = FaultyTransport::new(Arc::new(broker.clone()))
        .with_fault(&hop("lossy", 24), FaultMode::DropEvery(100));
    let config = LoadTestConfig {
        timeout_ms: Some(15_000),
        ..run_config("lossy", 50, 1000, 10)
    };
    let run = LoadTestRun::new(Arc::new(lossy.clone()), config);

    let report = run.execute().await?;
    assert_eq!(lossy.dropped(&hop("lossy", 24)), 100);
    assert_eq!(report.expected, 10_000);
    assert_eq!(report.received, 9_900);
    assert_eq!(report.shortfall(), 100);
    assert!(!report.passed());
    assert!(report.failed_agents.is_empty());
    match report.ensure_passed() {
        Err(HarnessError::Incomplete { expected, received }) => {
            assert_eq!((expected, received), (10_000, 9_900));
        }
        other => panic!("expected an incomplete run, got {other:?}"),
    }
    assert_eq!(broker.open_connections(), 0);
    Ok(())
}

/// The same loss on a short ring, with a short timeout.
#[ringload_test]
async fn test_small_lossy_ring_counts_survivors() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new(1024);
    let lossy = FaultyTransport::new(Arc::new(broker))
        .with_fault(&hop("small", 2), FaultMode::DropEvery(100));
    let config = LoadTestConfig {
        timeout_ms: Some(2_000),
        ..run_config("small", 5, 100, 10)
    };

    let report = LoadTestRun::new(Arc::new(lossy), config).execute().await?;
    assert_eq!(report.received, 990);
    assert_eq!(report.shortfall(), 10);
    assert!(report.to_string().contains("FAIL"));
    Ok(())
}

/// A relay that cannot publish is reported as failed, and teardown still
/// releases every connection.
#[ringload_test]
async fn test_failed_relay_is_reported() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new(1024);
    let rejecting = FaultyTransport::new(Arc::new(broker.clone()))
        .with_fault(&hop("reject", 1), FaultMode::RejectAll);
    let config = LoadTestConfig {
        timeout_ms: Some(1_000),
        ..run_config("reject", 3, 10, 1)
    };

    let report = LoadTestRun::new(Arc::new(rejecting), config).execute().await?;
    assert_eq!(report.received, 0);
    assert_eq!(report.failed_agents, ["client-1"]);
    assert!(report.teardown_errors.is_empty());
    assert_eq!(broker.open_connections(), 0);
    Ok(())
}

/// Retry settings from an explicit configuration reach every agent: a first
/// backoff longer than the whole budget means a single attempt, then failure.
#[ringload_test]
async fn test_configured_retry_reaches_relays() -> anyhow::Result<()> {
    initialize_tracing();
    let config = HarnessConfig::from_toml_str(
        r#"
        [run]
        number_of_clients = 3
        batch_size = 10
        number_of_batches = 1
        timeout_ms = 1000
        channel_prefix = "it"
        run_id = "tuned"

        [retry]
        initial_backoff_ms = 5000
        max_backoff_ms = 5000
        "#,
    )?;
    let broker = MemoryBroker::new(1024);
    let rejecting = FaultyTransport::new(Arc::new(broker.clone()))
        .with_fault(&hop("tuned", 1), FaultMode::RejectAll);

    let report = LoadTestRun::from_config(Arc::new(rejecting.clone()), &config)
        .execute()
        .await?;
    assert_eq!(rejecting.attempts(&hop("tuned", 1)), 1);
    assert_eq!(report.failed_agents, ["client-1"]);
    assert_eq!(broker.open_connections(), 0);
    Ok(())
}

/// A relay stuck in a publish that never returns holds up the agents feeding it
/// through backpressure. Teardown reports exactly those, in pipeline order,
/// waits one configured shutdown timeout rather than one per agent, and still
/// stops the relays downstream of the stall.
#[ringload_test]
async fn test_stalled_relay_is_reported_at_teardown() -> anyhow::Result<()> {
    initialize_tracing();
    let config = HarnessConfig::from_toml_str(
        r#"
        [run]
        number_of_clients = 4
        batch_size = 50
        number_of_batches = 1
        timeout_ms = 300
        channel_prefix = "it"
        run_id = "stall"

        [timeouts]
        agent_shutdown_timeout_ms = 500
        "#,
    )?;
    let broker = MemoryBroker::new(4);
    let stalling = FaultyTransport::new(Arc::new(broker.clone()))
        .with_fault(&hop("stall", 1), FaultMode::Stall);

    let started = Instant::now();
    let report = LoadTestRun::from_config(Arc::new(stalling), &config)
        .execute()
        .await?;
    assert!(started.elapsed() < Duration::from_millis(1200));
    assert_eq!(report.received, 0);

    let mut stuck = Vec::new();
    for error in &report.teardown_errors {
        match error {
            HarnessError::Teardown { agent, reason } => {
                assert!(reason.contains("500ms"), "{reason}");
                stuck.push(agent.as_str());
            }
            other => panic!("expected a teardown error, got {other:?}"),
        }
    }
    assert_eq!(stuck, ["controller", "client-0", "client-1"]);
    assert!(report.to_string().contains("3 teardown error(s)"));
    Ok(())
}

/// Dropping a run part way through cancels every agent it started, and each
/// releases its connections. Only the abandoned management connection remains.
#[ringload_test]
async fn test_dropped_run_cancels_its_agents() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new(1024);
    let lossy = FaultyTransport::new(Arc::new(broker.clone()))
        .with_fault(&hop("abandon", 1), FaultMode::DropEvery(2));
    let config = LoadTestConfig {
        timeout_ms: None,
        ..run_config("abandon", 3, 10, 1)
    };
    let run = LoadTestRun::new(Arc::new(lossy), config);

    let abandoned = tokio::time::timeout(Duration::from_millis(300), run.execute()).await;
    assert!(abandoned.is_err());
    // Three relays and the controller hold two connections each.
    assert!(broker.connections_opened() >= 9);
    eventually("agents to release their connections", || {
        broker.open_connections() == 1
    })
    .await?;
    Ok(())
}
