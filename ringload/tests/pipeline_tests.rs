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
use std::time::Duration;

use futures::future::join_all;
use ringload::prelude::*;
use ringload_test::prelude::*;

use crate::setup::{initialize_tracing, open_session, receive};

mod setup;

/// Starts every relay of `pipeline`, then the controller, and collects the
/// payloads seen on the terminal channel by an extra observer.
async fn drive(
    broker: &MemoryBroker,
    pipeline: &Pipeline,
    batch_size: usize,
    number_of_batches: usize,
) -> anyhow::Result<(u64, Vec<String>, Vec<AgentHandle>)> {
    let transport: TransportRef = Arc::new(broker.clone());
    let (connection, session) = open_session(broker).await?;
    for channel in pipeline.topology.channels() {
        session.create_channel(channel.name()).await?;
    }
    let mut observer = session.subscribe(pipeline.topology.terminal()).await?;

    let mut relays = Vec::new();
    for config in &pipeline.clients {
        relays.push(RelayAgent::new(config.clone(), transport.clone()).start().await?);
    }

    let mut controller = Controller::from_config(&pipeline.controller, transport);
    controller
        .set_batch_size(batch_size)
        .set_number_of_batches(number_of_batches)
        .set_timeout(Duration::from_secs(30));
    let handle = controller.start().await?;
    let received = handle.await_test_complete().await;

    let mut payloads = Vec::new();
    for _ in 0..received {
        let message = receive(&mut observer).await?;
        payloads.push(message.text().unwrap_or_default().to_string());
    }

    handle.stop().await?;
    for result in join_all(relays.iter().map(AgentHandle::stop)).await {
        result?;
    }
    session.close().await?;
    connection.close().await?;
    Ok((received, payloads, relays))
}

/// Three relays, one batch of two: entry -> client 0 -> client 1 -> client 2 ->
/// terminal, and every hop relays both messages.
#[ringload_test]
async fn test_three_client_ring_relays_every_message() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new(16);
    let pipeline = PipelineBuilder::new(3)?
        .with_naming(RunScopedNaming::new("ring", "three"))
        .build();

    let names: Vec<&str> = pipeline
        .topology
        .channels()
        .iter()
        .map(Channel::name)
        .collect();
    assert_eq!(
        names,
        ["ring.three.start", "ring.three.client.1", "ring.three.client.2", "ring.three.end"]
    );

    let (received, mut payloads, relays) = drive(&broker, &pipeline, 2, 1).await?;
    assert_eq!(received, 2);
    payloads.sort();
    assert_eq!(payloads, ["batch-0-message-0", "batch-0-message-1"]);
    for relay in &relays {
        assert_eq!(relay.processed(), 2, "{} relayed", relay.id());
        assert_eq!(relay.state(), AgentState::Stopped);
    }
    Ok(())
}

/// Connection-per-message changes connection churn, never the delivered payloads.
#[ringload_test]
async fn test_connection_per_message_preserves_payloads() -> anyhow::Result<()> {
    initialize_tracing();

    let shared_broker = MemoryBroker::new(256);
    let shared = PipelineBuilder::new(4)?
        .with_naming(RunScopedNaming::new("churn", "shared"))
        .build();
    let (shared_received, mut shared_payloads, _) = drive(&shared_broker, &shared, 25, 4).await?;

    let churn_broker = MemoryBroker::new(256);
    let churn = PipelineBuilder::new(4)?
        .with_naming(RunScopedNaming::new("churn", "per-message"))
        .with_connection_per_message(true)
        .build();
    let (churn_received, mut churn_payloads, _) = drive(&churn_broker, &churn, 25, 4).await?;

    assert_eq!(shared_received, 100);
    assert_eq!(churn_received, 100);
    shared_payloads.sort();
    churn_payloads.sort();
    assert_eq!(shared_payloads, churn_payloads);

    // Four relays and the controller each publish 100 messages.
    assert!(churn_broker.connections_opened() >= 500);
    assert!(shared_broker.connections_opened() < 20);
    assert_eq!(churn_broker.open_connections(), 0);
    Ok(())
}

/// A run id scopes every channel, so two pipelines never share one.
#[ringload_test]
async fn test_distinct_runs_use_distinct_channels() -> anyhow::Result<()> {
    let first = PipelineBuilder::new(2)?.build();
    let second = PipelineBuilder::new(2)?.build();
    for channel in first.topology.channels() {
        assert!(!second.topology.channels().contains(channel));
    }
    Ok(())
}
