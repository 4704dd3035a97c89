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
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use ringload::{init_tracing, HarnessConfig, LoadTestRun, MemoryBroker};
use tracing::info;

const USAGE: &str = "usage: ringload [CONFIG_FILE]";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let mut args = std::env::args().skip(1);
    let config = match (args.next(), args.next()) {
        (None, _) => HarnessConfig::load(),
        (Some(flag), None) if flag == "-h" || flag == "--help" => {
            println!("{USAGE}");
            return Ok(ExitCode::SUCCESS);
        }
        (Some(path), None) => HarnessConfig::load_from(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        (Some(_), Some(_)) => anyhow::bail!(USAGE),
    };

    let _guard = init_tracing(&config.tracing)?;
    info!("** ringload startup **");

    let broker = MemoryBroker::new(config.limits.subscription_capacity);
    let report = LoadTestRun::from_config(Arc::new(broker.clone()), &config)
        .execute()
        .await?;
    broker.shutdown();

    println!("{report}");
    for error in &report.teardown_errors {
        eprintln!("teardown: {error}");
    }
    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
