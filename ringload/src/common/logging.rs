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

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::common::config::TracingConfig;

/// Installs the global tracing subscriber described by `config`.
///
/// `RUST_LOG`, when set, overrides `config.filter`. Output goes through a
/// non-blocking writer to a daily rolling file under `config.log_directory`,
/// or to stdout when `config.stdout` is set. Keep the returned guard alive
/// for as long as the process logs; dropping it flushes and stops the writer.
///
/// # Errors
///
/// Fails if the filter does not parse, the log directory cannot be created, or
/// a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> anyhow::Result<WorkerGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .with_context(|| format!("invalid tracing filter {:?}", config.filter))?,
    };

    let (writer, guard) = if config.stdout {
        tracing_appender::non_blocking(std::io::stdout())
    } else {
        std::fs::create_dir_all(&config.log_directory)
            .with_context(|| format!("could not create log directory {}", config.log_directory))?;
        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_directory, &config.log_file);
        tracing_appender::non_blocking(file_appender)
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NONE)
        .with_writer(writer)
        .with_ansi(config.stdout)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("a global tracing subscriber is already installed")?;
    Ok(guard)
}
