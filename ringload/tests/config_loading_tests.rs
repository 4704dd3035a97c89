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

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use ringload::prelude::*;
use tempfile::TempDir;

// XDG_CONFIG_HOME is process-wide; tests that change it take turns.
static XDG_ENV: Mutex<()> = Mutex::new(());

fn with_config_home<T>(contents: Option<&str>, body: impl FnOnce(&Path) -> T) -> T {
    let _guard = XDG_ENV.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let home = TempDir::new().expect("temp dir");
    if let Some(contents) = contents {
        let dir = home.path().join("ringload");
        fs::create_dir_all(&dir).expect("config dir");
        fs::write(dir.join("config.toml"), contents).expect("config file");
    }
    let previous = std::env::var_os("XDG_CONFIG_HOME");
    std::env::set_var("XDG_CONFIG_HOME", home.path());
    let result = body(home.path());
    match previous {
        Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }
    result
}

#[test]
fn test_config_file_overrides_defaults() {
    let config = with_config_home(
        Some(
            r#"
            [run]
            number_of_clients = 7
            delivery_mode = "non_persistent"
            batch_size = 25
            timeout_ms = 2500
            run_id = "fixed"

            [timeouts]
            agent_shutdown_timeout_ms = 250

            [retry]
            initial_backoff_ms = 1
            "#,
        ),
        |_| HarnessConfig::load(),
    );

    assert_eq!(config.run.number_of_clients, 7);
    assert_eq!(config.run.delivery_mode, DeliveryMode::NonPersistent);
    assert_eq!(config.run.batch_size, 25);
    assert_eq!(config.run.number_of_batches, 10);
    assert_eq!(config.run.timeout(), Duration::from_millis(2500));
    assert_eq!(config.run.run_id.as_deref(), Some("fixed"));
    assert_eq!(config.agent_shutdown_timeout(), Duration::from_millis(250));
    assert_eq!(config.retry.initial_backoff_ms, 1);
    assert_eq!(config.retry.max_backoff_ms, RetryConfig::default().max_backoff_ms);
    assert_eq!(config.run.validate().ok(), Some(250));
}

#[test]
fn test_missing_config_file_yields_defaults() {
    let config = with_config_home(None, |_| HarnessConfig::load());
    assert_eq!(config.run.number_of_clients, 50);
    assert_eq!(config.run.batch_size, 1000);
    assert_eq!(config.run.number_of_batches, 10);
    assert_eq!(config.run.timeout(), Duration::MAX);
    assert_eq!(config.run.delivery_mode, DeliveryMode::Persistent);
}

#[test]
fn test_malformed_config_file_falls_back_to_defaults() {
    let config = with_config_home(Some("[run\nnumber_of_clients = ="), |_| HarnessConfig::load());
    assert_eq!(config.run.number_of_clients, 50);
    assert_eq!(config.limits.subscription_capacity, 1024);
}

#[test]
fn test_explicit_path_is_strict() {
    with_config_home(Some("[run]\nbatch_size = \"many\""), |home| {
        let malformed = HarnessConfig::load_from(home.join("ringload").join("config.toml"));
        assert!(matches!(malformed, Err(HarnessError::Configuration(_))));

        let missing = HarnessConfig::load_from(home.join("absent.toml"));
        assert!(matches!(missing, Err(HarnessError::Configuration(_))));
    });
}

#[test]
fn test_partial_documents_parse() -> anyhow::Result<()> {
    let config = HarnessConfig::from_toml_str("[tracing]\nstdout = true\n")?;
    assert!(config.tracing.stdout);
    assert_eq!(config.tracing.filter, "info");
    assert_eq!(config.run.channel_prefix, "ringload");

    let config = HarnessConfig::from_toml_str("")?;
    assert!(config.run.timeout_ms.is_none());
    assert!(!config.run.connection_per_message);
    Ok(())
}

#[test]
fn test_invalid_run_parameters_fail_validation() -> anyhow::Result<()> {
    let config = HarnessConfig::from_toml_str("[run]\nnumber_of_clients = -3\n")?;
    assert!(matches!(
        config.run.validate(),
        Err(HarnessError::Configuration(_))
    ));

    let config = HarnessConfig::from_toml_str("[run]\nchannel_prefix = \"\"\n")?;
    assert!(config.run.validate().is_err());
    Ok(())
}
