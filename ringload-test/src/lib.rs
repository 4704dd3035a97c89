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

//! Test support for ringload.
//!
//! ```rust,ignore
//! use ringload_test::prelude::*;
//!
//! #[ringload_test]
//! async fn ring_completes() -> anyhow::Result<()> {
//!     Ok(())
//! }
//! ```

/// Everything a test file needs in one import.
pub mod prelude {
    pub use ringload_test_macro::ringload_test;
}

/// Support code that `#[ringload_test]` expands to.
#[doc(hidden)]
pub mod __private {
    use std::fmt::Debug;
    use std::future::Future;
    use std::panic;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing::Instrument;

    /// Where and why the first panic of a test happened.
    #[derive(Debug, Default)]
    struct PanicRecord {
        message: Option<String>,
        location: Option<String>,
    }

    /// Runs `test` on a fresh multi-threaded runtime.
    ///
    /// Agent tasks spawned by the test panic on worker threads where the test
    /// body never sees them, so a panic hook records the first one and it is
    /// re-raised here once the runtime has shut down.
    pub fn run_test<T, E: Debug>(name: &str, test: impl Future<Output = Result<T, E>>) -> T {
        let record: Arc<Mutex<Option<PanicRecord>>> = Arc::default();
        let sink = Arc::clone(&record);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let payload = info.payload();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned());
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
            tracing::error!(
                location = location.as_deref().unwrap_or("unknown"),
                "Panic: {}",
                message.as_deref().unwrap_or("<non-string payload>")
            );
            let mut slot = sink.lock();
            if slot.is_none() {
                *slot = Some(PanicRecord { message, location });
            }
            drop(slot);
            previous(info);
        }));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to build test runtime");
        let result = runtime.block_on(test.instrument(tracing::info_span!("ringload_test", test = name)));
        drop(runtime);

        if let Some(PanicRecord { message, location }) = record.lock().take() {
            let message = message.unwrap_or_default().trim().replace('\n', " ");
            panic!(
                "Panic at {}: {message}",
                location.as_deref().unwrap_or("unknown location")
            );
        }
        match result {
            Ok(value) => value,
            Err(e) => panic!("{name} failed: {e:?}"),
        }
    }
}
