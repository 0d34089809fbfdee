/*
Copyright 2026 The Bulkhead Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

// Test-only helpers for asserting on the diagnostics the validation
// crates emit; nothing here belongs in a non-test dependency graph.

use tracing::Level;

pub mod capture;

pub use capture::CapturingSubscriber;

/// Run `f` with a fresh [`CapturingSubscriber`] installed as the default
/// subscriber for the current thread, and hand the subscriber back for
/// inspection alongside the closure's result.
///
/// # Example
///
/// ```
/// use bulkhead_testing::with_capture;
/// use tracing::Level;
///
/// let (value, trace) = with_capture(Level::INFO, || {
///     tracing::info!("one");
///     2 + 2
/// });
/// assert_eq!(value, 4);
/// assert_eq!(trace.event_messages(), vec!["one"]);
/// ```
pub fn with_capture<T>(level: Level, f: impl FnOnce() -> T) -> (T, CapturingSubscriber) {
    let subscriber = CapturingSubscriber::new(level);
    subscriber.clear();
    let value = tracing::subscriber::with_default(subscriber.clone(), f);
    (value, subscriber)
}
