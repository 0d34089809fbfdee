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

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::{json, to_string_pretty, Value};
use tracing::Subscriber;
use tracing_core::event::Event;
use tracing_core::metadata::Metadata;
use tracing_core::span::{Attributes, Current, Id, Record};
use tracing_core::{Level, LevelFilter};
use tracing_serde::AsSerde;

/// A [`Subscriber`] that records spans and events into thread-local
/// storage as JSON, so tests can make assertions about the diagnostics
/// a validation pass emitted.
///
/// The captured state lives in thread-locals rather than in the
/// subscriber value itself, so any clone of a subscriber observes the
/// captures of the thread it is inspected on. Call [`Self::clear`]
/// between test cases that share a thread.
#[derive(Debug, Clone)]
pub struct CapturingSubscriber {}

thread_local!(
    static SPAN_METADATA: RefCell<HashMap<u64, &'static Metadata<'static>>> =
        RefCell::new(HashMap::new());
    static SPANS: RefCell<HashMap<u64, Value>> = RefCell::new(HashMap::new());
    static EVENTS: RefCell<Vec<Value>> = const { RefCell::new(Vec::new()) };
    static LEVEL_FILTER: RefCell<LevelFilter> = const { RefCell::new(LevelFilter::OFF) };
    static NEXT_ID: RefCell<u64> = const { RefCell::new(1) };
    static SPAN_STACK: RefCell<Vec<Id>> = const { RefCell::new(Vec::new()) };
);

impl CapturingSubscriber {
    /// Creates a new subscriber that captures spans and events at
    /// `trace_level` and below.
    ///
    /// # Example
    ///
    /// ```
    /// use bulkhead_testing::capture::CapturingSubscriber;
    /// use tracing::Level;
    ///
    /// let subscriber = CapturingSubscriber::new(Level::INFO);
    /// tracing::subscriber::with_default(subscriber.clone(), || {
    ///     tracing::info!("captured");
    ///     tracing::trace!("filtered out");
    /// });
    /// assert_eq!(subscriber.get_events().len(), 1);
    /// ```
    pub fn new(trace_level: Level) -> Self {
        LEVEL_FILTER.with(|level_filter| *level_filter.borrow_mut() = trace_level.into());
        Self {}
    }

    /// Retrieves the metadata for the span with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if no span with that ID has been captured.
    pub fn get_span_metadata(&self, id: u64) -> &'static Metadata<'static> {
        SPAN_METADATA.with(|span_metadata| {
            span_metadata
                .borrow()
                .get(&id)
                .copied()
                .unwrap_or_else(|| panic!("no captured metadata for span id {}", id))
        })
    }

    /// Retrieves the JSON representation of the span with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if no span with that ID has been captured.
    pub fn get_span(&self, id: u64) -> Value {
        SPANS.with(|spans| {
            spans
                .borrow()
                .get(&id)
                .unwrap_or_else(|| panic!("no captured span with id {}", id))
                .clone()
        })
    }

    /// All events captured on this thread, in emission order.
    pub fn get_events(&self) -> Vec<Value> {
        EVENTS.with(|events| events.borrow().clone())
    }

    /// The `message` field of every captured event, in emission order.
    ///
    /// Serialized events are flat maps: each recorded field sits next
    /// to the `metadata` entry, not under a separate key.
    pub fn event_messages(&self) -> Vec<String> {
        EVENTS.with(|events| {
            events
                .borrow()
                .iter()
                .filter_map(|e| e["message"].as_str().map(String::from))
                .collect()
        })
    }

    /// The `error` field of every captured event, in emission order.
    ///
    /// Instrumented validation entry points record the rendered error on
    /// an event when they return `Err`, so after a failed run this holds
    /// the diagnostics a caller would have seen.
    pub fn error_values(&self) -> Vec<String> {
        EVENTS.with(|events| {
            events
                .borrow()
                .iter()
                .filter_map(|e| e["error"].as_str().map(String::from))
                .collect()
        })
    }

    /// The names of all captured spans, in creation order.
    pub fn span_names(&self) -> Vec<String> {
        SPANS.with(|spans| {
            let map = spans.borrow();
            let mut ids: Vec<u64> = map.keys().copied().collect();
            ids.sort_unstable();
            ids.iter()
                .filter_map(|id| map[id]["name"].as_str().map(String::from))
                .collect()
        })
    }

    /// Processes the captured records with `f`, then clears the events.
    pub fn test_trace_records<F: Fn(&HashMap<u64, Value>, &Vec<Value>)>(&self, f: F) {
        SPANS.with(|spans| {
            EVENTS.with(|events| {
                f(&spans.borrow().clone(), &events.borrow().clone());
                events.borrow_mut().clear();
            });
        });
    }

    /// Pretty-prints everything captured so far, for debugging a failing
    /// test.
    pub fn dump(&self) {
        SPANS.with(|spans| {
            let map = spans.borrow();
            let mut ids: Vec<u64> = map.keys().copied().collect();
            ids.sort_unstable();
            for id in ids {
                println!(
                    "span {}: {}",
                    id,
                    to_string_pretty(&map[&id]).expect("failed to pretty print span")
                );
            }
        });
        EVENTS.with(|events| {
            for event in events.borrow().iter() {
                println!(
                    "event: {}",
                    to_string_pretty(event).expect("failed to pretty print event")
                );
            }
        });
    }

    /// Clears all captured spans and events, resetting the subscriber
    /// state for the current thread.
    pub fn clear(&self) {
        SPANS.with(|spans| spans.borrow_mut().clear());
        EVENTS.with(|events| events.borrow_mut().clear());
        SPAN_STACK.with(|span_stack| span_stack.borrow_mut().clear());
        SPAN_METADATA.with(|span_metadata| span_metadata.borrow_mut().clear());
        NEXT_ID.with(|next_id| *next_id.borrow_mut() = 1);
    }
}

impl Subscriber for CapturingSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        LEVEL_FILTER.with(|level_filter| metadata.level() <= &*level_filter.borrow())
    }

    fn new_span(&self, span_attributes: &Attributes<'_>) -> Id {
        let span_id = NEXT_ID.with(|next_id| {
            let id = *next_id.borrow();
            *next_id.borrow_mut() += 1;
            id
        });
        let metadata = span_attributes.metadata();
        let json = json!({
            "id": span_id,
            "name": metadata.name(),
            "attributes": span_attributes.as_serde(),
            "values": {},
        });
        SPANS.with(|spans| {
            spans.borrow_mut().insert(span_id, json);
        });
        SPAN_METADATA.with(|span_metadata| {
            span_metadata.borrow_mut().insert(span_id, metadata);
        });
        Id::from_u64(span_id)
    }

    fn record(&self, id: &Id, values: &Record<'_>) {
        let span_id = id.into_u64();
        SPANS.with(|spans| {
            let mut map = spans.borrow_mut();
            let entry = map
                .get_mut(&span_id)
                .unwrap_or_else(|| panic!("no captured span with id {}", span_id));
            let recorded = json!(values.as_serde());
            if let (Some(Value::Object(have)), Value::Object(new)) =
                (entry.get_mut("values"), recorded)
            {
                have.extend(new);
            }
        });
    }

    fn event(&self, event: &Event<'_>) {
        let json = json!(event.as_serde());
        EVENTS.with(|events| {
            events.borrow_mut().push(json);
        });
    }

    fn current_span(&self) -> Current {
        SPAN_STACK.with(|span_stack| {
            let stack = span_stack.borrow();
            let Some(id) = stack.last() else {
                return Current::none();
            };
            SPAN_METADATA.with(|span_metadata| {
                match span_metadata.borrow().get(&id.into_u64()).copied() {
                    Some(metadata) => Current::new(id.clone(), metadata),
                    None => Current::none(),
                }
            })
        })
    }

    fn enter(&self, span: &Id) {
        SPAN_STACK.with(|span_stack| {
            span_stack.borrow_mut().push(span.clone());
        });
    }

    fn exit(&self, span: &Id) {
        SPAN_STACK.with(|span_stack| {
            let popped = span_stack.borrow_mut().pop();
            assert_eq!(popped, Some(span.clone()));
        });
    }

    // Span relationships are not interesting for diagnostics assertions.

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}
}
