// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Bus
//!
//! Process-scoped fan-out from the engine to event subscribers. The bus is
//! created by the host and passed explicitly, not a singleton.
//!
//! The ordering contract lives at the call sites: the engine publishes an
//! event only after the corresponding Landscape write committed. A
//! subscriber error never retracts that write; the only error that
//! propagates is the telemetry manager's configured crash-on-total-failure
//! signal.

use std::sync::Arc;

use elspeth_domain::events::PipelineEvent;
use elspeth_domain::EngineError;

use super::manager::TelemetryManager;

/// Receives published events.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &PipelineEvent) -> Result<(), EngineError>;
}

impl EventSubscriber for TelemetryManager {
    fn on_event(&self, event: &PipelineEvent) -> Result<(), EngineError> {
        self.emit(event.clone())
    }
}

/// Fan-out bus over registered subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    /// Registers a subscriber. Called during host wiring, before the run.
    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Publishes one event to every subscriber. Every subscriber sees the
    /// event even if an earlier one errored; the first error is returned
    /// afterwards.
    pub fn publish(&self, event: &PipelineEvent) -> Result<(), EngineError> {
        let mut first_error = None;
        for subscriber in &self.subscribers {
            if let Err(e) = subscriber.on_event(event) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use elspeth_domain::value_objects::RunId;
    use parking_lot::Mutex;
    use uuid::Uuid;

    struct Recording(Mutex<Vec<String>>);
    impl EventSubscriber for Recording {
        fn on_event(&self, event: &PipelineEvent) -> Result<(), EngineError> {
            self.0.lock().push(event.event_name().to_string());
            Ok(())
        }
    }

    #[test]
    fn publishes_to_all_subscribers() {
        let first = Arc::new(Recording(Mutex::new(Vec::new())));
        let second = Arc::new(Recording(Mutex::new(Vec::new())));

        let mut bus = EventBus::new();
        bus.subscribe(first.clone());
        bus.subscribe(second.clone());

        bus.publish(&PipelineEvent::RunStarted {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id: RunId::new(),
            config_hash: "h".to_string(),
        })
        .unwrap();

        assert_eq!(first.0.lock().as_slice(), ["run_started"]);
        assert_eq!(second.0.lock().as_slice(), ["run_started"]);
    }
}
