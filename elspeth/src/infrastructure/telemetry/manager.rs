// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Telemetry Manager
//!
//! Fans events out to the configured exporters with granularity filtering,
//! bounded buffering, and the backpressure/failure model:
//!
//! - **block** (default): the producer dispatches inline and may wait on a
//!   slow exporter; the run still completes, just slower.
//! - **drop**: events go through a bounded ring buffer drained by a
//!   background task; on overflow the oldest event is dropped, with
//!   aggregated logging every 100 drops.
//! - **slow**: reserved; selecting it fails fast at configuration time.
//!
//! Failure model: a single exporter failing is a WARNING and the others
//! still receive the event. When *every* exporter fails for one event the
//! consecutive-total-failure counter advances; at the threshold the
//! manager either makes the run fail (`fail_on_total_exporter_failure`)
//! or logs CRITICAL once and continues with telemetry disabled.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, warn};

use elspeth_domain::events::{Granularity, PipelineEvent};
use elspeth_domain::EngineError;

use super::exporters::TelemetryExporter;

/// Backpressure behavior when exporters cannot keep up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureMode {
    Block,
    Drop,
}

impl BackpressureMode {
    /// Parses the settings string; `slow` is reserved and fails fast.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "block" => Ok(BackpressureMode::Block),
            "drop" => Ok(BackpressureMode::Drop),
            "slow" => Err(EngineError::InvalidConfiguration(
                "backpressure mode 'slow' is reserved and not yet implemented".to_string(),
            )),
            other => Err(EngineError::InvalidConfiguration(format!(
                "unknown backpressure mode '{}'",
                other
            ))),
        }
    }
}

/// Aggregated-logging period for drops and total failures.
const AGGREGATE_LOG_EVERY: u64 = 100;

struct ManagerInner {
    exporters: Vec<Arc<dyn TelemetryExporter>>,
    granularity: Granularity,
    mode: BackpressureMode,
    buffer_capacity: usize,
    max_consecutive_failures: u64,
    fail_on_total_exporter_failure: bool,

    buffer: Mutex<VecDeque<PipelineEvent>>,
    notify: Notify,
    dropped: AtomicU64,
    consecutive_total_failures: AtomicU64,
    /// Telemetry gave up (threshold reached, crash not configured).
    disabled: AtomicBool,
    /// Threshold reached with crash configured; emit starts erroring.
    tripped: AtomicBool,
    shutdown: AtomicBool,
}

impl ManagerInner {
    /// Dispatches one event to every exporter, applying the failure
    /// accounting. Never panics; returns whether any exporter succeeded.
    fn dispatch(&self, event: &PipelineEvent) {
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }

        let mut failures = 0usize;
        for exporter in &self.exporters {
            if let Err(e) = exporter.export(event) {
                warn!(
                    exporter = exporter.name(),
                    event = event.event_name(),
                    error = %e,
                    "exporter failed; continuing with remaining exporters"
                );
                failures += 1;
            }
        }

        if !self.exporters.is_empty() && failures == self.exporters.len() {
            let total = self.consecutive_total_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if total % AGGREGATE_LOG_EVERY == 0 {
                warn!(
                    consecutive_failures = total,
                    "all telemetry exporters failing"
                );
            }
            if total >= self.max_consecutive_failures {
                if self.fail_on_total_exporter_failure {
                    self.tripped.store(true, Ordering::Relaxed);
                } else if !self.disabled.swap(true, Ordering::Relaxed) {
                    error!(
                        consecutive_failures = total,
                        "telemetry disabled: every exporter failed {} consecutive events",
                        total
                    );
                }
            }
        } else {
            self.consecutive_total_failures.store(0, Ordering::Relaxed);
        }
    }

    fn drain(&self) {
        loop {
            let event = { self.buffer.lock().pop_front() };
            match event {
                Some(event) => self.dispatch(&event),
                None => break,
            }
        }
    }
}

/// Subscribes to the event bus and fans events out to exporters.
pub struct TelemetryManager {
    inner: Arc<ManagerInner>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TelemetryManager {
    /// Builds a manager over already-configured exporters. In `drop` mode
    /// a background drain task is spawned (requires a tokio runtime).
    pub fn new(
        exporters: Vec<Arc<dyn TelemetryExporter>>,
        granularity: Granularity,
        mode: BackpressureMode,
        buffer_capacity: usize,
        max_consecutive_failures: u64,
        fail_on_total_exporter_failure: bool,
    ) -> Self {
        let inner = Arc::new(ManagerInner {
            exporters,
            granularity,
            mode,
            buffer_capacity: buffer_capacity.max(1),
            max_consecutive_failures: max_consecutive_failures.max(1),
            fail_on_total_exporter_failure,
            buffer: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            consecutive_total_failures: AtomicU64::new(0),
            disabled: AtomicBool::new(false),
            tripped: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });

        let worker = if mode == BackpressureMode::Drop {
            let task_inner = Arc::clone(&inner);
            Some(tokio::spawn(async move {
                loop {
                    task_inner.drain();
                    if task_inner.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    task_inner.notify.notified().await;
                }
            }))
        } else {
            None
        };

        TelemetryManager {
            inner,
            worker: Mutex::new(worker),
        }
    }

    /// A manager with no exporters; every emit is a no-op. Used when
    /// telemetry is disabled in settings.
    pub fn disabled() -> Self {
        TelemetryManager::new(
            Vec::new(),
            Granularity::Lifecycle,
            BackpressureMode::Block,
            1,
            u64::MAX,
            false,
        )
    }

    /// Emits one event. Filtering, buffering, and failure accounting per
    /// the configured mode. Errors only when the failure threshold was
    /// reached under `fail_on_total_exporter_failure`.
    pub fn emit(&self, event: PipelineEvent) -> Result<(), EngineError> {
        if self.inner.tripped.load(Ordering::Relaxed) {
            return Err(EngineError::TelemetryFailure(
                "every telemetry exporter failed past the configured threshold".to_string(),
            ));
        }
        if self.inner.exporters.is_empty() || self.inner.disabled.load(Ordering::Relaxed) {
            return Ok(());
        }
        if event.granularity() > self.inner.granularity {
            return Ok(());
        }

        match self.inner.mode {
            BackpressureMode::Block => {
                self.inner.dispatch(&event);
                if self.inner.tripped.load(Ordering::Relaxed) {
                    return Err(EngineError::TelemetryFailure(
                        "every telemetry exporter failed past the configured threshold"
                            .to_string(),
                    ));
                }
            }
            BackpressureMode::Drop => {
                {
                    let mut buffer = self.inner.buffer.lock();
                    if buffer.len() >= self.inner.buffer_capacity {
                        buffer.pop_front();
                        let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if dropped % AGGREGATE_LOG_EVERY == 0 {
                            warn!(dropped, "telemetry ring buffer overflowed; dropping oldest");
                        }
                    }
                    buffer.push_back(event);
                }
                self.inner.notify.notify_one();
            }
        }
        Ok(())
    }

    /// Total events dropped by the ring buffer.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Drains the buffer and flushes every exporter.
    pub fn flush(&self) {
        self.inner.drain();
        for exporter in &self.inner.exporters {
            if let Err(e) = exporter.flush() {
                warn!(exporter = exporter.name(), error = %e, "exporter flush failed");
            }
        }
    }

    /// Flushes, stops the drain task, and closes exporters. Idempotent.
    pub fn close(&self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        self.inner.notify.notify_one();
        self.flush();
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
        for exporter in &self.inner.exporters {
            if let Err(e) = exporter.close() {
                warn!(exporter = exporter.name(), error = %e, "exporter close failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::telemetry::exporters::MemoryExporter;
    use chrono::Utc;
    use elspeth_domain::value_objects::RunId;
    use uuid::Uuid;

    fn event() -> PipelineEvent {
        PipelineEvent::RunStarted {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id: RunId::new(),
            config_hash: "hash".to_string(),
        }
    }

    fn row_event() -> PipelineEvent {
        PipelineEvent::RowCreated {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id: RunId::new(),
            row_id: elspeth_domain::value_objects::RowId::new(),
            row_index: 0,
        }
    }

    struct AlwaysFailing;
    impl TelemetryExporter for AlwaysFailing {
        fn name(&self) -> &str {
            "failing"
        }
        fn configure(&mut self, _: &serde_json::Value) -> Result<(), EngineError> {
            Ok(())
        }
        fn export(&self, _: &PipelineEvent) -> Result<(), EngineError> {
            Err(EngineError::plugin("failing", "boom"))
        }
    }

    #[tokio::test]
    async fn granularity_filters_events() {
        let memory = Arc::new(MemoryExporter::new("mem"));
        let manager = TelemetryManager::new(
            vec![memory.clone()],
            Granularity::Lifecycle,
            BackpressureMode::Block,
            16,
            10,
            false,
        );

        manager.emit(event()).unwrap();
        manager.emit(row_event()).unwrap();

        assert_eq!(memory.events().len(), 1);
    }

    #[tokio::test]
    async fn single_exporter_failure_does_not_stop_others() {
        let memory = Arc::new(MemoryExporter::new("mem"));
        let manager = TelemetryManager::new(
            vec![Arc::new(AlwaysFailing), memory.clone()],
            Granularity::Full,
            BackpressureMode::Block,
            16,
            10,
            false,
        );

        manager.emit(event()).unwrap();
        assert_eq!(memory.events().len(), 1);
    }

    #[tokio::test]
    async fn total_failure_threshold_disables_telemetry() {
        let manager = TelemetryManager::new(
            vec![Arc::new(AlwaysFailing)],
            Granularity::Full,
            BackpressureMode::Block,
            16,
            3,
            false,
        );

        for _ in 0..5 {
            manager.emit(event()).unwrap();
        }
        // Disabled, not crashed: emits stay Ok.
        assert!(manager.emit(event()).is_ok());
    }

    #[tokio::test]
    async fn total_failure_threshold_crashes_when_configured() {
        let manager = TelemetryManager::new(
            vec![Arc::new(AlwaysFailing)],
            Granularity::Full,
            BackpressureMode::Block,
            16,
            2,
            true,
        );

        assert!(manager.emit(event()).is_ok());
        let result = manager.emit(event());
        assert!(matches!(result, Err(EngineError::TelemetryFailure(_))));
    }

    #[tokio::test]
    async fn drop_mode_bounds_the_buffer() {
        let memory = Arc::new(MemoryExporter::new("mem"));
        let manager = TelemetryManager::new(
            vec![memory.clone()],
            Granularity::Full,
            BackpressureMode::Drop,
            4,
            10,
            false,
        );

        for _ in 0..50 {
            manager.emit(event()).unwrap();
        }
        manager.flush();
        // Whatever was dropped, the rest arrived and nothing blocked.
        assert!(memory.events().len() <= 50);
        manager.close();
    }

    #[test]
    fn slow_mode_is_reserved() {
        assert!(BackpressureMode::parse("slow").is_err());
        assert!(BackpressureMode::parse("sideways").is_err());
        assert_eq!(
            BackpressureMode::parse("block").unwrap(),
            BackpressureMode::Block
        );
    }
}
