//! Deterministic in-process export adapter
//!
//! Returns scripted references, counts invocations, and can be told to fail,
//! delay, or hold exports until released. Used by tests and by the CLI when
//! `adapter.kind = "fake"`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use super::{ColumnsDefinition, ExportAdapter, ExportReference, ExportType};

#[derive(Default)]
struct FakeState {
    references: HashMap<String, ExportReference>,
    pending_failures: HashMap<String, usize>,
    calls: Vec<(String, DateTime<Utc>)>,
}

pub struct FakeExportAdapter {
    state: Mutex<FakeState>,
    delay: Option<Duration>,
    fail_initialize: Option<String>,
    initialized: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl Default for FakeExportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeExportAdapter {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(FakeState::default()),
            delay: None,
            fail_initialize: None,
            initialized: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate,
        }
    }

    /// Sleep this long inside every export
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make `initialize` fail with the given message
    pub fn with_failing_initialize(mut self, message: impl Into<String>) -> Self {
        self.fail_initialize = Some(message.into());
        self
    }

    /// Return `reference` for every export of `table_name`
    pub fn with_reference(self, table_name: impl Into<String>, reference: ExportReference) -> Self {
        self.lock_state()
            .references
            .insert(table_name.into(), reference);
        self
    }

    /// Fail the next `times` exports of `table_name`
    pub fn fail_next(&self, table_name: impl Into<String>, times: usize) {
        *self
            .lock_state()
            .pending_failures
            .entry(table_name.into())
            .or_default() += times;
    }

    /// Block exports at their start until [`release`](Self::release)
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn call_count(&self) -> usize {
        self.lock_state().calls.len()
    }

    pub fn calls_for(&self, table_name: &str) -> usize {
        self.lock_state()
            .calls
            .iter()
            .filter(|(name, _)| name == table_name)
            .count()
    }

    /// Every call in invocation order
    pub fn calls(&self) -> Vec<(String, DateTime<Utc>)> {
        self.lock_state().calls.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Highest number of exports observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ExportAdapter for FakeExportAdapter {
    fn name(&self) -> &str {
        "fake"
    }

    async fn initialize(&self) -> Result<()> {
        if let Some(message) = &self.fail_initialize {
            anyhow::bail!("{}", message);
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn export_table(
        &self,
        table_name: &str,
        execution_time: DateTime<Utc>,
    ) -> Result<ExportReference> {
        let should_fail = {
            let mut state = self.lock_state();
            state.calls.push((table_name.to_string(), execution_time));
            match state.pending_failures.get_mut(table_name) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let mut gate = self.gate.subscribe();
        // Sender lives in self, so the channel cannot close while we wait
        let _ = gate.wait_for(|open| *open).await;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if should_fail {
            debug!(table = table_name, "fake export failing as scripted");
            anyhow::bail!("scripted export failure for {}", table_name);
        }

        let reference = self
            .lock_state()
            .references
            .get(table_name)
            .cloned()
            .unwrap_or_else(|| {
                ExportReference::new(table_name, ExportType::Fake, ColumnsDefinition::empty())
                    .with_payload("execution_time", execution_time.to_rfc3339())
            });

        Ok(reference)
    }
}
