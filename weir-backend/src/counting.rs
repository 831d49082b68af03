// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::info;

use crate::events::{Backend, ComputeEvent, ContextEvent, ControlFlowEvent, MemoryEvent, SyncEvent};

/// Per-category event totals for one stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventTotals {
    pub memory: u64,
    pub compute: u64,
    pub sync: u64,
    pub control_flow: u64,
    pub context: u64,
}

impl EventTotals {
    pub fn overall(&self) -> u64 {
        self.memory + self.compute + self.sync + self.control_flow + self.context
    }
}

/// The smallest useful analysis: counts every event it sees. Doubles as
/// a smoke check that a frontend actually produced a stream.
#[derive(Debug, Default)]
pub struct CountingBackend {
    totals: EventTotals,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self) -> EventTotals {
        self.totals
    }

    /// Folds in totals from another channel of the same run.
    pub fn merge(&mut self, other: &CountingBackend) {
        self.totals.memory += other.totals.memory;
        self.totals.compute += other.totals.compute;
        self.totals.sync += other.totals.sync;
        self.totals.control_flow += other.totals.control_flow;
        self.totals.context += other.totals.context;
    }

    pub fn log_totals(&self) {
        info!(
            memory = self.totals.memory,
            compute = self.totals.compute,
            sync = self.totals.sync,
            control_flow = self.totals.control_flow,
            context = self.totals.context,
            total = self.totals.overall(),
            "event totals"
        );
    }
}

impl Backend for CountingBackend {
    fn on_memory(&mut self, _event: MemoryEvent<'_>) {
        self.totals.memory += 1;
    }

    fn on_compute(&mut self, _event: ComputeEvent<'_>) {
        self.totals.compute += 1;
    }

    fn on_sync(&mut self, _event: SyncEvent<'_>) {
        self.totals.sync += 1;
    }

    fn on_control_flow(&mut self, _event: ControlFlowEvent<'_>) {
        self.totals.control_flow += 1;
    }

    fn on_context(&mut self, _event: ContextEvent<'_>) {
        self.totals.context += 1;
    }
}
