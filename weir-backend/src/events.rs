// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use weir_ipc::layout::{EventRecord, NameTable, EVENT_PAYLOAD};

/// An analysis consuming the event stream.
///
/// Callbacks default to no-ops so a backend only implements the
/// categories its frontend was asked to generate. Views borrow straight
/// from the shared slot and are gone once the buffer is released, so a
/// backend keeping history copies what it needs.
pub trait Backend {
    fn on_memory(&mut self, event: MemoryEvent<'_>) {
        let _ = event;
    }
    fn on_compute(&mut self, event: ComputeEvent<'_>) {
        let _ = event;
    }
    fn on_sync(&mut self, event: SyncEvent<'_>) {
        let _ = event;
    }
    fn on_control_flow(&mut self, event: ControlFlowEvent<'_>) {
        let _ = event;
    }
    fn on_context(&mut self, event: ContextEvent<'_>) {
        let _ = event;
    }
}

/// A load or store observed by the engine.
#[derive(Clone, Copy)]
pub struct MemoryEvent<'a> {
    record: &'a EventRecord,
}

/// Work on an integer or floating point unit.
#[derive(Clone, Copy)]
pub struct ComputeEvent<'a> {
    record: &'a EventRecord,
}

/// Thread lifecycle or synchronization primitive.
#[derive(Clone, Copy)]
pub struct SyncEvent<'a> {
    record: &'a EventRecord,
}

/// A jump, call, or return.
#[derive(Clone, Copy)]
pub struct ControlFlowEvent<'a> {
    record: &'a EventRecord,
}

/// A context marker, able to resolve the name its payload references in
/// the slot's own table.
#[derive(Clone, Copy)]
pub struct ContextEvent<'a> {
    record: &'a EventRecord,
    names: &'a NameTable,
}

macro_rules! payload_view {
    ($view:ident) => {
        impl<'a> $view<'a> {
            pub(crate) fn new(record: &'a EventRecord) -> Self {
                Self { record }
            }

            /// Raw payload bytes; field meaning is defined by the engine
            /// headers for this event category.
            pub fn payload(&self) -> &'a [u8; EVENT_PAYLOAD] {
                &self.record.payload
            }
        }
    };
}

payload_view!(MemoryEvent);
payload_view!(ComputeEvent);
payload_view!(SyncEvent);
payload_view!(ControlFlowEvent);

impl<'a> ContextEvent<'a> {
    pub(crate) fn new(record: &'a EventRecord, names: &'a NameTable) -> Self {
        Self { record, names }
    }

    pub fn payload(&self) -> &'a [u8; EVENT_PAYLOAD] {
        &self.record.payload
    }

    /// The name this marker references, if the payload carries a valid
    /// table offset.
    pub fn name(&self) -> Option<&'a str> {
        self.names.lookup(self.record.payload_u32(0)?)
    }
}
