// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed ABI of the shared event region.
//!
//! Instrumentation engines are built against the C mirror of these types, so
//! every struct here is `repr(C)` with explicit field order and no implicit
//! padding. All fields are 4-byte aligned on both sides of the exchange.
//! Tags start at 1 so a zero-filled slot never decodes as a valid record.

/// Payload bytes carried by a single event record.
pub const EVENT_PAYLOAD: usize = 28;

/// Capacity of one slot, in event records.
pub const EVENTS_PER_SLOT: usize = 32 * 1024;

/// Capacity of the per-slot name table, in bytes.
pub const NAME_BYTES: usize = 4096;

/// Slots in the shared region unless a frontend overrides it.
pub const DEFAULT_SLOT_COUNT: u32 = 8;

/// Token written to the full fifo by the engine when the event stream is
/// complete. Never a valid slot index.
pub const FINISH_TOKEN: i32 = -1;

/// Category of a trace event, as encoded in [`EventRecord::tag`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum EventKind {
    /// Loads and stores observed by the engine.
    Memory = 1,
    /// Arithmetic on integer or floating point units.
    Compute = 2,
    /// Thread lifecycle and synchronization primitives.
    Sync = 3,
    /// Jumps, calls, and returns.
    ControlFlow = 4,
    /// Context markers such as function entry, referencing the slot's
    /// name table.
    Context = 5,
}

impl EventKind {
    /// Decodes a wire tag. Returns `None` for tags this build does not
    /// understand, which the dispatch loop skips rather than faulting on.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(EventKind::Memory),
            2 => Some(EventKind::Compute),
            3 => Some(EventKind::Sync),
            4 => Some(EventKind::ControlFlow),
            5 => Some(EventKind::Context),
            _ => None,
        }
    }
}

/// One trace event as written by the engine.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct EventRecord {
    pub tag: u32,
    pub payload: [u8; EVENT_PAYLOAD],
}

impl EventRecord {
    pub fn new(kind: EventKind, payload: [u8; EVENT_PAYLOAD]) -> Self {
        Self {
            tag: kind as u32,
            payload,
        }
    }

    /// Little helper for payloads that lead with a 32-bit field, like the
    /// name table offset of a context event.
    pub fn payload_u32(&self, field: usize) -> Option<u32> {
        let start = field.checked_mul(4)?;
        let bytes = self.payload.get(start..start + 4)?;
        let arr: [u8; 4] = bytes.try_into().ok()?;
        Some(u32::from_ne_bytes(arr))
    }
}

/// Interned, NUL-terminated strings referenced by context events in the
/// same slot. Offsets are only meaningful within their own slot.
#[repr(C)]
pub struct NameTable {
    pub len: u32,
    pub bytes: [u8; NAME_BYTES],
}

impl NameTable {
    /// Resolves an offset handed over in an event payload. Returns `None`
    /// if the offset is out of range, unterminated, or not UTF-8.
    pub fn lookup(&self, offset: u32) -> Option<&str> {
        let used = (self.len as usize).min(NAME_BYTES);
        let bytes = self.bytes.get(offset as usize..used)?;
        let end = bytes.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&bytes[..end]).ok()
    }

    /// Appends a name and returns the offset a payload should carry.
    /// `None` once the table is full; producers then start a fresh slot.
    pub fn intern(&mut self, name: &str) -> Option<u32> {
        let used = self.len as usize;
        let needed = name.len() + 1;
        if used.checked_add(needed)? > NAME_BYTES {
            return None;
        }
        self.bytes[used..used + name.len()].copy_from_slice(name.as_bytes());
        self.bytes[used + name.len()] = 0;
        self.len = (used + needed) as u32;
        Some(used as u32)
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// One slot of the shared region: a bounded batch of records plus the
/// name table those records reference.
#[repr(C)]
pub struct EventSlot {
    pub used: u32,
    pub records: [EventRecord; EVENTS_PER_SLOT],
    pub names: NameTable,
}

impl EventSlot {
    /// The records actually written, clamped to capacity in case the
    /// engine scribbled a bad count.
    pub fn records(&self) -> &[EventRecord] {
        let used = (self.used as usize).min(EVENTS_PER_SLOT);
        &self.records[..used]
    }

    /// Appends a record. `false` once the slot is full and must be
    /// handed over.
    pub fn push(&mut self, record: EventRecord) -> bool {
        let used = self.used as usize;
        if used >= EVENTS_PER_SLOT {
            return false;
        }
        self.records[used] = record;
        self.used += 1;
        true
    }

    pub fn clear(&mut self) {
        self.used = 0;
        self.names.clear();
    }
}
