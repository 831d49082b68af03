// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg(unix)]

//! Analyses over weir event streams.
//!
//! A backend is a set of callbacks invoked once per event as the
//! collector drains a session. [`dispatch::drain`] runs the loop for one
//! channel; [`dispatch::drain_each`] runs sharded channels concurrently
//! with one backend instance per shard.

pub mod counting;
pub mod dispatch;
mod events;

pub use counting::{CountingBackend, EventTotals};
pub use events::{
    Backend, ComputeEvent, ContextEvent, ControlFlowEvent, MemoryEvent, SyncEvent,
};
