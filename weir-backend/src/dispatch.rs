// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pumps sessions dry, decoding each record once and fanning it out to
//! backend callbacks.

use std::thread;

use anyhow::Context;
use tracing::warn;

use weir_ipc::layout::{EventKind, EventRecord, NameTable};
use weir_ipc::{Session, SessionError};

use crate::events::{
    Backend, ComputeEvent, ContextEvent, ControlFlowEvent, MemoryEvent, SyncEvent,
};

/// Drains one session to termination, releasing every buffer after its
/// records are dispatched. Returns when the stream ends or faults.
pub fn drain<B>(session: &mut Session, backend: &mut B) -> Result<(), SessionError>
where
    B: Backend + ?Sized,
{
    let mut unknown = 0u64;
    while let Some(buffer) = session.acquire_buffer()? {
        unknown += dispatch_records(buffer.records(), buffer.names(), backend);
        buffer.release()?;
    }
    if unknown > 0 {
        warn!(unknown, "skipped records with unrecognized tags");
    }
    Ok(())
}

/// Drains several channels of one run concurrently, one backend instance
/// per channel. Sessions are only drained, not shut down, so the caller
/// keeps lifecycle ownership; merge the returned backends however the
/// analysis combines shards.
pub fn drain_each<B, F>(sessions: &mut [Session], make_backend: F) -> anyhow::Result<Vec<B>>
where
    B: Backend + Send,
    F: Fn() -> B,
{
    let results: Vec<anyhow::Result<B>> = thread::scope(|scope| {
        let mut joins = Vec::with_capacity(sessions.len());
        for (id, session) in sessions.iter_mut().enumerate() {
            let mut backend = make_backend();
            let join = thread::Builder::new()
                .name(format!("weir-drain-{id}"))
                .spawn_scoped(scope, move || -> anyhow::Result<B> {
                    drain(session, &mut backend)
                        .with_context(|| format!("channel {id} failed"))?;
                    Ok(backend)
                });
            joins.push(join);
        }
        joins
            .into_iter()
            .map(|join| match join {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("drain thread panicked"))),
                Err(e) => Err(e).context("failed to spawn drain thread"),
            })
            .collect()
    });
    results.into_iter().collect()
}

fn dispatch_records<B>(records: &[EventRecord], names: &NameTable, backend: &mut B) -> u64
where
    B: Backend + ?Sized,
{
    let mut unknown = 0;
    for record in records {
        match EventKind::from_tag(record.tag) {
            Some(EventKind::Memory) => backend.on_memory(MemoryEvent::new(record)),
            Some(EventKind::Compute) => backend.on_compute(ComputeEvent::new(record)),
            Some(EventKind::Sync) => backend.on_sync(SyncEvent::new(record)),
            Some(EventKind::ControlFlow) => backend.on_control_flow(ControlFlowEvent::new(record)),
            Some(EventKind::Context) => backend.on_context(ContextEvent::new(record, names)),
            None => unknown += 1,
        }
    }
    unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_ipc::layout::{EVENT_PAYLOAD, NAME_BYTES};

    #[derive(Default)]
    struct Recording {
        calls: Vec<String>,
    }

    impl Backend for Recording {
        fn on_memory(&mut self, _event: MemoryEvent<'_>) {
            self.calls.push("memory".into());
        }
        fn on_compute(&mut self, _event: ComputeEvent<'_>) {
            self.calls.push("compute".into());
        }
        fn on_sync(&mut self, _event: SyncEvent<'_>) {
            self.calls.push("sync".into());
        }
        fn on_control_flow(&mut self, _event: ControlFlowEvent<'_>) {
            self.calls.push("control_flow".into());
        }
        fn on_context(&mut self, event: ContextEvent<'_>) {
            self.calls
                .push(format!("context:{}", event.name().unwrap_or("?")));
        }
    }

    fn record(kind: EventKind) -> EventRecord {
        EventRecord::new(kind, [0; EVENT_PAYLOAD])
    }

    #[test]
    fn records_dispatch_in_order_with_names() {
        let mut names = NameTable {
            len: 0,
            bytes: [0; NAME_BYTES],
        };
        let offset = names.intern("spin_lock").unwrap();
        let mut payload = [0u8; EVENT_PAYLOAD];
        payload[..4].copy_from_slice(&offset.to_ne_bytes());

        let records = [
            record(EventKind::Sync),
            record(EventKind::Memory),
            EventRecord::new(EventKind::Context, payload),
            record(EventKind::ControlFlow),
            record(EventKind::Compute),
        ];

        let mut backend = Recording::default();
        let unknown = dispatch_records(&records, &names, &mut backend);
        assert_eq!(unknown, 0);
        assert_eq!(
            backend.calls,
            vec![
                "sync",
                "memory",
                "context:spin_lock",
                "control_flow",
                "compute"
            ]
        );
    }

    #[test]
    fn unrecognized_tags_are_counted_not_dispatched() {
        let names = NameTable {
            len: 0,
            bytes: [0; NAME_BYTES],
        };
        let records = [
            record(EventKind::Memory),
            EventRecord {
                tag: 9,
                payload: [0; EVENT_PAYLOAD],
            },
            EventRecord {
                tag: 0,
                payload: [0; EVENT_PAYLOAD],
            },
        ];

        let mut backend = Recording::default();
        let unknown = dispatch_records(&records, &names, &mut backend);
        assert_eq!(unknown, 2);
        assert_eq!(backend.calls, vec!["memory"]);
    }

    #[test]
    fn partial_backends_lean_on_default_callbacks() {
        struct MemoryOnly {
            seen: u64,
        }
        impl Backend for MemoryOnly {
            fn on_memory(&mut self, _event: MemoryEvent<'_>) {
                self.seen += 1;
            }
        }

        let names = NameTable {
            len: 0,
            bytes: [0; NAME_BYTES],
        };
        let records = [
            record(EventKind::Memory),
            record(EventKind::Sync),
            record(EventKind::Memory),
        ];
        let mut backend = MemoryOnly { seen: 0 };
        assert_eq!(dispatch_records(&records, &names, &mut backend), 0);
        assert_eq!(backend.seen, 2);
    }
}
