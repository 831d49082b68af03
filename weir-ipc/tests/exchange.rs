// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg(unix)]

//! End-to-end exchange against a producer thread speaking the engine side
//! of the protocol over real fifos and a real mapped region.

use std::collections::VecDeque;
use std::thread;

use weir_ipc::fifo::{TokenReader, TokenWriter};
use weir_ipc::layout::{EventKind, EventRecord, EVENT_PAYLOAD, FINISH_TOKEN};
use weir_ipc::shm::SharedRegion;
use weir_ipc::{ChannelPaths, FinishHandshake, Session, SessionConfig};

struct Engine {
    region: SharedRegion,
    full: TokenWriter,
    empty: TokenReader,
    free: VecDeque<u32>,
}

impl Engine {
    fn connect(paths: &ChannelPaths) -> Self {
        let empty = TokenReader::open(&paths.empty).unwrap();
        let full = TokenWriter::open(&paths.full).unwrap();
        let region = SharedRegion::open(&paths.region).unwrap();
        let free = (0..region.nslots()).collect();
        Engine {
            region,
            full,
            empty,
            free,
        }
    }

    fn take_slot(&mut self) -> u32 {
        match self.free.pop_front() {
            Some(index) => index,
            None => self.empty.recv().unwrap() as u32,
        }
    }
}

fn payload_with(lead: u32, fill: u8) -> [u8; EVENT_PAYLOAD] {
    let mut payload = [fill; EVENT_PAYLOAD];
    payload[..4].copy_from_slice(&lead.to_ne_bytes());
    payload
}

#[test]
#[cfg_attr(miri, ignore)]
fn two_slot_pool_streams_many_batches() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ChannelPaths::in_dir(dir.path());
    let pending = Session::prepare(
        paths.clone(),
        SessionConfig {
            nslots: 2,
            handshake: FinishHandshake::Plain,
        },
    )
    .unwrap();

    const BATCHES: u32 = 12;
    const PER_BATCH: u32 = 64;

    let producer = thread::spawn(move || {
        let mut engine = Engine::connect(&paths);
        let mut next = 0u32;
        for _ in 0..BATCHES {
            let index = engine.take_slot();
            let slot = engine.region.slot_mut(index);
            slot.clear();
            for _ in 0..PER_BATCH {
                assert!(slot.push(EventRecord::new(EventKind::Memory, payload_with(next, 0))));
                next += 1;
            }
            engine.full.send(index as i32).unwrap();
        }
        engine.full.send(FINISH_TOKEN).unwrap();
    });

    let mut session = pending.connect().unwrap();
    let mut expected = 0u32;
    let mut batches = 0u32;
    while let Some(buffer) = session.acquire_buffer().unwrap() {
        assert_eq!(buffer.records().len(), PER_BATCH as usize);
        for record in buffer.records() {
            assert_eq!(record.payload_u32(0), Some(expected));
            expected += 1;
        }
        buffer.release().unwrap();
        batches += 1;
    }
    assert_eq!(batches, BATCHES);
    assert_eq!(expected, BATCHES * PER_BATCH);

    producer.join().unwrap();
    session.shutdown().unwrap();
}

#[test]
#[cfg_attr(miri, ignore)]
fn all_event_kinds_and_names_survive_the_crossing() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ChannelPaths::in_dir(dir.path());
    let pending = Session::prepare(paths.clone(), SessionConfig::default()).unwrap();

    let producer = thread::spawn(move || {
        let mut engine = Engine::connect(&paths);
        let index = engine.take_slot();
        let slot = engine.region.slot_mut(index);
        slot.clear();

        let fn_name = slot.names.intern("compute_kernel").unwrap();
        assert!(slot.push(EventRecord::new(EventKind::Memory, payload_with(1, 0xa1))));
        assert!(slot.push(EventRecord::new(EventKind::Compute, payload_with(2, 0xa2))));
        assert!(slot.push(EventRecord::new(EventKind::Sync, payload_with(3, 0xa3))));
        assert!(slot.push(EventRecord::new(
            EventKind::ControlFlow,
            payload_with(4, 0xa4)
        )));
        assert!(slot.push(EventRecord::new(
            EventKind::Context,
            payload_with(fn_name, 0)
        )));

        engine.full.send(index as i32).unwrap();
        engine.full.send(FINISH_TOKEN).unwrap();
    });

    let mut session = pending.connect().unwrap();
    let buffer = session.acquire_buffer().unwrap().unwrap();
    let records = buffer.records();
    assert_eq!(records.len(), 5);

    let tags: Vec<u32> = records.iter().map(|r| r.tag).collect();
    assert_eq!(tags, vec![1, 2, 3, 4, 5]);
    assert_eq!(records[0].payload, payload_with(1, 0xa1));
    assert_eq!(records[3].payload, payload_with(4, 0xa4));

    let name_offset = records[4].payload_u32(0).unwrap();
    assert_eq!(buffer.names().lookup(name_offset), Some("compute_kernel"));

    buffer.release().unwrap();
    assert!(session.acquire_buffer().unwrap().is_none());

    producer.join().unwrap();
    session.shutdown().unwrap();
}
