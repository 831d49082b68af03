// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One live exchange with an instrumentation engine.
//!
//! A session owns the mapped slot pool, the collector ends of both token
//! fifos, and a listener thread that turns raw full-fifo tokens into a
//! bounded queue of slot messages. The collector drains that queue one
//! buffer at a time:
//!
//! ```text
//! engine ──full fifo──▶ listener ──bounded queue──▶ acquire_buffer
//!   ▲                                                    │
//!   └───────────────empty fifo◀──────────────────release─┘
//! ```
//!
//! The queue holds one message per slot plus the terminal marker, so the
//! listener never drops a token and never buffers unboundedly. Possession
//! of a buffer is a borrow of the session; the borrow checker rules out
//! acquiring a second buffer before the first is released or dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::Context;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, warn};

use crate::error::{ChannelError, ProtocolError, SessionError};
use crate::fifo::{self, TokenReader, TokenWriter};
use crate::layout::{EventRecord, EventSlot, NameTable, DEFAULT_SLOT_COUNT, FINISH_TOKEN};
use crate::shm::SharedRegion;

/// How the engine closes the stream after the termination token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishHandshake {
    /// The termination token is the last thing on the full fifo.
    Plain,
    /// One more token follows, naming a final partially filled slot that
    /// was never announced as full.
    FinalSlot,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub nslots: u32,
    pub handshake: FinishHandshake,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            nslots: DEFAULT_SLOT_COUNT,
            handshake: FinishHandshake::Plain,
        }
    }
}

/// Filesystem layout of one channel inside a run directory.
#[derive(Clone, Debug)]
pub struct ChannelPaths {
    pub region: PathBuf,
    pub full: PathBuf,
    pub empty: PathBuf,
}

impl ChannelPaths {
    /// The single-channel layout used by engines with one event stream.
    pub fn in_dir(dir: &Path) -> Self {
        ChannelPaths {
            region: dir.join("shmem"),
            full: dir.join("full.fifo"),
            empty: dir.join("empty.fifo"),
        }
    }

    /// The suffixed layout used when an engine shards events over
    /// several independent channels.
    pub fn in_dir_for(dir: &Path, id: u32) -> Self {
        ChannelPaths {
            region: dir.join(format!("shmem-{id}")),
            full: dir.join(format!("full-{id}.fifo")),
            empty: dir.join(format!("empty-{id}.fifo")),
        }
    }

    pub fn files(&self) -> [&Path; 3] {
        [&self.region, &self.full, &self.empty]
    }
}

enum SlotMessage {
    Filled(u32),
    End,
    Fault(SessionError),
}

/// Artifacts exist on disk but the engine has not connected yet.
///
/// Splitting setup in two matters because fifo opens block until the peer
/// arrives: the nodes must exist before the engine is spawned, and the
/// collector can only open them afterwards.
pub struct PendingSession {
    region: SharedRegion,
    paths: ChannelPaths,
    config: SessionConfig,
}

pub struct Session {
    region: SharedRegion,
    empty: TokenWriter,
    filled: Receiver<SlotMessage>,
    listener: Option<thread::JoinHandle<TokenReader>>,
    finished: bool,
    nslots: u32,
}

/// A filled slot on loan to the collector.
///
/// Dropping it without [`release`](EventBuffer::release) keeps the slot
/// from ever returning to the engine, so drains always release; the
/// consuming signature makes use-after-release impossible.
pub struct EventBuffer<'a> {
    slot: &'a EventSlot,
    empty: &'a TokenWriter,
    index: u32,
}

impl EventBuffer<'_> {
    pub fn records(&self) -> &[EventRecord] {
        self.slot.records()
    }

    pub fn names(&self) -> &NameTable {
        &self.slot.names
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Hands the slot back to the engine for refilling.
    ///
    /// An engine that has already quit no longer wants slots back, so a
    /// broken pipe here is not a fault; engine death mid-stream surfaces
    /// on the read side as [`ChannelError::UnexpectedEof`].
    pub fn release(self) -> Result<(), ChannelError> {
        match self.empty.send(self.index as i32) {
            Err(ChannelError::Write(e)) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    }
}

impl Session {
    /// Creates the region and fifo nodes for one channel. Call before
    /// spawning the engine, then [`PendingSession::connect`] after.
    pub fn prepare(paths: ChannelPaths, config: SessionConfig) -> anyhow::Result<PendingSession> {
        let region = SharedRegion::create(&paths.region, config.nslots)
            .with_context(|| format!("failed to create region {}", paths.region.display()))?;
        fifo::create(&paths.full)
            .with_context(|| format!("failed to create fifo {}", paths.full.display()))?;
        fifo::create(&paths.empty)
            .with_context(|| format!("failed to create fifo {}", paths.empty.display()))?;
        Ok(PendingSession {
            region,
            paths,
            config,
        })
    }

    /// Blocks until the next filled buffer, or `Ok(None)` once the stream
    /// has terminated. Terminal is sticky: after `None` or an error every
    /// further call returns `None` without blocking.
    pub fn acquire_buffer(&mut self) -> Result<Option<EventBuffer<'_>>, SessionError> {
        if self.finished {
            return Ok(None);
        }
        match self.filled.recv() {
            Ok(SlotMessage::Filled(index)) => Ok(Some(EventBuffer {
                slot: self.region.slot(index),
                empty: &self.empty,
                index,
            })),
            Ok(SlotMessage::End) => {
                self.finished = true;
                Ok(None)
            }
            Ok(SlotMessage::Fault(e)) => {
                self.finished = true;
                Err(e)
            }
            Err(_) => {
                self.finished = true;
                Err(SessionError::ListenerGone)
            }
        }
    }

    pub fn nslots(&self) -> u32 {
        self.nslots
    }

    /// Filled-slot messages buffered ahead of `acquire_buffer`.
    #[cfg(test)]
    fn queued_signals(&self) -> usize {
        self.filled.len()
    }

    /// Joins the listener. Normal path once `acquire_buffer` has gone
    /// terminal; on an early shutdown the listener may still be parked in
    /// a fifo read, in which case it is detached instead of joined.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };
        if self.finished {
            // Joining also closes the full fifo's read end, held open this
            // long so straggler tokens never fault the engine's last writes.
            listener
                .join()
                .map_err(|_| anyhow::anyhow!("listener thread panicked"))?;
        } else {
            warn!("shutting down before stream termination; detaching listener");
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            if self.finished {
                _ = listener.join();
            }
        }
    }
}

impl PendingSession {
    /// Rendezvous with the engine: opens the collector ends of both
    /// fifos, blocking until the engine opens its mirrored ends, then
    /// starts the listener.
    pub fn connect(self) -> anyhow::Result<Session> {
        let empty = TokenWriter::open(&self.paths.empty)
            .with_context(|| format!("failed to open fifo {}", self.paths.empty.display()))?;
        let full = TokenReader::open(&self.paths.full)
            .with_context(|| format!("failed to open fifo {}", self.paths.full.display()))?;

        let nslots = self.config.nslots;
        let handshake = self.config.handshake;
        // One message per slot plus the terminal marker; the listener can
        // park on a send but never loses a token.
        let (tx, rx) = bounded(nslots as usize + 1);
        let listener = thread::Builder::new()
            .name("weir-listener".into())
            .spawn(move || listen(full, tx, nslots, handshake))
            .context("failed to spawn listener thread")?;

        Ok(Session {
            region: self.region,
            empty,
            filled: rx,
            listener: Some(listener),
            finished: false,
            nslots,
        })
    }
}

/// Pumps full-fifo tokens into the queue until termination or a fault,
/// then stops reading. Anything the engine writes after its termination
/// token is never consumed, but the read end travels back through the
/// join handle and stays open until the session closes, so those writes
/// never fault the engine either.
fn listen(
    mut full: TokenReader,
    queue: Sender<SlotMessage>,
    nslots: u32,
    handshake: FinishHandshake,
) -> TokenReader {
    debug!(nslots, ?handshake, "listener started");
    loop {
        let token = match full.recv() {
            Ok(token) => token,
            Err(e) => {
                report_fault(&queue, e.into());
                return full;
            }
        };
        if token == FINISH_TOKEN {
            if handshake == FinishHandshake::FinalSlot {
                match read_final_slot(&mut full, nslots) {
                    Ok(index) => {
                        if queue.send(SlotMessage::Filled(index)).is_err() {
                            return full;
                        }
                    }
                    Err(e) => {
                        report_fault(&queue, e);
                        return full;
                    }
                }
            }
            debug!("stream terminated");
            _ = queue.send(SlotMessage::End);
            return full;
        }
        match check_index(token, nslots) {
            Ok(index) => {
                if queue.send(SlotMessage::Filled(index)).is_err() {
                    // Collector went away; nothing left to report to.
                    return full;
                }
            }
            Err(e) => {
                report_fault(&queue, e.into());
                return full;
            }
        }
    }
}

fn report_fault(queue: &Sender<SlotMessage>, fault: SessionError) {
    error!(%fault, "listener stopping on fault");
    _ = queue.send(SlotMessage::Fault(fault));
}

fn read_final_slot(full: &mut TokenReader, nslots: u32) -> Result<u32, SessionError> {
    let token = full.recv().map_err(SessionError::from)?;
    if token == FINISH_TOKEN {
        return Err(ProtocolError::MalformedTermination.into());
    }
    check_index(token, nslots).map_err(SessionError::from)
}

fn check_index(token: i32, nslots: u32) -> Result<u32, ProtocolError> {
    if token >= 0 && (token as u32) < nslots {
        Ok(token as u32)
    } else {
        Err(ProtocolError::SlotIndexOutOfRange {
            index: token,
            nslots,
        })
    }
}
