// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;

/// Failures of the token fifos that signal buffer ownership between the
/// collector and the instrumentation engine.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The peer closed its end of the fifo before the termination token
    /// arrived. Usually means the engine crashed mid-run.
    #[error("unexpected end of fifo")]
    UnexpectedEof,
    #[error("failed to read from fifo: {0}")]
    Read(#[source] io::Error),
    #[error("failed to write to fifo: {0}")]
    Write(#[source] io::Error),
}

/// The engine sent something the buffer exchange protocol does not allow.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A slot index token outside `0..nslots`.
    #[error("slot index {index} outside pool of {nslots} slots")]
    SlotIndexOutOfRange { index: i32, nslots: u32 },
    /// The termination sequence promised a final filled slot but none
    /// followed.
    #[error("termination handshake carried no final slot index")]
    MalformedTermination,
}

/// Anything that can take down a live session. Once one of these is
/// returned from an acquire, the session is terminal.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("event channel failed: {0}")]
    Channel(#[from] ChannelError),
    #[error("engine violated the exchange protocol: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("listener thread exited without reporting termination")]
    ListenerGone,
}

impl ChannelError {
    pub(crate) fn from_read(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ChannelError::UnexpectedEof
        } else {
            ChannelError::Read(e)
        }
    }
}
