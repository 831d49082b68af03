// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Named pipes carrying slot index tokens between collector and engine.
//!
//! Tokens are native-endian `i32` values. The full fifo flows engine to
//! collector and announces filled slots; the empty fifo flows the other
//! way and returns drained ones. Opens block until the peer arrives,
//! which is the rendezvous that starts a run.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::error::ChannelError;

/// Creates a fifo node readable only by this user. A node left behind by
/// a previous crashed run is removed and recreated rather than reused.
pub fn create(path: &Path) -> io::Result<()> {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR;
    match mkfifo(path, mode) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::EEXIST) => {
            std::fs::remove_file(path)?;
            mkfifo(path, mode).map_err(io::Error::from)
        }
        Err(e) => Err(io::Error::from(e)),
    }
}

/// Receiving half of a token fifo.
pub struct TokenReader {
    file: File,
}

impl TokenReader {
    /// Opens for reading, blocking until a writer opens the same fifo.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(TokenReader { file })
    }

    /// Blocks until a whole token arrives. A peer hangup before or inside
    /// a token surfaces as [`ChannelError::UnexpectedEof`].
    pub fn recv(&mut self) -> Result<i32, ChannelError> {
        let mut buf = [0u8; 4];
        self.file
            .read_exact(&mut buf)
            .map_err(ChannelError::from_read)?;
        Ok(i32::from_ne_bytes(buf))
    }
}

/// Sending half of a token fifo.
pub struct TokenWriter {
    file: File,
}

impl TokenWriter {
    /// Opens for writing, blocking until a reader opens the same fifo.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).open(path)?;
        Ok(TokenWriter { file })
    }

    pub fn send(&self, token: i32) -> Result<(), ChannelError> {
        (&self.file)
            .write_all(&token.to_ne_bytes())
            .map_err(ChannelError::Write)
    }
}
