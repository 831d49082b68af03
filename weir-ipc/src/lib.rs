// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg(unix)]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Buffer exchange between instrumentation engines and the weir collector.
//!
//! An engine observing a program under dynamic binary instrumentation
//! produces trace events far faster than any analysis consumes them, so
//! events cross process boundaries in bulk: the two sides share a pool of
//! large slots in mapped memory and pass slot indices over a pair of named
//! pipes. One pipe announces filled slots, the other returns drained ones,
//! and blocking on those pipes is the only flow control in the system.
//!
//! [`session::Session`] ties the pieces of one such exchange together;
//! [`layout`] pins the slot ABI both sides compile against.

pub mod cleanup;
pub mod config;
mod error;
pub mod fifo;
pub mod layout;
pub mod session;
pub mod shm;

pub use error::{ChannelError, ProtocolError, SessionError};
pub use session::{
    ChannelPaths, EventBuffer, FinishHandshake, PendingSession, Session, SessionConfig,
};
