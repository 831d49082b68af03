// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg(unix)]

//! Frontends that put a program under an instrumentation engine and hand
//! the resulting event channels to the collector.
//!
//! A frontend owns everything with a lifetime: the run directory, the
//! engine process, the interrupt registration, and the sessions. The two
//! engines differ only in how they are launched and which termination
//! handshake they speak; the exchange protocol is identical.

mod advisory;
mod dynamorio;
mod launch;
mod valgrind;

pub use advisory::gcc_toolchain_advisory;
pub use dynamorio::DynamoRioFrontend;
pub use launch::{EventToggles, LaunchSpec};
pub use valgrind::ValgrindFrontend;
