// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Traces a program under the valgrind engine and logs event totals.
//!
//! Usage: count-events <program> [args...]

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    use weir_backend::{dispatch, CountingBackend};
    use weir_frontend::{LaunchSpec, ValgrindFrontend};

    tracing_subscriber::fmt::init();

    let program: Vec<String> = std::env::args().skip(1).collect();
    anyhow::ensure!(!program.is_empty(), "usage: count-events <program> [args...]");

    let spec = LaunchSpec::new(program);
    let mut frontend = ValgrindFrontend::launch(&spec)?;

    let mut backend = CountingBackend::new();
    dispatch::drain(frontend.session_mut(), &mut backend)?;
    backend.log_totals();

    frontend.shutdown()?;
    Ok(())
}

#[cfg(not(unix))]
fn main() {}
