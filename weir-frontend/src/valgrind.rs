// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Launches the valgrind-based engine and owns its one event channel.
//!
//! Valgrind serializes the traced program onto a single thread, so this
//! frontend always runs exactly one channel. Its engine ships the last
//! partially filled slot behind the termination token, hence the
//! [`FinishHandshake::FinalSlot`] protocol.

use std::path::Path;
use std::process::{Child, Command, ExitStatus};

use anyhow::Context;
use tempfile::TempDir;
use tracing::{debug, warn};

use weir_ipc::cleanup::{self, InterruptGuard};
use weir_ipc::config;
use weir_ipc::{ChannelPaths, FinishHandshake, Session, SessionConfig};

use crate::advisory;
use crate::launch::{exe_dir, LaunchSpec};

const TOOL_NAME: &str = "weirgrind";

pub struct ValgrindFrontend {
    session: Session,
    child: Child,
    ipc_dir: TempDir,
    _interrupt: InterruptGuard,
}

impl ValgrindFrontend {
    /// Sets up the exchange artifacts, starts valgrind on the traced
    /// program, and blocks until the engine connects.
    pub fn launch(spec: &LaunchSpec) -> anyhow::Result<Self> {
        anyhow::ensure!(!spec.program.is_empty(), "no program to trace");

        let ipc_dir = config::create_ipc_dir()?;
        let paths = ChannelPaths::in_dir(ipc_dir.path());
        let interrupt = cleanup::register(&paths.files(), &[ipc_dir.path()])?;
        let pending = Session::prepare(
            paths,
            SessionConfig {
                nslots: spec.nslots,
                handshake: FinishHandshake::FinalSlot,
            },
        )?;

        advisory::gcc_toolchain_advisory(Path::new(&spec.program[0]));

        let child = spawn_engine(spec, ipc_dir.path())?;
        debug!(pid = child.id(), "valgrind engine spawned");
        let session = pending.connect()?;

        Ok(ValgrindFrontend {
            session,
            child,
            ipc_dir,
            _interrupt: interrupt,
        })
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Joins the listener, reaps the engine, and removes the run
    /// directory. Call once the session has been drained.
    pub fn shutdown(self) -> anyhow::Result<ExitStatus> {
        let ValgrindFrontend {
            session,
            mut child,
            ipc_dir,
            _interrupt,
        } = self;
        session.shutdown()?;
        let status = child.wait().context("failed to reap valgrind engine")?;
        if !status.success() {
            warn!(%status, "valgrind engine exited abnormally");
        }
        drop(ipc_dir);
        Ok(status)
    }
}

fn spawn_engine(spec: &LaunchSpec, ipc_dir: &Path) -> anyhow::Result<Child> {
    let exe_dir = exe_dir()?;
    let engine = exe_dir.join("vg/bin/valgrind");

    let mut cmd = Command::new(&engine);
    // Round robins threads instead of letting one dominate execution.
    cmd.arg("--fair-sched=yes");
    cmd.arg(format!("--tool={TOOL_NAME}"));
    cmd.arg(format!("--ipc-dir={}", ipc_dir.display()));
    cmd.args(spec.toggles.engine_args());
    cmd.args(&spec.engine_args);
    cmd.args(&spec.program);

    // A relocated install confuses valgrind's library lookup, so pin it.
    cmd.env("VALGRIND_LIB", exe_dir.join("vg/lib/valgrind"));
    if let Some(preload) = advisory::wrapper_preload(&exe_dir) {
        cmd.env("LD_PRELOAD", preload);
    }

    cmd.spawn()
        .with_context(|| format!("failed to launch {}", engine.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::LaunchSpec;

    #[test]
    fn launch_rejects_empty_program() {
        let spec = LaunchSpec::new(Vec::<String>::new());
        let err = ValgrindFrontend::launch(&spec).unwrap_err();
        assert!(err.to_string().contains("no program"));
    }
}
