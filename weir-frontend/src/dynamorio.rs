// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Launches the DynamoRIO-based engine, which shards events from a
//! multithreaded program over several independent channels.
//!
//! Each channel gets its own region and fifo pair, suffixed by channel
//! id, and the client opens every set at startup in ascending id order,
//! matching the order the collector connects them. Unlike the valgrind
//! engine this one announces every filled slot normally and ends each
//! channel with a bare termination token.

use std::path::Path;
use std::process::{Child, Command, ExitStatus};

use anyhow::Context;
use tempfile::TempDir;
use tracing::{debug, warn};

use weir_ipc::cleanup::{self, InterruptGuard};
use weir_ipc::config;
use weir_ipc::{ChannelPaths, FinishHandshake, PendingSession, Session, SessionConfig};

use crate::launch::{exe_dir, LaunchSpec};

const CLIENT_LIB: &str = "libweirdr.so";

pub struct DynamoRioFrontend {
    sessions: Vec<Session>,
    child: Child,
    ipc_dir: TempDir,
    _interrupt: InterruptGuard,
}

impl DynamoRioFrontend {
    /// Sets up `channels` independent exchanges, starts the engine, and
    /// blocks until the client has connected every one of them.
    pub fn launch(spec: &LaunchSpec, channels: u32) -> anyhow::Result<Self> {
        anyhow::ensure!(!spec.program.is_empty(), "no program to trace");
        anyhow::ensure!(channels >= 1, "need at least one event channel");

        let ipc_dir = config::create_ipc_dir()?;
        let all_paths: Vec<ChannelPaths> = (0..channels)
            .map(|id| ChannelPaths::in_dir_for(ipc_dir.path(), id))
            .collect();
        let files: Vec<&Path> = all_paths.iter().flat_map(|paths| paths.files()).collect();
        let interrupt = cleanup::register(&files, &[ipc_dir.path()])?;

        let pendings: Vec<PendingSession> = all_paths
            .iter()
            .map(|paths| {
                Session::prepare(
                    paths.clone(),
                    SessionConfig {
                        nslots: spec.nslots,
                        handshake: FinishHandshake::Plain,
                    },
                )
            })
            .collect::<anyhow::Result<_>>()?;

        let child = spawn_engine(spec, ipc_dir.path(), channels)?;
        debug!(pid = child.id(), channels, "dynamorio engine spawned");
        let sessions = pendings
            .into_iter()
            .map(PendingSession::connect)
            .collect::<anyhow::Result<_>>()?;

        Ok(DynamoRioFrontend {
            sessions,
            child,
            ipc_dir,
            _interrupt: interrupt,
        })
    }

    pub fn sessions_mut(&mut self) -> &mut [Session] {
        &mut self.sessions
    }

    /// Joins every listener, reaps the engine, and removes the run
    /// directory. Call once all channels have been drained.
    pub fn shutdown(self) -> anyhow::Result<ExitStatus> {
        let DynamoRioFrontend {
            sessions,
            mut child,
            ipc_dir,
            _interrupt,
        } = self;
        for session in sessions {
            session.shutdown()?;
        }
        let status = child.wait().context("failed to reap dynamorio engine")?;
        if !status.success() {
            warn!(%status, "dynamorio engine exited abnormally");
        }
        drop(ipc_dir);
        Ok(status)
    }
}

fn spawn_engine(spec: &LaunchSpec, ipc_dir: &Path, channels: u32) -> anyhow::Result<Child> {
    let exe_dir = exe_dir()?;
    let engine = exe_dir.join("dr/bin64/drrun");
    let client = exe_dir.join(CLIENT_LIB);

    let mut cmd = Command::new(&engine);
    cmd.arg("-root").arg(exe_dir.join("dr"));
    cmd.arg("-c").arg(&client);
    cmd.arg("--ipc-dir").arg(ipc_dir);
    cmd.arg("--channels").arg(channels.to_string());
    cmd.args(spec.toggles.engine_args());
    cmd.args(&spec.engine_args);
    cmd.arg("--");
    cmd.args(&spec.program);

    cmd.spawn()
        .with_context(|| format!("failed to launch {}", engine.display()))
}
