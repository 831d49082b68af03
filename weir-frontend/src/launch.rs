// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Context;

use weir_ipc::layout::DEFAULT_SLOT_COUNT;

/// Which event categories the engine is asked to generate. Defaults to
/// the workload-characterization set; control flow, basic blocks, and
/// function markers are opt-in because of their volume.
#[derive(Clone, Copy, Debug)]
pub struct EventToggles {
    pub memory: bool,
    pub compute: bool,
    pub control_flow: bool,
    pub sync: bool,
    pub instructions: bool,
    pub basic_blocks: bool,
    pub functions: bool,
}

impl Default for EventToggles {
    fn default() -> Self {
        EventToggles {
            memory: true,
            compute: true,
            control_flow: false,
            sync: true,
            instructions: true,
            basic_blocks: false,
            functions: false,
        }
    }
}

impl EventToggles {
    pub(crate) fn engine_args(&self) -> Vec<String> {
        fn yes_no(on: bool) -> &'static str {
            if on {
                "yes"
            } else {
                "no"
            }
        }
        vec![
            format!("--gen-mem={}", yes_no(self.memory)),
            format!("--gen-comp={}", yes_no(self.compute)),
            format!("--gen-cf={}", yes_no(self.control_flow)),
            format!("--gen-sync={}", yes_no(self.sync)),
            format!("--gen-instr={}", yes_no(self.instructions)),
            format!("--gen-bb={}", yes_no(self.basic_blocks)),
            format!("--gen-fn={}", yes_no(self.functions)),
        ]
    }
}

/// Everything needed to put a program under an engine.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    /// The traced program and its own arguments. Never empty.
    pub program: Vec<String>,
    /// Extra arguments passed through to the engine untouched.
    pub engine_args: Vec<String>,
    pub toggles: EventToggles,
    /// Slots per channel in the shared region.
    pub nslots: u32,
}

impl LaunchSpec {
    pub fn new<I, S>(program: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LaunchSpec {
            program: program.into_iter().map(Into::into).collect(),
            engine_args: Vec::new(),
            toggles: EventToggles::default(),
            nslots: DEFAULT_SLOT_COUNT,
        }
    }
}

/// Engines and their support libraries are installed next to the
/// collector binary, so everything is resolved relative to it.
pub(crate) fn exe_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("couldn't find executable path")?;
    let dir = exe
        .parent()
        .context("executable path has no parent directory")?;
    Ok(dir.to_path_buf())
}
