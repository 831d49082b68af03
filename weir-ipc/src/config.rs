// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Where the exchange artifacts live on disk.
//!
//! Every run gets a private directory under a tmpfs-backed root so slot
//! traffic never touches a real disk. The root defaults to `/dev/shm` and
//! can be pointed elsewhere with `WEIR_SHM_DIR` on systems that mount
//! tmpfs somewhere unusual.

use std::path::PathBuf;

use anyhow::Context;
use tempfile::TempDir;

pub const SHM_DIR_ENV: &str = "WEIR_SHM_DIR";
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

const IPC_DIR_PREFIX: &str = "weir-";

pub mod parse_env {
    use std::env;

    pub fn str_not_empty(name: &str) -> Option<String> {
        env::var(name).ok().filter(|s| !s.is_empty())
    }
}

/// The directory new run directories are created under.
pub fn shm_root() -> PathBuf {
    parse_env::str_not_empty(SHM_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SHM_DIR))
}

/// Creates a fresh private run directory. The returned handle removes the
/// directory and anything left inside it on drop.
pub fn create_ipc_dir() -> anyhow::Result<TempDir> {
    let root = shm_root();
    let meta = std::fs::metadata(&root).with_context(|| {
        format!(
            "shared memory root {} does not exist; set {} to a tmpfs mount",
            root.display(),
            SHM_DIR_ENV
        )
    })?;
    anyhow::ensure!(
        meta.is_dir(),
        "shared memory root {} is not a directory",
        root.display()
    );
    tempfile::Builder::new()
        .prefix(IPC_DIR_PREFIX)
        .tempdir_in(&root)
        .with_context(|| format!("failed to create run directory under {}", root.display()))
}
