// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Removal of exchange artifacts when the collector is interrupted.
//!
//! Fifo nodes and the region file live under a tmpfs root that nothing
//! sweeps, so a collector killed with ctrl-c would otherwise leave them
//! behind until reboot. Frontends register the run's paths here; a
//! SIGINT or SIGTERM unlinks them before the process re-raises and dies.
//!
//! The handler can only touch async-signal-safe calls, so the paths are
//! prepared as `CString`s up front and published through an atomic
//! pointer the handler reads without locking.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering::SeqCst};

use anyhow::Context;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet};

struct TeardownPaths {
    files: Vec<CString>,
    dirs: Vec<CString>,
}

static INTERRUPT_PATHS: AtomicPtr<TeardownPaths> = AtomicPtr::new(ptr::null_mut());
static HANDLERS_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Unregisters the paths on drop. Keep it alive for the whole run.
pub struct InterruptGuard(());

/// Publishes the paths a fatal interrupt should remove. Files are
/// unlinked before directories so the directories are empty when their
/// turn comes. A process holds one registration at a time; registering
/// again replaces the previous set.
pub fn register(files: &[&Path], dirs: &[&Path]) -> anyhow::Result<InterruptGuard> {
    install_handlers()?;
    let prepared = TeardownPaths {
        files: to_cstrings(files)?,
        dirs: to_cstrings(dirs)?,
    };
    let fresh = Box::into_raw(Box::new(prepared));
    let old = INTERRUPT_PATHS.swap(fresh, SeqCst);
    if !old.is_null() {
        // Safety: non-null values only ever come from Box::into_raw above.
        drop(unsafe { Box::from_raw(old) });
    }
    Ok(InterruptGuard(()))
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        let old = INTERRUPT_PATHS.swap(ptr::null_mut(), SeqCst);
        if !old.is_null() {
            // Safety: as in `register`.
            drop(unsafe { Box::from_raw(old) });
        }
    }
}

fn to_cstrings(paths: &[&Path]) -> anyhow::Result<Vec<CString>> {
    paths
        .iter()
        .map(|p| {
            CString::new(p.as_os_str().as_bytes())
                .with_context(|| format!("path {} contains a NUL byte", p.display()))
        })
        .collect()
}

fn install_handlers() -> anyhow::Result<()> {
    if HANDLERS_INSTALLED
        .compare_exchange(false, true, SeqCst, SeqCst)
        .is_err()
    {
        return Ok(());
    }
    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(signal::Signal::SIGINT, &action)
            .context("failed to install SIGINT handler")?;
        signal::sigaction(signal::Signal::SIGTERM, &action)
            .context("failed to install SIGTERM handler")?;
    }
    Ok(())
}

extern "C" fn on_interrupt(signum: libc::c_int) {
    // Async-signal-safe territory: no allocation, no locks, no dealloc.
    // Swapping to null also keeps a racing guard drop off this memory.
    let stored = INTERRUPT_PATHS.swap(ptr::null_mut(), SeqCst);
    if !stored.is_null() {
        remove_paths(unsafe { &*stored });
    }
    unsafe {
        libc::signal(signum, libc::SIG_DFL);
        libc::raise(signum);
    }
}

fn remove_paths(paths: &TeardownPaths) {
    for file in &paths.files {
        _ = unsafe { libc::unlink(file.as_ptr()) };
    }
    for dir in &paths.dirs {
        _ = unsafe { libc::rmdir(dir.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(miri, ignore)]
    fn files_unlink_before_their_directories() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("run");
        std::fs::create_dir(&dir).unwrap();
        let file = dir.join("shmem");
        std::fs::write(&file, b"x").unwrap();

        let prepared = TeardownPaths {
            files: to_cstrings(&[&file]).unwrap(),
            dirs: to_cstrings(&[&dir]).unwrap(),
        };
        remove_paths(&prepared);

        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn guard_drop_clears_registration() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("shmem");
        std::fs::write(&file, b"x").unwrap();

        let guard = register(&[&file], &[]).unwrap();
        assert!(!INTERRUPT_PATHS.load(SeqCst).is_null());
        drop(guard);
        assert!(INTERRUPT_PATHS.load(SeqCst).is_null());
        assert!(file.exists());
    }

    #[test]
    fn nul_byte_in_path_is_rejected() {
        use std::ffi::OsStr;
        let bad = Path::new(OsStr::from_bytes(b"run\0dir"));
        assert!(to_cstrings(&[bad]).is_err());
    }
}
