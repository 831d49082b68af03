// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Preflight warnings for traced binaries.
//!
//! The valgrind engine intercepts synchronization through function
//! wrapping, which only lines up with the OpenMP runtime of one blessed
//! GCC release. None of this stops a run; it just tells the user up
//! front why sync events may be missing from the stream.

use std::ffi::OsString;
use std::path::Path;

use goblin::elf::Elf;
use tracing::warn;

/// The one GCC release whose OpenMP runtime the wrappers understand.
const GCC_SAFE_VERSION: &str = "4.9.2";

const WRAPPER_LIB: &str = "libweirwrap.so";

/// Warns if `binary` was not built by the blessed GCC, based on the
/// compiler stamp in its ELF `.comment` section.
pub fn gcc_toolchain_advisory(binary: &Path) {
    let found = detect_gcc_version(binary);
    if found.as_deref() == Some(GCC_SAFE_VERSION) {
        return;
    }
    warn!("'{}':", binary.display());
    warn!("GCC version {GCC_SAFE_VERSION} not detected");
    match &found {
        Some(version) => warn!("GCC version {version} found"),
        None => warn!("GCC version could not be detected"),
    }
    warn!("OpenMP synchronization events may not be captured");
    warn!("Pthread synchronization events are probably fine");
}

fn detect_gcc_version(binary: &Path) -> Option<String> {
    let bytes = std::fs::read(binary).ok()?;
    let elf = Elf::parse(&bytes).ok()?;
    for header in &elf.section_headers {
        if elf.shdr_strtab.get_at(header.sh_name) == Some(".comment") {
            let range = header.file_range()?;
            return parse_comment(bytes.get(range)?);
        }
    }
    None
}

/// Pulls the version out of a compiler stamp like `GCC: (GNU) 4.9.2`.
fn parse_comment(data: &[u8]) -> Option<String> {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let comment = std::str::from_utf8(&data[..end]).ok()?;
    let pos = comment.rfind(')')?;
    let version = comment.get(pos + 2..)?;
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// The LD_PRELOAD value the traced process should run with so the
/// interception wrapper is loaded, appended to any preload the user
/// already has. `None`, with a warning, if the wrapper is not installed
/// next to the collector.
pub(crate) fn wrapper_preload(exe_dir: &Path) -> Option<OsString> {
    let wrapper = exe_dir.join(WRAPPER_LIB);
    if !wrapper.exists() {
        warn!("'{WRAPPER_LIB}' not found");
        warn!("synchronization events will not be detected without the wrapper library loaded");
        return None;
    }
    let mut preload = OsString::new();
    if let Some(existing) = std::env::var_os("LD_PRELOAD") {
        if !existing.is_empty() {
            preload.push(existing);
            preload.push(":");
        }
    }
    preload.push(wrapper);
    Some(preload)
}
