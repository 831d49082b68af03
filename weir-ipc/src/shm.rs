// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! File-backed shared memory region holding the slot pool.
//!
//! The collector creates the region inside the run's ipc directory and the
//! engine maps the same file from its side. Which process may touch a slot
//! at any moment is governed entirely by the token fifos; the region itself
//! carries no synchronization.

use std::fs::OpenOptions;
use std::io;
use std::mem::size_of;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

use crate::layout::EventSlot;

const SLOT_STRIDE: usize = size_of::<EventSlot>();

fn page_aligned_size(size: usize) -> usize {
    let page_size = page_size::get();
    // round up to nearest page
    ((size - 1) & !(page_size - 1)) + page_size
}

/// A mapped slot pool. The creating side owns the backing file and unlinks
/// it on drop; the opening side leaves it in place.
pub struct SharedRegion {
    ptr: NonNull<libc::c_void>,
    len: usize,
    nslots: u32,
    path: PathBuf,
    owned: bool,
}

impl SharedRegion {
    /// Creates the backing file sized for `nslots` slots and maps it.
    pub fn create(path: &Path, nslots: u32) -> io::Result<Self> {
        if nslots == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "slot pool must hold at least one slot",
            ));
        }
        let len = page_aligned_size(nslots as usize * SLOT_STRIDE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;
        Self::map(&file, len, nslots, path, true)
    }

    /// Maps an existing region created by the peer. The slot count is
    /// recovered from the file length.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        let nslots = len / SLOT_STRIDE;
        if nslots == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "region file too small to hold a slot",
            ));
        }
        Self::map(&file, len, nslots as u32, path, false)
    }

    fn map(
        file: &std::fs::File,
        len: usize,
        nslots: u32,
        path: &Path,
        owned: bool,
    ) -> io::Result<Self> {
        let length = NonZeroUsize::new(len)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty region"))?;
        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                file,
                0,
            )?
        };
        Ok(SharedRegion {
            ptr,
            len,
            nslots,
            path: path.to_path_buf(),
            owned,
        })
    }

    pub fn nslots(&self) -> u32 {
        self.nslots
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn slot_ptr(&self, index: u32) -> *mut EventSlot {
        // Callers hold a protocol token for `index`; handing out a slot the
        // pool does not contain is a bug in this process, not a peer fault.
        assert!(
            index < self.nslots,
            "slot {index} outside pool of {} slots",
            self.nslots
        );
        let base = self.ptr.as_ptr() as *mut u8;
        unsafe { base.add(index as usize * SLOT_STRIDE) as *mut EventSlot }
    }

    pub fn slot(&self, index: u32) -> &EventSlot {
        // Safety: within the mapping by the bounds assert, page alignment
        // exceeds the slot's, and the mapping outlives the borrow.
        unsafe { &*self.slot_ptr(index) }
    }

    pub fn slot_mut(&mut self, index: u32) -> &mut EventSlot {
        // Safety: as in `slot`, plus `&mut self` keeps this view unique
        // within the process.
        unsafe { &mut *self.slot_ptr(index) }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe {
            _ = munmap(self.ptr, self.len);
        }
        if self.owned {
            _ = std::fs::remove_file(&self.path);
        }
    }
}

unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{EventKind, EventRecord, EVENT_PAYLOAD};

    #[test]
    #[cfg_attr(miri, ignore)]
    fn create_then_open_shares_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shmem");

        let mut writer = SharedRegion::create(&path, 2).unwrap();
        assert_eq!(writer.nslots(), 2);

        let slot = writer.slot_mut(1);
        slot.clear();
        let off = slot.names.intern("target").unwrap();
        let mut payload = [0u8; EVENT_PAYLOAD];
        payload[..4].copy_from_slice(&off.to_ne_bytes());
        assert!(slot.push(EventRecord::new(EventKind::Context, payload)));

        let reader = SharedRegion::open(&path).unwrap();
        assert_eq!(reader.nslots(), 2);
        let seen = reader.slot(1);
        assert_eq!(seen.records().len(), 1);
        assert_eq!(seen.names.lookup(off), Some("target"));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn fresh_region_reads_as_empty_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shmem");
        let region = SharedRegion::create(&path, 3).unwrap();
        for i in 0..3 {
            assert!(region.slot(i).records().is_empty());
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn creator_unlinks_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shmem");
        {
            let _region = SharedRegion::create(&path, 1).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn opener_leaves_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shmem");
        let _owner = SharedRegion::create(&path, 1).unwrap();
        {
            let _view = SharedRegion::open(&path).unwrap();
        }
        assert!(path.exists());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn zero_slots_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = SharedRegion::create(&dir.path().join("shmem"), 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn open_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shmem");
        std::fs::write(&path, b"stub").unwrap();
        let err = SharedRegion::open(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    #[should_panic(expected = "outside pool")]
    fn out_of_range_slot_panics() {
        let dir = tempfile::tempdir().unwrap();
        let region = SharedRegion::create(&dir.path().join("shmem"), 1).unwrap();
        let _ = region.slot(1);
    }
}
