//! Segmented, non-relocating table with a LIFO free list threaded through
//! free entries.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::config::TableConfig;
use crate::error::{trap, ExternalPointerError};
use crate::memory::ExternalPointer;

pub const TABLE_STATS_SCHEMA_VERSION: &str = "x07.extptr.table_stats@0.1.0";

/// The entry every fresh or null slot holds.
pub const NULL_EXTERNAL_POINTER: ExternalPointer = 0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ExternalPointerIndex(u32);

impl ExternalPointerIndex {
    /// Reserved; never returned by allocation.
    pub const NULL: ExternalPointerIndex = ExternalPointerIndex(0);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Truncates a field word to an index, dropping any upper bits.
    pub const fn from_field_word(word: ExternalPointer) -> Self {
        Self(word as u32)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn to_field_word(self) -> ExternalPointer {
        self.0 as ExternalPointer
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ExternalPointerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableStats {
    pub schema_version: &'static str,
    pub capacity: u32,
    pub live_entries: u32,
    pub free_entries: u32,
    pub segments: u32,
    pub max_entries: u32,
}

type Segment = Box<[AtomicUsize]>;

#[derive(Debug)]
struct FreeList {
    head: u32,
    /// One bit per entry below capacity; set while the entry is handed out.
    allocated: Vec<u64>,
}

impl FreeList {
    fn is_allocated(&self, index: u32) -> bool {
        let (word, bit) = bitmap_pos(index);
        self.allocated
            .get(word)
            .map(|w| w & bit != 0)
            .unwrap_or(false)
    }

    fn mark(&mut self, index: u32, on: bool) {
        let (word, bit) = bitmap_pos(index);
        if self.allocated.len() <= word {
            self.allocated.resize(word + 1, 0);
        }
        if on {
            self.allocated[word] |= bit;
        } else {
            self.allocated[word] &= !bit;
        }
    }
}

fn bitmap_pos(index: u32) -> (usize, u64) {
    ((index / 64) as usize, 1u64 << (index % 64))
}

#[derive(Debug)]
pub struct ExternalPointerTable {
    segments: Box<[OnceCell<Segment>]>,
    segment_shift: u32,
    segment_mask: u32,
    max_entries: u32,
    capacity: AtomicU32,
    live: AtomicU32,
    freelist: Mutex<FreeList>,
}

impl ExternalPointerTable {
    /// Panics if `config` does not validate; see [`Self::try_new`].
    pub fn new(config: TableConfig) -> Self {
        match Self::try_new(config) {
            Ok(table) => table,
            Err(err) => panic!("{err:#}"),
        }
    }

    pub fn try_new(config: TableConfig) -> anyhow::Result<Self> {
        config
            .validate()
            .context("invalid external pointer table config")?;
        let segments = (0..config.max_segments())
            .map(|_| OnceCell::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            segments,
            segment_shift: config.segment_shift(),
            segment_mask: config.entries_per_segment - 1,
            max_entries: config.max_entries,
            capacity: AtomicU32::new(0),
            live: AtomicU32::new(0),
            freelist: Mutex::new(FreeList {
                head: 0,
                allocated: Vec::new(),
            }),
        })
    }

    /// Number of addressable entries, including the reserved null entry.
    pub fn capacity(&self) -> u32 {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn live_entries(&self) -> u32 {
        self.live.load(Ordering::Relaxed)
    }

    pub fn allocate(&self) -> ExternalPointerIndex {
        self.try_allocate().unwrap_or_else(|err| trap(err))
    }

    /// Hands out a fresh index holding [`NULL_EXTERNAL_POINTER`].
    pub fn try_allocate(&self) -> Result<ExternalPointerIndex, ExternalPointerError> {
        let mut freelist = self.lock_freelist();
        if freelist.head == 0 {
            self.grow(&mut freelist)?;
        }

        let index = freelist.head;
        let entry = self.entry(index)?;
        freelist.head = entry.load(Ordering::Relaxed) as u32;
        freelist.mark(index, true);
        entry.store(NULL_EXTERNAL_POINTER, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(ExternalPointerIndex(index))
    }

    /// Returns an allocated index to the free list.
    pub fn free(&self, index: ExternalPointerIndex) {
        if let Err(err) = self.try_free(index) {
            trap(err)
        }
    }

    pub fn try_free(&self, index: ExternalPointerIndex) -> Result<(), ExternalPointerError> {
        let mut freelist = self.lock_freelist();
        let entry = self.entry(index.0)?;
        if index.is_null() || !freelist.is_allocated(index.0) {
            return Err(ExternalPointerError::NotAllocated { index: index.0 });
        }
        freelist.mark(index.0, false);
        entry.store(freelist.head as ExternalPointer, Ordering::Relaxed);
        freelist.head = index.0;
        self.live.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_allocated(&self, index: ExternalPointerIndex) -> bool {
        self.lock_freelist().is_allocated(index.0)
    }

    pub fn get(&self, index: ExternalPointerIndex) -> ExternalPointer {
        self.try_get(index).unwrap_or_else(|err| trap(err))
    }

    pub fn try_get(
        &self,
        index: ExternalPointerIndex,
    ) -> Result<ExternalPointer, ExternalPointerError> {
        Ok(self.entry(index.0)?.load(Ordering::Relaxed))
    }

    /// `value` must already be tag-encoded. The null entry cannot be
    /// written.
    pub fn set(&self, index: ExternalPointerIndex, value: ExternalPointer) {
        if let Err(err) = self.try_set(index, value) {
            trap(err)
        }
    }

    pub fn try_set(
        &self,
        index: ExternalPointerIndex,
        value: ExternalPointer,
    ) -> Result<(), ExternalPointerError> {
        let entry = self.entry(index.0)?;
        if index.is_null() {
            return Err(ExternalPointerError::NotAllocated { index: 0 });
        }
        entry.store(value, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> TableStats {
        let capacity = self.capacity();
        let live_entries = self.live_entries();
        TableStats {
            schema_version: TABLE_STATS_SCHEMA_VERSION,
            capacity,
            live_entries,
            // Slot 0 is neither live nor free.
            free_entries: capacity.saturating_sub(live_entries).saturating_sub(1),
            segments: capacity >> self.segment_shift,
            max_entries: self.max_entries,
        }
    }

    fn entry(&self, index: u32) -> Result<&AtomicUsize, ExternalPointerError> {
        let capacity = self.capacity();
        let out_of_range = ExternalPointerError::OutOfRange { index, capacity };
        if index >= capacity {
            return Err(out_of_range);
        }
        let segment = (index >> self.segment_shift) as usize;
        let offset = (index & self.segment_mask) as usize;
        self.segments
            .get(segment)
            .and_then(OnceCell::get)
            .and_then(|entries| entries.get(offset))
            .ok_or(out_of_range)
    }

    /// Adds one segment and threads its entries onto the (empty) free list.
    fn grow(&self, freelist: &mut FreeList) -> Result<(), ExternalPointerError> {
        let start = self.capacity.load(Ordering::Relaxed);
        let segment = (start >> self.segment_shift) as usize;
        let Some(cell) = self.segments.get(segment) else {
            return Err(ExternalPointerError::TableExhausted {
                max_entries: self.max_entries,
            });
        };

        let len = self.segment_mask + 1;
        let end = start + len;
        let entries = cell.get_or_init(|| {
            (start..end)
                .map(|i| {
                    let next = if i + 1 == end { 0 } else { i + 1 };
                    AtomicUsize::new(next as ExternalPointer)
                })
                .collect::<Vec<_>>()
                .into_boxed_slice()
        });
        if start == 0 {
            entries[0].store(NULL_EXTERNAL_POINTER, Ordering::Relaxed);
        }

        freelist.head = if start == 0 { 1 } else { start };
        self.capacity.store(end, Ordering::Release);
        tracing::debug!(
            segment,
            capacity = end,
            max_entries = self.max_entries,
            "external pointer table grew"
        );
        Ok(())
    }

    fn lock_freelist(&self) -> MutexGuard<'_, FreeList> {
        // The free list is consistent between statements, so a panic while the
        // lock was held cannot have left it torn.
        self.freelist.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ExternalPointerTable {
    fn default() -> Self {
        Self::new(TableConfig::default())
    }
}
