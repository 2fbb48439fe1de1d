// In: src/chunk_iter/selection.rs

//! Per-store, per-spectral-window channel selection tables.
//!
//! Entries are either set explicitly by the caller or defaulted lazily to "all
//! channels, one group" the first time iteration reaches a spectral window. The
//! origin is recorded so a caller can tell the two apart.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisIterError};
use crate::types::ChannelSlice;

/// `{start, width, stride, groups}` for one spectral window.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSelection {
    pub start: usize,
    pub width: usize,
    pub stride: usize,
    pub groups: usize,
}

impl ChannelSelection {
    /// Builds a selection. A non-positive `stride` is treated as 1.
    pub fn new(start: usize, width: usize, stride: i64, groups: usize) -> Self {
        Self {
            start,
            width,
            stride: usize::try_from(stride).ok().filter(|&s| s > 0).unwrap_or(1),
            groups,
        }
    }

    /// Every channel in one group.
    pub fn whole(n_chan: usize) -> Self {
        Self::new(0, n_chan, 1, 1)
    }

    /// The slice read for output group `group`. Consecutive groups start
    /// `width` channels apart, whatever the stride.
    pub fn slice_for_group(&self, group: usize) -> ChannelSlice {
        ChannelSlice::new(self.start + group * self.width, self.width, self.stride)
    }

    /// Checks every group's slice fits within `n_chan` channels.
    pub fn validate(&self, spw: usize, n_chan: usize) -> Result<()> {
        let fail = |reason: String| Err(VisIterError::ChannelSelection { spw, reason });
        if self.width == 0 {
            return fail("width must be at least one channel".to_string());
        }
        if self.groups == 0 {
            return fail("at least one output group is required".to_string());
        }
        match self.last_group_end() {
            Some(end) if end <= n_chan => Ok(()),
            Some(end) => fail(format!(
                "group {} ends at channel {end} but the window has {n_chan} channels",
                self.groups - 1
            )),
            None => fail("selection extends past the addressable channel range".to_string()),
        }
    }

    /// One past the last channel of the last group, or `None` on overflow.
    fn last_group_end(&self) -> Option<usize> {
        let start = (self.groups - 1)
            .checked_mul(self.width)?
            .checked_add(self.start)?;
        (self.width - 1)
            .checked_mul(self.stride)?
            .checked_add(start)?
            .checked_add(1)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrigin {
    Explicit,
    Defaulted,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionEntry {
    pub selection: ChannelSelection,
    pub origin: SelectionOrigin,
}

/// Growable selection tables, one per store, indexed by spectral window id.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    tables: Vec<Vec<Option<SelectionEntry>>>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, store: usize, spw: usize) -> &mut Option<SelectionEntry> {
        if self.tables.len() <= store {
            self.tables.resize_with(store + 1, Vec::new);
        }
        let table = &mut self.tables[store];
        if table.len() <= spw {
            table.resize(spw + 1, None);
        }
        &mut table[spw]
    }

    /// Records an explicit selection, replacing whatever was there.
    pub fn set(&mut self, store: usize, spw: usize, selection: ChannelSelection) {
        *self.slot(store, spw) = Some(SelectionEntry {
            selection,
            origin: SelectionOrigin::Explicit,
        });
    }

    pub fn get(&self, store: usize, spw: usize) -> Option<&SelectionEntry> {
        self.tables.get(store)?.get(spw)?.as_ref()
    }

    /// Returns the entry for `spw`, defaulting it to every channel if absent.
    pub fn get_or_default(&mut self, store: usize, spw: usize, n_chan: usize) -> SelectionEntry {
        *self.slot(store, spw).get_or_insert_with(|| {
            log::debug!("store {store}: defaulting selection for spectral window {spw} ({n_chan} channels)");
            SelectionEntry {
                selection: ChannelSelection::whole(n_chan),
                origin: SelectionOrigin::Defaulted,
            }
        })
    }

    /// `Some(true)` if the entry was filled in lazily, `None` if there is no entry.
    pub fn is_defaulted(&self, store: usize, spw: usize) -> Option<bool> {
        self.get(store, spw)
            .map(|entry| entry.origin == SelectionOrigin::Defaulted)
    }

    pub fn is_explicit(&self, store: usize, spw: usize) -> bool {
        self.is_defaulted(store, spw) == Some(false)
    }

    pub fn has_explicit(&self, store: usize) -> bool {
        self.tables.get(store).is_some_and(|table| {
            table
                .iter()
                .flatten()
                .any(|entry| entry.origin == SelectionOrigin::Explicit)
        })
    }

    /// All entries of `store`, explicit and defaulted, by spectral window id.
    pub fn entries(&self, store: usize) -> Vec<(usize, SelectionEntry)> {
        self.tables
            .get(store)
            .map(|table| {
                table
                    .iter()
                    .enumerate()
                    .filter_map(|(spw, entry)| entry.map(|e| (spw, e)))
                    .collect()
            })
            .unwrap_or_default()
    }
}
