use std::collections::BTreeMap;

use plume_store::{BlockStore, StoreResult};
use plume_types::{Cid, CidSet, Tid};
use serde::{Deserialize, Serialize};

use crate::config::TableThresholds;
use crate::error::TableError;

/// Capacity class of a [`SortedTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableTier {
    Small,
    Medium,
    Large,
    Xl,
}

impl TableTier {
    /// The tier a 4-way merge of this tier produces; `None` for `Xl`.
    pub fn next(&self) -> Option<TableTier> {
        match self {
            Self::Small => Some(Self::Medium),
            Self::Medium => Some(Self::Large),
            Self::Large => Some(Self::Xl),
            Self::Xl => None,
        }
    }
}

/// One `(tid, cid)` pair from a time-ordered collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Entry {
    pub tid: Tid,
    pub cid: Cid,
}

/// A size-tiered sorted table mapping identifiers to content.
///
/// Tables are plain values; [`SortedTable::put`] writes one and returns its
/// CID. The stored block is `{tier, entries}` with entries keyed by the
/// identifier's text form, so block order equals identifier order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedTable {
    tier: TableTier,
    entries: BTreeMap<Tid, Cid>,
}

impl SortedTable {
    /// An empty small table.
    pub fn create() -> Self {
        Self::with_tier(TableTier::Small)
    }

    pub fn with_tier(tier: TableTier) -> Self {
        Self {
            tier,
            entries: BTreeMap::new(),
        }
    }

    pub async fn load(store: &BlockStore, cid: &Cid) -> StoreResult<Self> {
        store.get(cid).await
    }

    pub async fn put(&self, store: &BlockStore) -> StoreResult<Cid> {
        store.put(self).await
    }

    pub fn tier(&self) -> TableTier {
        self.tier
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` once the entry count reaches the tier's threshold.
    pub fn is_full(&self, thresholds: &TableThresholds) -> bool {
        self.entries.len() >= thresholds.for_tier(self.tier)
    }

    pub fn oldest_tid(&self) -> Option<Tid> {
        self.entries.keys().next().copied()
    }

    pub fn newest_tid(&self) -> Option<Tid> {
        self.entries.keys().next_back().copied()
    }

    pub fn get_entry(&self, tid: &Tid) -> Option<Cid> {
        self.entries.get(tid).copied()
    }

    pub fn has_entry(&self, tid: &Tid) -> bool {
        self.entries.contains_key(tid)
    }

    pub fn add_entry(&mut self, tid: Tid, cid: Cid) -> Result<(), TableError> {
        if self.entries.contains_key(&tid) {
            return Err(TableError::DuplicateKey(tid));
        }
        self.entries.insert(tid, cid);
        Ok(())
    }

    pub fn edit_entry(&mut self, tid: Tid, cid: Cid) -> Result<(), TableError> {
        match self.entries.get_mut(&tid) {
            Some(slot) => {
                *slot = cid;
                Ok(())
            }
            None => Err(TableError::NotFound(tid)),
        }
    }

    pub fn delete_entry(&mut self, tid: &Tid) -> Result<Cid, TableError> {
        self.entries.remove(tid).ok_or(TableError::NotFound(*tid))
    }

    /// Entries in ascending identifier order.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = Entry> + '_ {
        self.entries.iter().map(|(tid, cid)| Entry {
            tid: *tid,
            cid: *cid,
        })
    }

    pub(crate) fn entry_map(&self) -> &BTreeMap<Tid, Cid> {
        &self.entries
    }

    /// Content CIDs referenced by this table's entries.
    pub fn cids(&self) -> impl Iterator<Item = Cid> + '_ {
        self.entries.values().copied()
    }

    /// Referenced content CIDs absent from `store`.
    pub async fn missing_cids(&self, store: &BlockStore) -> StoreResult<CidSet> {
        let mut missing = CidSet::new();
        for cid in self.entries.values() {
            if !store.has(cid).await? {
                missing.add(*cid);
            }
        }
        Ok(missing)
    }

    /// Merge equal-tier tables into one table of the next tier.
    ///
    /// Each input is already sorted, so this is a k-way union. A key present
    /// in two inputs is reported rather than silently dropped.
    pub fn merge(tables: &[SortedTable]) -> Result<SortedTable, TableError> {
        let first = tables.first().ok_or(TableError::NothingToMerge)?;
        let tier = first.tier;
        if let Some(other) = tables.iter().find(|t| t.tier != tier) {
            return Err(TableError::TierMismatch {
                expected: tier,
                found: other.tier,
            });
        }
        let next = tier.next().ok_or(TableError::MaxTier(tier))?;

        let mut cursors: Vec<_> = tables.iter().map(|t| t.entries.iter().peekable()).collect();
        let mut merged = SortedTable::with_tier(next);
        loop {
            let smallest = cursors
                .iter_mut()
                .enumerate()
                .filter_map(|(i, c)| c.peek().map(|(tid, _)| (**tid, i)))
                .min();
            let Some((tid, i)) = smallest else { break };
            if let Some((_, cid)) = cursors[i].next() {
                merged.add_entry(tid, *cid)?;
            }
        }
        Ok(merged)
    }
}
