//! Time-ordered collections built from tiered sorted tables.
//!
//! The collection index maps each table's name (its oldest identifier) to
//! the table's CID. Only the newest table takes inserts. When it fills,
//! runs of four equal-tier tables are merged into one table of the next
//! tier, newest first, and a fresh small table is started.

use std::collections::BTreeMap;

use plume_store::{BlockStore, StoreResult};
use plume_types::{Cid, CidSet, Tid};
use tracing::debug;

use crate::config::TableThresholds;
use crate::error::{CollectionError, CollectionResult, TableError};
use crate::table::{Entry, SortedTable};

/// Tables merged per compaction step.
const MERGE_FAN_IN: usize = 4;

/// A collection of `(tid, cid)` entries ordered by identifier.
#[derive(Clone, Debug)]
pub struct TidCollection {
    store: BlockStore,
    cid: Cid,
    index: BTreeMap<Tid, Cid>,
    thresholds: TableThresholds,
}

impl TidCollection {
    /// Create and persist an empty collection.
    pub async fn create(store: BlockStore, thresholds: TableThresholds) -> CollectionResult<Self> {
        let index = BTreeMap::new();
        let cid = store.put(&index).await?;
        Ok(Self {
            store,
            cid,
            index,
            thresholds,
        })
    }

    pub async fn load(
        store: BlockStore,
        cid: Cid,
        thresholds: TableThresholds,
    ) -> CollectionResult<Self> {
        let index = store.get(&cid).await?;
        Ok(Self {
            store,
            cid,
            index,
            thresholds,
        })
    }

    /// CID of the collection index block.
    pub fn cid(&self) -> Cid {
        self.cid
    }

    /// Table name to table CID.
    pub fn index(&self) -> &BTreeMap<Tid, Cid> {
        &self.index
    }

    pub fn table_count(&self) -> usize {
        self.index.len()
    }

    /// Table names, newest first.
    pub fn table_names(&self) -> Vec<Tid> {
        self.index.keys().rev().copied().collect()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Insert a new entry into the newest table.
    ///
    /// Returns every CID this insert introduced, including any table
    /// produced by compaction.
    pub async fn add_entry(&mut self, tid: Tid, cid: Cid) -> CollectionResult<CidSet> {
        let mut index = self.index.clone();
        let mut new_cids = CidSet::new();
        new_cids.add(cid);

        let (mut table, old_name, floor) = match index.last_key_value() {
            None => (SortedTable::create(), None, None),
            Some((&name, table_cid)) => {
                let table = SortedTable::load(&self.store, table_cid).await?;
                if table.is_full(&self.thresholds) {
                    let floor = table.newest_tid();
                    new_cids.add_set(&compact(&self.store, &mut index).await?);
                    (SortedTable::create(), None, floor)
                } else if table.is_empty() {
                    let floor = newest_before(&self.store, &index, name).await?;
                    (table, Some(name), floor)
                } else {
                    (table, Some(name), None)
                }
            }
        };

        if let Some(floor) = floor {
            if tid <= floor {
                return Err(CollectionError::IdentifierTooOld { tid, floor });
            }
        }
        if let Some(oldest) = table.oldest_tid() {
            if tid < oldest {
                return Err(CollectionError::IdentifierTooOld { tid, floor: oldest });
            }
        }

        table.add_entry(tid, cid)?;
        let name = table.oldest_tid().unwrap_or(tid);
        if let Some(old) = old_name.filter(|old| *old != name) {
            index.remove(&old);
        }
        let table_cid = table.put(&self.store).await?;
        index.insert(name, table_cid);
        new_cids.add(table_cid);

        new_cids.add_set(&self.commit_index(index).await?);
        Ok(new_cids)
    }

    /// Replace the CID stored for an existing identifier.
    pub async fn edit_entry(&mut self, tid: Tid, cid: Cid) -> CollectionResult<CidSet> {
        let (name, mut table) = self.table_for(&tid).await?;
        table.edit_entry(tid, cid).map_err(not_found)?;

        let mut index = self.index.clone();
        let table_cid = table.put(&self.store).await?;
        index.insert(name, table_cid);

        let mut new_cids = CidSet::new();
        new_cids.add(cid).add(table_cid);
        new_cids.add_set(&self.commit_index(index).await?);
        Ok(new_cids)
    }

    /// Remove an identifier.
    ///
    /// An older table emptied by the delete leaves the index. An emptied
    /// newest table stays so its tier is kept; the next insert renames it.
    pub async fn delete_entry(&mut self, tid: &Tid) -> CollectionResult<CidSet> {
        let (name, mut table) = self.table_for(tid).await?;
        table.delete_entry(tid).map_err(not_found)?;

        let mut index = self.index.clone();
        let is_newest = index.last_key_value().map(|(n, _)| *n) == Some(name);
        let mut new_cids = CidSet::new();
        index.remove(&name);
        if !table.is_empty() || is_newest {
            let table_cid = table.put(&self.store).await?;
            index.insert(table.oldest_tid().unwrap_or(name), table_cid);
            new_cids.add(table_cid);
        }

        new_cids.add_set(&self.commit_index(index).await?);
        Ok(new_cids)
    }

    /// Run compaction from the newest table down and persist the result.
    ///
    /// Returns an empty set if nothing merged.
    pub async fn compress_tables(&mut self) -> CollectionResult<CidSet> {
        let mut index = self.index.clone();
        let mut new_cids = compact(&self.store, &mut index).await?;
        if new_cids.is_empty() {
            return Ok(new_cids);
        }
        new_cids.add_set(&self.commit_index(index).await?);
        Ok(new_cids)
    }

    async fn commit_index(&mut self, index: BTreeMap<Tid, Cid>) -> CollectionResult<CidSet> {
        let cid = self.store.put(&index).await?;
        self.index = index;
        self.cid = cid;
        let mut new_cids = CidSet::new();
        new_cids.add(cid);
        Ok(new_cids)
    }

    /// The table whose name is the greatest name not newer than `tid`.
    async fn table_for(&self, tid: &Tid) -> CollectionResult<(Tid, SortedTable)> {
        let (name, table_cid) = self
            .index
            .range(..=*tid)
            .next_back()
            .ok_or_else(|| CollectionError::NotFound(tid.to_string()))?;
        let table = SortedTable::load(&self.store, table_cid).await?;
        Ok((*name, table))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_entry(&self, tid: &Tid) -> CollectionResult<Option<Cid>> {
        match self.index.range(..=*tid).next_back() {
            Some((_, table_cid)) => {
                let table = SortedTable::load(&self.store, table_cid).await?;
                Ok(table.get_entry(tid))
            }
            None => Ok(None),
        }
    }

    /// Up to `count` entries, newest first, strictly older than `from`
    /// when given.
    pub async fn get_entries(&self, count: usize, from: Option<Tid>) -> CollectionResult<Vec<Entry>> {
        let names: Vec<&Cid> = match from {
            Some(from) => self.index.range(..=from).rev().map(|(_, c)| c).collect(),
            None => self.index.values().rev().collect(),
        };
        let mut out = Vec::with_capacity(count.min(64));
        for table_cid in names {
            if out.len() >= count {
                break;
            }
            let table = SortedTable::load(&self.store, table_cid).await?;
            let remaining = count - out.len();
            out.extend(
                table
                    .entries()
                    .rev()
                    .filter(|e| from.map_or(true, |f| e.tid < f))
                    .take(remaining),
            );
        }
        Ok(out)
    }

    /// Every entry, oldest first.
    pub async fn get_all_entries(&self) -> CollectionResult<Vec<Entry>> {
        let mut out = Vec::new();
        for table_cid in self.index.values() {
            let table = SortedTable::load(&self.store, table_cid).await?;
            out.extend(table.entries());
        }
        Ok(out)
    }

    /// Every block reachable from this collection: the index, its tables,
    /// and the entry contents.
    pub async fn cids(&self) -> CollectionResult<CidSet> {
        let mut set = CidSet::new();
        set.add(self.cid);
        for table_cid in self.index.values() {
            set.add(*table_cid);
            let table = SortedTable::load(&self.store, table_cid).await?;
            set.extend(table.cids());
        }
        Ok(set)
    }

    /// Blocks reachable from the collection at `cid` that `store` lacks.
    ///
    /// Stops descending at the first absent block on each path.
    pub async fn missing_cids(store: &BlockStore, cid: &Cid) -> StoreResult<CidSet> {
        let mut missing = CidSet::new();
        if !store.has(cid).await? {
            missing.add(*cid);
            return Ok(missing);
        }
        let index: BTreeMap<Tid, Cid> = store.get(cid).await?;
        for table_cid in index.values() {
            if !store.has(table_cid).await? {
                missing.add(*table_cid);
                continue;
            }
            let table = SortedTable::load(store, table_cid).await?;
            missing.add_set(&table.missing_cids(store).await?);
        }
        Ok(missing)
    }
}

fn not_found(err: TableError) -> CollectionError {
    match err {
        TableError::NotFound(tid) => CollectionError::NotFound(tid.to_string()),
        other => other.into(),
    }
}

/// Newest identifier stored in any table older than `name`.
async fn newest_before(
    store: &BlockStore,
    index: &BTreeMap<Tid, Cid>,
    name: Tid,
) -> CollectionResult<Option<Tid>> {
    for table_cid in index.range(..name).rev().map(|(_, c)| c) {
        let table = SortedTable::load(store, table_cid).await?;
        if let Some(newest) = table.newest_tid() {
            return Ok(Some(newest));
        }
    }
    Ok(None)
}

/// Merge runs of equal-tier tables starting at the newest.
///
/// Cascades happen in memory. Only the final merged table is written, and
/// `index` is updated to reference it in place of its inputs.
async fn compact(store: &BlockStore, index: &mut BTreeMap<Tid, Cid>) -> CollectionResult<CidSet> {
    let names: Vec<Tid> = index.keys().rev().copied().collect();
    if names.len() < MERGE_FAN_IN {
        return Ok(CidSet::new());
    }

    let mut current = SortedTable::load(store, &index[&names[0]]).await?;
    let mut consumed = 1;
    while current.tier().next().is_some() && consumed + MERGE_FAN_IN - 1 <= names.len() {
        let mut group = Vec::with_capacity(MERGE_FAN_IN);
        for name in &names[consumed..consumed + MERGE_FAN_IN - 1] {
            group.push(SortedTable::load(store, &index[name]).await?);
        }
        if group.iter().any(|t| t.tier() != current.tier()) {
            break;
        }
        group.insert(0, current);
        current = SortedTable::merge(&group)?;
        consumed += MERGE_FAN_IN - 1;
    }

    let mut new_cids = CidSet::new();
    if consumed == 1 {
        return Ok(new_cids);
    }

    let merged_name = current.oldest_tid().unwrap_or(names[consumed - 1]);
    for name in &names[..consumed] {
        index.remove(name);
    }
    let merged_cid = current.put(store).await?;
    index.insert(merged_name, merged_cid);
    new_cids.add(merged_cid);

    debug!(
        tables = consumed,
        tier = ?current.tier(),
        entries = current.len(),
        cid = %merged_cid,
        "compacted tables"
    );
    Ok(new_cids)
}
