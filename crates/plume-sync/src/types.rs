use plume_types::Cid;
use serde::{Deserialize, Serialize};

/// Outcome of a successful verification run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub commits_verified: u64,
    pub events_emitted: u64,
    /// The commit local state advanced to.
    pub head: Cid,
}

impl SyncReport {
    pub(crate) fn starting_at(head: Cid) -> Self {
        Self {
            commits_verified: 0,
            events_emitted: 0,
            head,
        }
    }
}
