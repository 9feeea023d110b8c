use async_trait::async_trait;
use plume_repo::Event;
use plume_types::Cid;

use crate::error::SyncResult;

/// Receives the events of each verified commit, oldest commit first.
///
/// Local state advances to a commit only after `emit` returns `Ok`. An
/// error stops verification at that commit.
#[async_trait]
pub trait EventSink: Send {
    async fn emit(&mut self, commit: Cid, events: &[Event]) -> SyncResult<()>;
}

#[async_trait]
impl EventSink for Vec<Event> {
    async fn emit(&mut self, _commit: Cid, events: &[Event]) -> SyncResult<()> {
        self.extend_from_slice(events);
        Ok(())
    }
}

/// Keeps events grouped by the commit that produced them.
#[async_trait]
impl EventSink for Vec<(Cid, Vec<Event>)> {
    async fn emit(&mut self, commit: Cid, events: &[Event]) -> SyncResult<()> {
        self.push((commit, events.to_vec()));
        Ok(())
    }
}
