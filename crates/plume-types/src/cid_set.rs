use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cid::Cid;

/// Deduplicating set of CIDs that remembers insertion order.
///
/// Used to collect the blocks a mutation newly wrote so they can be listed in
/// a root's `new_cids` and bundled into sync archives. Serializes as a list in
/// insertion order.
#[derive(Clone, Debug, Default)]
pub struct CidSet {
    order: Vec<Cid>,
    members: HashSet<Cid>,
}

impl CidSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cid: Cid) -> &mut Self {
        if self.members.insert(cid) {
            self.order.push(cid);
        }
        self
    }

    /// Union in place.
    pub fn add_set(&mut self, other: &CidSet) -> &mut Self {
        for cid in &other.order {
            self.add(*cid);
        }
        self
    }

    /// Difference in place.
    pub fn subtract_set(&mut self, other: &CidSet) -> &mut Self {
        self.order.retain(|c| !other.members.contains(c));
        self.members.retain(|c| !other.members.contains(c));
        self
    }

    pub fn delete(&mut self, cid: &Cid) -> bool {
        if self.members.remove(cid) {
            self.order.retain(|c| c != cid);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.members.contains(cid)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cid> {
        self.order.iter()
    }

    pub fn to_list(&self) -> Vec<Cid> {
        self.order.clone()
    }
}

impl PartialEq for CidSet {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

impl Eq for CidSet {}

impl FromIterator<Cid> for CidSet {
    fn from_iter<I: IntoIterator<Item = Cid>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Cid> for CidSet {
    fn extend<I: IntoIterator<Item = Cid>>(&mut self, iter: I) {
        for cid in iter {
            self.add(cid);
        }
    }
}

impl IntoIterator for CidSet {
    type Item = Cid;
    type IntoIter = std::vec::IntoIter<Cid>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}

impl<'a> IntoIterator for &'a CidSet {
    type Item = &'a Cid;
    type IntoIter = std::slice::Iter<'a, Cid>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.iter()
    }
}

impl Serialize for CidSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.order.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CidSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Vec::<Cid>::deserialize(deserializer)?.into_iter().collect())
    }
}
