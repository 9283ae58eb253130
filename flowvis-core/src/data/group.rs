//! Data groups.
//!
//! A group owns several data objects (an image owning its layers) plus
//! group-level representations that are derived from member representations.
//! Staleness propagates bottom-up: whenever *any* member changes, every
//! group representation must be refreshed before it is handed out. The group
//! detects this by snapshotting member version counters after each refresh
//! and comparing them on access.

use std::any::TypeId;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::data::DataObject;

/// A group-level representation derived from the members' representations.
///
/// `update` is called with the current member list whenever any member
/// changed since the last refresh; implementations re-read whatever member
/// representations they need.
pub trait GroupRepresentation: Send + Sync {
    fn update(&mut self, members: &[Arc<DataObject>]);

    fn as_any(&self) -> &dyn std::any::Any;
}

struct GroupSlot {
    repr: Box<dyn GroupRepresentation>,
    /// Member versions at the last refresh; empty until first refresh, which
    /// forces the initial update.
    seen_versions: Vec<u64>,
}

/// A container of data objects with derived group representations.
pub struct DataGroup {
    members: Vec<Arc<DataObject>>,
    slots: RwLock<Vec<GroupSlot>>,
}

impl DataGroup {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            slots: RwLock::new(Vec::new()),
        }
    }

    pub fn add_member(&mut self, member: Arc<DataObject>) {
        self.members.push(member);
    }

    pub fn members(&self) -> &[Arc<DataObject>] {
        &self.members
    }

    /// Add a group representation. It is considered stale until first access.
    pub fn add_group_representation<T: GroupRepresentation + 'static>(&self, repr: T) {
        self.slots.write().push(GroupSlot {
            repr: Box::new(repr),
            seen_versions: Vec::new(),
        });
    }

    /// Access the group representation of kind `T`, refreshing it first if
    /// any member changed since the last refresh.
    pub fn with_group<T, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R>
    where
        T: GroupRepresentation + 'static,
    {
        let current: Vec<u64> = self.members.iter().map(|m| m.version()).collect();

        let mut slots = self.slots.write();
        let slot = slots
            .iter_mut()
            .find(|s| s.repr.as_any().type_id() == TypeId::of::<T>())?;

        if slot.seen_versions != current {
            slot.repr.update(&self.members);
            slot.seen_versions = current;
        }

        let typed = slot.repr.as_any().downcast_ref::<T>()?;
        Some(f(typed))
    }
}

impl Default for DataGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DataGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataGroup")
            .field("members", &self.members.len())
            .field("group_representations", &self.slots.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::representation::test_support::RamBuffer;
    use crate::data::ConverterRegistry;

    /// Sums the first value of every member's RAM buffer.
    struct SumView {
        total: f32,
        refreshes: usize,
    }

    impl GroupRepresentation for SumView {
        fn update(&mut self, members: &[Arc<DataObject>]) {
            self.refreshes += 1;
            self.total = members
                .iter()
                .filter_map(|m| m.with(|ram: &RamBuffer| ram.values[0]).ok())
                .sum();
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn member(value: f32) -> Arc<DataObject> {
        let data = DataObject::new(Arc::new(ConverterRegistry::new()));
        data.add_representation(RamBuffer::filled([1, 1, 1], value));
        Arc::new(data)
    }

    #[test]
    fn group_refreshes_on_first_access() {
        let mut group = DataGroup::new();
        group.add_member(member(1.0));
        group.add_member(member(2.0));
        group.add_group_representation(SumView {
            total: 0.0,
            refreshes: 0,
        });

        let total = group.with_group(|v: &SumView| v.total).unwrap();
        assert_eq!(total, 3.0);
    }

    #[test]
    fn group_is_stale_when_any_member_changes() {
        let mut group = DataGroup::new();
        let a = member(1.0);
        group.add_member(a.clone());
        group.add_member(member(2.0));
        group.add_group_representation(SumView {
            total: 0.0,
            refreshes: 0,
        });

        assert_eq!(group.with_group(|v: &SumView| v.total).unwrap(), 3.0);
        assert_eq!(group.with_group(|v: &SumView| v.refreshes).unwrap(), 1);

        // Editing one member makes the group representation stale.
        a.edit(|ram: &mut RamBuffer| ram.values[0] = 10.0).unwrap();
        assert_eq!(group.with_group(|v: &SumView| v.total).unwrap(), 12.0);
        assert_eq!(group.with_group(|v: &SumView| v.refreshes).unwrap(), 2);
    }

    #[test]
    fn unknown_group_kind_is_none() {
        let group = DataGroup::new();
        assert!(group.with_group(|_: &SumView| ()).is_none());
    }
}
