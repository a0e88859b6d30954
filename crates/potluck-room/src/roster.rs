//! Membership bookkeeping: the name → member map plus the join-order
//! list.
//!
//! The join-order list is the *only* legitimate source of turn
//! sequencing. Iterating the map would hand out turns in hash order,
//! which changes run to run; every per-member loop in the lifecycle
//! goes through [`Roster::join_order`].

use std::collections::HashMap;

use crate::Link;

/// One admitted participant of a room.
pub(crate) struct Member<L: Link> {
    pub(crate) name: String,
    /// Integer coin ledger. Written only by the lifecycle task, during
    /// the Deposit and Settling phases.
    pub(crate) funds: i64,
    /// Outbound endpoint. Owned exclusively by this member; closed
    /// exactly once, at removal or room teardown.
    pub(crate) link: L,
}

/// The membership map and join-order list, mutated only under the
/// room's exclusive section.
pub(crate) struct Roster<L: Link> {
    members: HashMap<String, Member<L>>,
    join_order: Vec<String>,
}

impl<L: Link> Roster<L> {
    pub(crate) fn new() -> Self {
        Self {
            members: HashMap::new(),
            join_order: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Registers a member and appends them to the join order. The
    /// caller has already checked for duplicates and capacity.
    pub(crate) fn insert(&mut self, name: String, link: L) {
        self.join_order.push(name.clone());
        self.members.insert(
            name.clone(),
            Member {
                name,
                funds: 0,
                link,
            },
        );
    }

    /// Removes a member from both the map and the join order.
    /// Returns `None` (a no-op) if the name isn't registered.
    pub(crate) fn remove(&mut self, name: &str) -> Option<Member<L>> {
        let member = self.members.remove(name)?;
        self.join_order.retain(|n| n != name);
        Some(member)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Member<L>> {
        self.members.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Member<L>> {
        self.members.get_mut(name)
    }

    /// A snapshot of the join order, for iteration that releases the
    /// room lock between members.
    pub(crate) fn join_order(&self) -> Vec<String> {
        self.join_order.clone()
    }

    /// The name of the first member whose link matches the predicate,
    /// in join order.
    pub(crate) fn name_of(&self, matches: impl Fn(&L) -> bool) -> Option<String> {
        self.join_order
            .iter()
            .find(|name| {
                self.members
                    .get(*name)
                    .is_some_and(|member| matches(&member.link))
            })
            .cloned()
    }

    /// Drains every member, in join order.
    pub(crate) fn drain(&mut self) -> Vec<Member<L>> {
        let mut out = Vec::with_capacity(self.members.len());
        for name in std::mem::take(&mut self.join_order) {
            if let Some(member) = self.members.remove(&name) {
                out.push(member);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinkError;

    struct NullLink;

    impl Link for NullLink {
        async fn send(
            &self,
            _msg: &potluck_protocol::Message,
        ) -> Result<(), LinkError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    #[test]
    fn insert_preserves_join_order() {
        let mut roster: Roster<NullLink> = Roster::new();
        roster.insert("carol".into(), NullLink);
        roster.insert("alice".into(), NullLink);
        roster.insert("bob".into(), NullLink);
        assert_eq!(roster.join_order(), vec!["carol", "alice", "bob"]);
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn remove_drops_from_both_structures() {
        let mut roster: Roster<NullLink> = Roster::new();
        roster.insert("alice".into(), NullLink);
        roster.insert("bob".into(), NullLink);

        assert!(roster.remove("alice").is_some());
        assert!(!roster.contains("alice"));
        assert_eq!(roster.join_order(), vec!["bob"]);
    }

    #[test]
    fn remove_absent_member_is_a_noop() {
        let mut roster: Roster<NullLink> = Roster::new();
        roster.insert("alice".into(), NullLink);
        assert!(roster.remove("ghost").is_none());
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn drain_empties_in_join_order() {
        let mut roster: Roster<NullLink> = Roster::new();
        roster.insert("bob".into(), NullLink);
        roster.insert("alice".into(), NullLink);

        let drained = roster.drain();
        let names: Vec<_> = drained.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["bob", "alice"]);
        assert_eq!(roster.len(), 0);
        assert!(roster.join_order().is_empty());
    }
}
