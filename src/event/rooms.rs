use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{chat, user};

/// Who is watching which conversation live. Governs fan-out targeting only;
/// authorization is enforced against the store, never here.
#[derive(Default)]
pub struct RoomTracker {
    rooms: Mutex<HashMap<chat::Id, HashSet<user::Id>>>,
}

impl RoomTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<chat::Id, HashSet<user::Id>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn join(&self, conversation_id: &chat::Id, user_id: &user::Id) {
        self.rooms()
            .entry(conversation_id.clone())
            .or_default()
            .insert(user_id.clone());
    }

    /// Empty rooms are garbage-collected on the way out.
    pub fn leave(&self, conversation_id: &chat::Id, user_id: &user::Id) {
        let mut rooms = self.rooms();
        if let Some(members) = rooms.get_mut(conversation_id) {
            members.remove(user_id);
            if members.is_empty() {
                rooms.remove(conversation_id);
            }
        }
    }

    pub fn members_of(&self, conversation_id: &chat::Id) -> Vec<user::Id> {
        self.rooms()
            .get(conversation_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Evicts the user from every room, returning the rooms they were in.
    /// Used by the disconnect cleanup path.
    pub fn remove_from_all(&self, user_id: &user::Id) -> Vec<chat::Id> {
        let mut rooms = self.rooms();
        let mut left = Vec::new();

        rooms.retain(|conversation_id, members| {
            if members.remove(user_id) {
                left.push(conversation_id.clone());
            }
            !members.is_empty()
        });

        left
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(id: &str) -> chat::Id {
        chat::Id(id.to_owned())
    }

    #[test]
    fn join_and_leave_track_membership() {
        let tracker = RoomTracker::new();
        let alice = user::Id::from("alice");
        let bob = user::Id::from("bob");

        tracker.join(&conv("c1"), &alice);
        tracker.join(&conv("c1"), &bob);

        let mut members = tracker.members_of(&conv("c1"));
        members.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(members, vec![alice.clone(), bob.clone()]);

        tracker.leave(&conv("c1"), &alice);
        assert_eq!(tracker.members_of(&conv("c1")), vec![bob]);
    }

    #[test]
    fn empty_rooms_are_garbage_collected() {
        let tracker = RoomTracker::new();
        let alice = user::Id::from("alice");

        tracker.join(&conv("c1"), &alice);
        assert_eq!(tracker.room_count(), 1);

        tracker.leave(&conv("c1"), &alice);
        assert_eq!(tracker.room_count(), 0);
        assert!(tracker.members_of(&conv("c1")).is_empty());
    }

    #[test]
    fn leave_of_an_unknown_room_is_a_noop() {
        let tracker = RoomTracker::new();
        tracker.leave(&conv("ghost"), &user::Id::from("alice"));
        assert_eq!(tracker.room_count(), 0);
    }

    #[test]
    fn remove_from_all_reports_and_gcs_rooms() {
        let tracker = RoomTracker::new();
        let alice = user::Id::from("alice");
        let bob = user::Id::from("bob");

        tracker.join(&conv("c1"), &alice);
        tracker.join(&conv("c2"), &alice);
        tracker.join(&conv("c2"), &bob);

        let mut left = tracker.remove_from_all(&alice);
        left.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(left, vec![conv("c1"), conv("c2")]);

        // c1 is gone, c2 still has bob
        assert_eq!(tracker.room_count(), 1);
        assert_eq!(tracker.members_of(&conv("c2")), vec![bob]);
    }

    #[test]
    fn double_join_is_idempotent() {
        let tracker = RoomTracker::new();
        let alice = user::Id::from("alice");

        tracker.join(&conv("c1"), &alice);
        tracker.join(&conv("c1"), &alice);

        assert_eq!(tracker.members_of(&conv("c1")).len(), 1);
    }
}
