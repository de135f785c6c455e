// Pure signup transitions on a posted composition.
//
// Each transition either applies completely or returns an error with the
// post untouched, so a user is never observed in two slots and a slot never
// exceeds its capacity.

use super::comp_models::PostedComposition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupOutcome {
    Joined { slot: usize },
    Switched { from: usize, to: usize },
    /// Re-selected the slot the user already holds.
    Unchanged { slot: usize },
    Left { slot: usize },
    /// Asked to leave without being signed up.
    NotSignedUp,
}

impl SignupOutcome {
    pub fn changed(&self) -> bool {
        matches!(
            self,
            SignupOutcome::Joined { .. } | SignupOutcome::Switched { .. } | SignupOutcome::Left { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignupError {
    #[error("That class is already full.")]
    SlotFull { slot: usize },
    #[error("That class is no longer part of this composition.")]
    InvalidSlot { slot: usize },
}

impl PostedComposition {
    pub fn slot_of(&self, user_id: u64) -> Option<usize> {
        self.signups
            .iter()
            .find(|(_, users)| users.contains(&user_id))
            .map(|(slot, _)| *slot)
    }

    pub fn occupants(&self, slot: usize) -> &[u64] {
        self.signups.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_full(&self, slot: usize) -> bool {
        match self.roster.slots.get(slot).and_then(|s| s.capacity) {
            Some(capacity) => self.occupants(slot).len() >= capacity as usize,
            None => false,
        }
    }

    pub fn select_slot(&mut self, user_id: u64, slot: usize) -> Result<SignupOutcome, SignupError> {
        if slot >= self.roster.len() {
            return Err(SignupError::InvalidSlot { slot });
        }

        let current = self.slot_of(user_id);
        if current == Some(slot) {
            return Ok(SignupOutcome::Unchanged { slot });
        }
        if self.is_full(slot) {
            return Err(SignupError::SlotFull { slot });
        }

        if let Some(from) = current {
            self.remove_user(from, user_id);
        }
        self.signups.entry(slot).or_default().push(user_id);

        Ok(match current {
            Some(from) => SignupOutcome::Switched { from, to: slot },
            None => SignupOutcome::Joined { slot },
        })
    }

    pub fn leave(&mut self, user_id: u64) -> SignupOutcome {
        match self.slot_of(user_id) {
            Some(slot) => {
                self.remove_user(slot, user_id);
                SignupOutcome::Left { slot }
            }
            None => SignupOutcome::NotSignedUp,
        }
    }

    fn remove_user(&mut self, slot: usize, user_id: u64) {
        if let Some(users) = self.signups.get_mut(&slot) {
            users.retain(|id| *id != user_id);
            if users.is_empty() {
                self.signups.remove(&slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::comps::comp_models::RosterDefinition;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn post(roster: &str) -> PostedComposition {
        PostedComposition {
            message_id: 1,
            channel_id: 2,
            schedule_id: 3,
            roster: RosterDefinition::parse(roster).unwrap(),
            overview: None,
            signups: BTreeMap::new(),
            posted_at: Utc::now(),
            occurrence: None,
        }
    }

    fn assert_unique(post: &PostedComposition) {
        let mut seen = Vec::new();
        for users in post.signups.values() {
            for user in users {
                assert!(!seen.contains(user), "user {user} appears twice");
                seen.push(*user);
            }
        }
    }

    #[test]
    fn join_then_switch_keeps_user_in_one_slot() {
        let mut post = post("Firebrand=2\nScrapper");
        assert_eq!(post.select_slot(7, 0), Ok(SignupOutcome::Joined { slot: 0 }));
        assert_eq!(post.select_slot(7, 1), Ok(SignupOutcome::Switched { from: 0, to: 1 }));
        assert!(post.occupants(0).is_empty());
        assert_eq!(post.occupants(1), &[7]);
        assert_unique(&post);
    }

    #[test]
    fn reselecting_same_slot_is_a_no_op() {
        let mut post = post("Firebrand=1");
        post.select_slot(7, 0).unwrap();
        let before = post.clone();
        assert_eq!(post.select_slot(7, 0), Ok(SignupOutcome::Unchanged { slot: 0 }));
        assert_eq!(post, before);
    }

    #[test]
    fn full_slot_rejects_and_keeps_prior_state() {
        let mut post = post("Firebrand=1\nScrapper");
        post.select_slot(1, 0).unwrap();
        post.select_slot(2, 1).unwrap();
        let before = post.clone();

        assert_eq!(post.select_slot(2, 0), Err(SignupError::SlotFull { slot: 0 }));
        assert_eq!(post, before);
        assert_eq!(post.slot_of(2), Some(1));
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut post = post("Chronomancer=3");
        let results: Vec<_> = (1..=5).map(|user| post.select_slot(user, 0)).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
        assert_eq!(post.occupants(0), &[1, 2, 3]);
    }

    #[test]
    fn unlimited_slot_accepts_everyone() {
        let mut post = post("Mechanist");
        for user in 1..=40 {
            post.select_slot(user, 0).unwrap();
        }
        assert_eq!(post.occupants(0).len(), 40);
    }

    #[test]
    fn leave_is_a_no_op_when_not_signed_up() {
        let mut post = post("Firebrand");
        let before = post.clone();
        assert_eq!(post.leave(9), SignupOutcome::NotSignedUp);
        assert_eq!(post, before);

        post.select_slot(9, 0).unwrap();
        assert_eq!(post.leave(9), SignupOutcome::Left { slot: 0 });
        assert!(post.signups.is_empty());
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut post = post("Firebrand");
        assert_eq!(post.select_slot(1, 5), Err(SignupError::InvalidSlot { slot: 5 }));
    }
}
