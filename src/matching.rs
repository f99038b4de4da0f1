use std::collections::VecDeque;

use rand::{distributions::Alphanumeric, Rng};

use crate::messages::User;
use crate::room::RANDOM_ROOM_PREFIX;

/// Result of a match request: either parked in the pool or paired with the
/// earliest compatible waiter.
pub enum MatchOutcome {
    Waiting,
    Matched {
        partner_conn: String,
        partner_user: User,
        room: String,
    },
}

/// FIFO pool of connections seeking an anonymous partner. There is no
/// compatibility scoring beyond "not the same connection"; the oldest waiter
/// always wins the tie-break.
pub struct MatchQueue {
    waiting: VecDeque<(String, User)>,
}

impl MatchQueue {
    pub fn new() -> Self {
        MatchQueue {
            waiting: VecDeque::new(),
        }
    }

    /// Pairs the requester with the earliest other waiter, or parks it.
    /// Entries whose connection `is_live` rejects are stale leftovers from a
    /// disconnect race; they are discarded and matching re-runs.
    pub fn request_match(
        &mut self,
        conn: &str,
        user: User,
        is_live: impl Fn(&str) -> bool,
    ) -> MatchOutcome {
        loop {
            let Some(pos) = self.waiting.iter().position(|(c, _)| c != conn) else {
                if !self.contains(conn) {
                    self.waiting.push_back((conn.to_string(), user));
                }
                return MatchOutcome::Waiting;
            };

            let Some((partner_conn, partner_user)) = self.waiting.remove(pos) else {
                continue;
            };

            if !is_live(&partner_conn) {
                continue;
            }

            self.cancel(conn);
            return MatchOutcome::Matched {
                partner_conn,
                partner_user,
                room: random_room_name(),
            };
        }
    }

    /// Unconditional removal; no-op if absent.
    pub fn cancel(&mut self, conn: &str) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|(c, _)| c != conn);
        self.waiting.len() != before
    }

    pub fn contains(&self, conn: &str) -> bool {
        self.waiting.iter().any(|(c, _)| c == conn)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

fn random_room_name() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("{RANDOM_ROOM_PREFIX}{token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::is_random_room;

    fn user(id: &str) -> User {
        User {
            id: id.into(),
            name: id.to_uppercase(),
            photo_url: None,
            online: true,
            last_seen: 0,
        }
    }

    #[test]
    fn first_requester_waits() {
        let mut queue = MatchQueue::new();
        let outcome = queue.request_match("c1", user("u1"), |_| true);
        assert!(matches!(outcome, MatchOutcome::Waiting));
        assert!(queue.contains("c1"));
    }

    #[test]
    fn repeat_request_does_not_duplicate_entry() {
        let mut queue = MatchQueue::new();
        queue.request_match("c1", user("u1"), |_| true);
        queue.request_match("c1", user("u1"), |_| true);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn matches_earliest_waiter_fifo() {
        let mut queue = MatchQueue::new();
        queue.request_match("c1", user("u1"), |_| true);
        queue.request_match("c2", user("u2"), |_| true);
        // c2 matched c1 already; rebuild the three-deep pool.
        let mut queue = MatchQueue::new();
        for c in ["c1", "c2", "c3"] {
            queue.waiting.push_back((c.to_string(), user(c)));
        }

        match queue.request_match("c4", user("u4"), |_| true) {
            MatchOutcome::Matched {
                partner_conn,
                partner_user,
                room,
            } => {
                assert_eq!(partner_conn, "c1");
                assert_eq!(partner_user.id, "c1");
                assert!(is_random_room(&room));
            }
            MatchOutcome::Waiting => panic!("expected a match"),
        }
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn stale_entries_are_discarded_and_matching_reruns() {
        let mut queue = MatchQueue::new();
        queue.waiting.push_back(("dead".to_string(), user("dead")));
        queue.waiting.push_back(("c2".to_string(), user("u2")));

        match queue.request_match("c3", user("u3"), |c| c != "dead") {
            MatchOutcome::Matched { partner_conn, .. } => assert_eq!(partner_conn, "c2"),
            MatchOutcome::Waiting => panic!("expected a match with the live waiter"),
        }
        assert!(!queue.contains("dead"));
    }

    #[test]
    fn all_stale_entries_leave_requester_waiting() {
        let mut queue = MatchQueue::new();
        queue.waiting.push_back(("dead".to_string(), user("dead")));

        let outcome = queue.request_match("c2", user("u2"), |_| false);
        assert!(matches!(outcome, MatchOutcome::Waiting));
        assert!(queue.contains("c2"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn cancel_is_noop_when_absent() {
        let mut queue = MatchQueue::new();
        assert!(!queue.cancel("c1"));
        queue.request_match("c1", user("u1"), |_| true);
        assert!(queue.cancel("c1"));
        assert!(queue.is_empty());
    }

    #[test]
    fn matched_pair_gets_a_pairing_room_name() {
        let mut queue = MatchQueue::new();
        queue.request_match("c1", user("u1"), |_| true);
        match queue.request_match("c2", user("u2"), |_| true) {
            MatchOutcome::Matched { room, .. } => assert!(room.starts_with("random-")),
            MatchOutcome::Waiting => panic!("expected a match"),
        }
        assert!(queue.is_empty());
    }
}
