//! Toggle-style mutations applied to messages already retained in a room's
//! history ring: emoji reactions and embedded poll votes.

use crate::error::RelayError;
use crate::messages::{Poll, Reaction, StoredMessage, User};
use crate::room::RoomTable;

/// Toggles `user`'s reaction on a retained message and returns the merged
/// reaction list for broadcast. A user holds at most one current reaction
/// per message: the same emoji toggles it off, a different emoji replaces
/// it. Returns `None` when the message is unknown or already evicted —
/// reactions on evicted messages are silently dropped.
pub fn toggle_reaction(
    rooms: &mut RoomTable,
    room: &str,
    message_id: &str,
    emoji: &str,
    user: &User,
) -> Option<Vec<Reaction>> {
    let message = rooms.history_mut(room)?.find_mut(message_id)?;

    match message.reactions.iter().position(|r| r.user_id == user.id) {
        Some(i) if message.reactions[i].emoji == emoji => {
            message.reactions.remove(i);
        }
        Some(i) => {
            message.reactions[i].emoji = emoji.to_string();
        }
        None => message.reactions.push(Reaction {
            emoji: emoji.to_string(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
        }),
    }

    Some(message.reactions.clone())
}

/// Toggles `user_id`'s vote on one option of a poll-bearing message. For
/// single-choice polls the user is stripped from every other option first.
/// The mutated poll is re-encoded into the message content only after the
/// whole update succeeds, so a parse failure leaves the message untouched.
/// Returns the merged poll and the updated message for broadcast.
pub fn vote_poll(
    rooms: &mut RoomTable,
    room: &str,
    message_id: &str,
    option_id: &str,
    user_id: &str,
) -> Result<(Poll, StoredMessage), RelayError> {
    let message = rooms
        .history_mut(room)
        .and_then(|h| h.find_mut(message_id))
        .ok_or_else(|| RelayError::MessageNotFound(message_id.to_string()))?;

    let mut poll = Poll::decode(&message.content)?;

    if !poll.multiple {
        for option in poll.options.iter_mut().filter(|o| o.id != option_id) {
            option.votes.retain(|v| v != user_id);
        }
    }

    let option = poll
        .options
        .iter_mut()
        .find(|o| o.id == option_id)
        .ok_or_else(|| RelayError::UnknownOption(option_id.to_string()))?;

    if let Some(pos) = option.votes.iter().position(|v| v == user_id) {
        option.votes.remove(pos);
    } else {
        option.votes.push(user_id.to_string());
    }

    message.content = poll.encode();
    Ok((poll, message.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::PollOption;

    fn user(id: &str) -> User {
        User {
            id: id.into(),
            name: id.to_uppercase(),
            photo_url: None,
            online: true,
            last_seen: 0,
        }
    }

    fn seed_message(rooms: &mut RoomTable, room: &str, id: &str, content: &str) {
        rooms.join("c1", room);
        rooms
            .history_mut(room)
            .unwrap()
            .append(StoredMessage {
                id: id.into(),
                content: content.into(),
                sender: user("u1"),
                room: room.into(),
                timestamp: 1,
                reactions: vec![],
                is_voice_message: false,
                voice_url: None,
            });
    }

    fn seed_poll(rooms: &mut RoomTable, room: &str, id: &str, multiple: bool) {
        let poll = Poll {
            id: id.into(),
            question: "?".into(),
            options: vec![
                PollOption {
                    id: "a".into(),
                    text: "A".into(),
                    votes: vec![],
                },
                PollOption {
                    id: "b".into(),
                    text: "B".into(),
                    votes: vec![],
                },
            ],
            multiple,
        };
        seed_message(rooms, room, id, &poll.encode());
    }

    #[test]
    fn double_toggle_leaves_no_reaction() {
        let mut rooms = RoomTable::new(100);
        seed_message(&mut rooms, "general", "m1", "hi");

        let first = toggle_reaction(&mut rooms, "general", "m1", "👍", &user("u2")).unwrap();
        assert_eq!(first.len(), 1);

        let second = toggle_reaction(&mut rooms, "general", "m1", "👍", &user("u2")).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn different_emoji_replaces_users_reaction() {
        let mut rooms = RoomTable::new(100);
        seed_message(&mut rooms, "general", "m1", "hi");

        toggle_reaction(&mut rooms, "general", "m1", "👍", &user("u2"));
        let merged = toggle_reaction(&mut rooms, "general", "m1", "❤️", &user("u2")).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].emoji, "❤️");
    }

    #[test]
    fn reactions_from_distinct_users_coexist() {
        let mut rooms = RoomTable::new(100);
        seed_message(&mut rooms, "general", "m1", "hi");

        toggle_reaction(&mut rooms, "general", "m1", "👍", &user("u2"));
        let merged = toggle_reaction(&mut rooms, "general", "m1", "👍", &user("u3")).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn reaction_on_unknown_message_is_silent_noop() {
        let mut rooms = RoomTable::new(100);
        rooms.join("c1", "general");
        assert!(toggle_reaction(&mut rooms, "general", "gone", "👍", &user("u2")).is_none());
        assert!(toggle_reaction(&mut rooms, "nowhere", "m1", "👍", &user("u2")).is_none());
    }

    #[test]
    fn single_choice_vote_moves_between_options() {
        let mut rooms = RoomTable::new(100);
        seed_poll(&mut rooms, "general", "p1", false);

        vote_poll(&mut rooms, "general", "p1", "a", "u2").unwrap();
        let (poll, message) = vote_poll(&mut rooms, "general", "p1", "b", "u2").unwrap();

        assert!(poll.options[0].votes.is_empty());
        assert_eq!(poll.options[1].votes, vec!["u2".to_string()]);
        // The re-encoded content reflects the merged state.
        let reparsed = Poll::decode(&message.content).unwrap();
        assert_eq!(reparsed.options[1].votes, vec!["u2".to_string()]);
    }

    #[test]
    fn multiple_choice_keeps_votes_on_both_options() {
        let mut rooms = RoomTable::new(100);
        seed_poll(&mut rooms, "general", "p1", true);

        vote_poll(&mut rooms, "general", "p1", "a", "u2").unwrap();
        let (poll, _) = vote_poll(&mut rooms, "general", "p1", "b", "u2").unwrap();

        assert_eq!(poll.options[0].votes, vec!["u2".to_string()]);
        assert_eq!(poll.options[1].votes, vec!["u2".to_string()]);
    }

    #[test]
    fn voting_same_option_twice_retracts_the_vote() {
        let mut rooms = RoomTable::new(100);
        seed_poll(&mut rooms, "general", "p1", false);

        vote_poll(&mut rooms, "general", "p1", "a", "u2").unwrap();
        let (poll, _) = vote_poll(&mut rooms, "general", "p1", "a", "u2").unwrap();
        assert!(poll.options[0].votes.is_empty());
    }

    #[test]
    fn unparseable_poll_aborts_without_partial_mutation() {
        let mut rooms = RoomTable::new(100);
        seed_message(&mut rooms, "general", "m1", "__poll__:not json");

        let err = vote_poll(&mut rooms, "general", "m1", "a", "u2");
        assert!(matches!(err, Err(RelayError::PollParse(_))));

        let content = &rooms.history("general").unwrap().snapshot()[0].content;
        assert_eq!(content, "__poll__:not json");
    }

    #[test]
    fn vote_on_non_poll_message_is_rejected() {
        let mut rooms = RoomTable::new(100);
        seed_message(&mut rooms, "general", "m1", "just text");
        assert!(matches!(
            vote_poll(&mut rooms, "general", "m1", "a", "u2"),
            Err(RelayError::NotAPoll)
        ));
    }
}
