//! # Aggregation
//!
//! Turns a ledger snapshot into a ranked leaderboard.
//!
//! - Group events by caption id, summing positive values into `up` and negative values into `down`
//! - Drop groups whose caption is missing or has no content (caption deleted after being voted on)
//! - Rank by score descending, caption id ascending on ties
//!
//! Linear in the number of events. Pure, so the same snapshot always yields the same leaderboard.
use std::{cmp::Ordering, collections::HashMap};

use crate::models::{CaptionId, CaptionSet, LeaderboardRow, Tally, VoteEvent};

pub fn tally<'a, I>(events: I) -> HashMap<CaptionId, Tally>
where
    I: IntoIterator<Item = &'a VoteEvent>,
{
    let mut tallies: HashMap<CaptionId, Tally> = HashMap::new();

    for event in events {
        tallies
            .entry(event.caption_id.clone())
            .or_default()
            .apply(event.vote_value);
    }

    tallies
}

pub fn aggregate<'a, I>(events: I, captions: &CaptionSet) -> Vec<LeaderboardRow>
where
    I: IntoIterator<Item = &'a VoteEvent>,
{
    let mut rows: Vec<LeaderboardRow> = tally(events)
        .into_iter()
        .filter_map(|(caption_id, tally)| {
            let info = captions.get(&caption_id)?;

            Some(LeaderboardRow {
                content: info.content.clone(),
                image_url: info.image_url.clone(),
                caption_id,
                tally,
            })
        })
        .collect();

    rank(&mut rows);
    rows
}

pub fn rank(rows: &mut [LeaderboardRow]) {
    rows.sort_by(ranking);
}

fn ranking(a: &LeaderboardRow, b: &LeaderboardRow) -> Ordering {
    b.tally
        .score
        .cmp(&a.tally.score)
        .then_with(|| a.caption_id.cmp(&b.caption_id))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::models::Caption;

    fn captions(entries: &[(&str, Option<&str>)]) -> CaptionSet {
        entries
            .iter()
            .map(|(id, content)| Caption {
                id: (*id).into(),
                content: content.map(str::to_string),
                image_url: None,
            })
            .collect()
    }

    fn ids(rows: &[LeaderboardRow]) -> Vec<&str> {
        rows.iter().map(|row| row.caption_id.as_str()).collect()
    }

    #[test]
    fn test_scenario() {
        let events = vec![
            VoteEvent::new("A", "u1", 1),
            VoteEvent::new("A", "u2", 1),
            VoteEvent::new("B", "u1", -1),
            VoteEvent::new("A", "u3", -1),
        ];
        let captions = captions(&[("A", Some("lol")), ("B", Some("meh"))]);

        let rows = aggregate(&events, &captions);

        assert_eq!(ids(&rows), vec!["A", "B"]);
        assert_eq!((rows[0].tally.up, rows[0].tally.down, rows[0].tally.score), (2, 1, 1));
        assert_eq!((rows[1].tally.up, rows[1].tally.down, rows[1].tally.score), (0, 1, -1));
        assert_eq!(rows[0].content, "lol");
    }

    #[test]
    fn test_deleted_caption_is_dropped() {
        let events = vec![
            VoteEvent::new("A", "u1", 1),
            VoteEvent::new("C", "u1", 1),
            VoteEvent::new("C", "u2", 1),
        ];

        let before = aggregate(&events, &captions(&[("A", Some("lol")), ("C", Some("gone soon"))]));
        assert_eq!(ids(&before), vec!["C", "A"]);

        let after = aggregate(&events, &captions(&[("A", Some("lol"))]));
        assert_eq!(ids(&after), vec!["A"]);
    }

    #[test]
    fn test_caption_without_content_is_dropped() {
        let events = vec![VoteEvent::new("A", "u1", 1), VoteEvent::new("B", "u1", 1)];

        let rows = aggregate(&events, &captions(&[("A", Some("lol")), ("B", None)]));

        assert_eq!(ids(&rows), vec!["A"]);
    }

    #[test]
    fn test_ties_break_on_caption_id() {
        let events = vec![
            VoteEvent::new("c", "u1", 1),
            VoteEvent::new("a", "u1", 1),
            VoteEvent::new("b", "u1", 1),
        ];

        let rows = aggregate(
            &events,
            &captions(&[("a", Some("x")), ("b", Some("y")), ("c", Some("z"))]),
        );

        assert_eq!(ids(&rows), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_ledger() {
        let events: Vec<VoteEvent> = Vec::new();
        let rows = aggregate(&events, &captions(&[("A", Some("lol"))]));

        assert!(rows.is_empty());
    }

    fn event_strategy() -> impl Strategy<Value = VoteEvent> {
        (prop::sample::select(vec!["a", "b", "c", "d", "e"]), -3i64..=3)
            .prop_map(|(id, value)| VoteEvent::new(id, "voter", value))
    }

    proptest! {
        #[test]
        fn test_tallies_are_consistent(events in prop::collection::vec(event_strategy(), 0..200)) {
            let captions = captions(&[("a", Some("a")), ("b", Some("b")), ("c", Some("c")), ("d", Some("d"))]);
            let rows = aggregate(&events, &captions);

            for row in &rows {
                prop_assert_eq!(row.tally.score, row.tally.up as i64 - row.tally.down as i64);
                prop_assert!(captions.contains(&row.caption_id));
            }

            prop_assert!(rows.iter().all(|row| row.caption_id.as_str() != "e"));
        }

        #[test]
        fn test_sorted_by_score(events in prop::collection::vec(event_strategy(), 1..200)) {
            let captions = captions(&[("a", Some("a")), ("b", Some("b")), ("c", Some("c")), ("d", Some("d")), ("e", Some("e"))]);
            let rows = aggregate(&events, &captions);

            for pair in rows.windows(2) {
                prop_assert!(pair[0].tally.score >= pair[1].tally.score);
            }
        }

        #[test]
        fn test_idempotent(events in prop::collection::vec(event_strategy(), 0..200)) {
            let captions = captions(&[("a", Some("a")), ("c", Some("c")), ("e", Some("e"))]);

            prop_assert_eq!(aggregate(&events, &captions), aggregate(&events, &captions));
        }
    }
}
