//! Round resolution. Pure functions of the ledger.

use votechaos_protocol::{Identity, Resolution, ScoreEntry, Submission, Tally};

/// The outcome of a classic round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassicOutcome {
    /// Every option, in `options` order, with its vote count.
    pub tally: Tally,
    /// `None` when nobody voted.
    pub winner: Option<String>,
    pub total_votes: u32,
}

impl From<ClassicOutcome> for Resolution {
    fn from(outcome: ClassicOutcome) -> Self {
        Resolution::Classic {
            tally: outcome.tally,
            winner: outcome.winner,
            total_votes: outcome.total_votes,
        }
    }
}

/// The outcome of a prediction round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionOutcome {
    pub correct_option: String,
    /// Display names of everyone who predicted correctly, in submission order.
    pub winners: Vec<String>,
    /// Cumulative scores after this round, highest first.
    pub scores: Vec<ScoreEntry>,
}

impl From<PredictionOutcome> for Resolution {
    fn from(outcome: PredictionOutcome) -> Self {
        Resolution::Prediction {
            correct_option: outcome.correct_option,
            winners: outcome.winners,
            scores: outcome.scores,
        }
    }
}

/// Counts votes and picks the winner.
///
/// The winner is the option with the highest count. Ties go to whichever
/// tied option comes first in `options`, so the result depends only on the
/// multiset of votes and never on their arrival order.
pub fn resolve_classic(options: &[String], submissions: &[Submission]) -> ClassicOutcome {
    let mut tally: Tally = options.iter().map(|o| (o.clone(), 0)).collect();
    let mut total_votes = 0;
    for submission in submissions {
        if let Some(count) = tally.get_mut(&submission.chosen_option) {
            *count += 1;
            total_votes += 1;
        }
    }

    let mut winner: Option<(&String, u32)> = None;
    for (option, &count) in &tally {
        if count > 0 && winner.is_none_or(|(_, best)| count > best) {
            winner = Some((option, count));
        }
    }
    let winner = winner.map(|(option, _)| option.clone());

    ClassicOutcome {
        tally,
        winner,
        total_votes,
    }
}

/// Marks correct predictions and adds one point per correct identity to
/// the cumulative `prior` scores.
///
/// Scores are keyed by [`Identity`]; the stored display name is refreshed to
/// the one used in this round.
pub fn resolve_prediction(
    submissions: &[Submission],
    correct_option: &str,
    prior: &[ScoreEntry],
) -> PredictionOutcome {
    let mut scores = prior.to_vec();
    let mut winners = Vec::new();
    let mut credited: Vec<&Identity> = Vec::new();

    for submission in submissions.iter().filter(|s| s.chosen_option == correct_option) {
        if credited.contains(&&submission.identity) {
            continue;
        }
        credited.push(&submission.identity);
        winners.push(submission.display_name.clone());

        match scores.iter_mut().find(|e| e.identity == submission.identity) {
            Some(entry) => {
                entry.points += 1;
                entry.display_name.clone_from(&submission.display_name);
            }
            None => scores.push(ScoreEntry {
                identity: submission.identity.clone(),
                display_name: submission.display_name.clone(),
                points: 1,
            }),
        }
    }

    // Stable: equal scores keep first-scored order.
    scores.sort_by(|a, b| b.points.cmp(&a.points));

    PredictionOutcome {
        correct_option: correct_option.to_owned(),
        winners,
        scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use votechaos_protocol::{ConnectionId, UserRef};

    fn options(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sub(id: u64, name: &str, option: &str) -> Submission {
        Submission {
            connection_id: ConnectionId::new(id),
            identity: Identity::Connection(ConnectionId::new(id)),
            display_name: name.into(),
            chosen_option: option.into(),
            submitted_at: Utc::now(),
        }
    }

    // =====================================================================
    // Classic
    // =====================================================================

    #[test]
    fn test_resolve_classic_picks_highest_count() {
        let outcome = resolve_classic(
            &options(&["A", "B", "C"]),
            &[sub(1, "a", "B"), sub(2, "b", "C"), sub(3, "c", "B")],
        );
        assert_eq!(outcome.winner.as_deref(), Some("B"));
        assert_eq!(outcome.total_votes, 3);
        assert_eq!(outcome.tally["A"], 0);
        assert_eq!(outcome.tally["B"], 2);
        assert_eq!(outcome.tally["C"], 1);
    }

    #[test]
    fn test_resolve_classic_tie_goes_to_first_option() {
        let outcome = resolve_classic(&options(&["A", "B"]), &[sub(1, "a", "A"), sub(2, "b", "B")]);
        assert_eq!(outcome.winner.as_deref(), Some("A"));

        let reversed = resolve_classic(&options(&["A", "B"]), &[sub(2, "b", "B"), sub(1, "a", "A")]);
        assert_eq!(reversed.winner.as_deref(), Some("A"));
    }

    #[test]
    fn test_resolve_classic_tie_uses_option_order_not_alphabet() {
        let outcome = resolve_classic(
            &options(&["Zebra", "Apple"]),
            &[sub(1, "a", "Apple"), sub(2, "b", "Zebra")],
        );
        assert_eq!(outcome.winner.as_deref(), Some("Zebra"));
    }

    #[test]
    fn test_resolve_classic_is_order_independent() {
        let opts = options(&["A", "B", "C"]);
        let subs = vec![
            sub(1, "a", "C"),
            sub(2, "b", "A"),
            sub(3, "c", "C"),
            sub(4, "d", "B"),
            sub(5, "e", "A"),
        ];
        let forward = resolve_classic(&opts, &subs);
        let mut reversed_subs = subs.clone();
        reversed_subs.reverse();
        let reversed = resolve_classic(&opts, &reversed_subs);

        assert_eq!(forward, reversed);
        assert_eq!(forward.winner.as_deref(), Some("A"));
    }

    #[test]
    fn test_resolve_classic_empty_has_no_winner() {
        let outcome = resolve_classic(&options(&["Yes", "No"]), &[]);
        assert_eq!(outcome.winner, None);
        assert_eq!(outcome.total_votes, 0);
        assert_eq!(outcome.tally.len(), 2);
        assert!(outcome.tally.values().all(|&c| c == 0));
    }

    #[test]
    fn test_resolve_classic_tally_keeps_option_order() {
        let outcome = resolve_classic(&options(&["C", "A", "B"]), &[sub(1, "a", "B")]);
        let keys: Vec<&str> = outcome.tally.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["C", "A", "B"]);
    }

    // =====================================================================
    // Prediction
    // =====================================================================

    #[test]
    fn test_resolve_prediction_winners_in_submission_order() {
        let subs = [sub(1, "alice", "X"), sub(2, "bob", "Y"), sub(3, "carol", "X")];
        let outcome = resolve_prediction(&subs, "X", &[]);

        assert_eq!(outcome.winners, vec!["alice", "carol"]);
        assert_eq!(outcome.scores.len(), 2);
        assert!(outcome.scores.iter().all(|e| e.points == 1));
        assert!(outcome.scores.iter().all(|e| e.display_name != "bob"));
    }

    #[test]
    fn test_resolve_prediction_accumulates_prior_scores() {
        let prior = vec![
            ScoreEntry {
                identity: Identity::Connection(ConnectionId::new(2)),
                display_name: "bob".into(),
                points: 3,
            },
            ScoreEntry {
                identity: Identity::Connection(ConnectionId::new(1)),
                display_name: "alice".into(),
                points: 1,
            },
        ];
        let subs = [sub(1, "alice", "X"), sub(2, "bob", "Y")];
        let outcome = resolve_prediction(&subs, "X", &prior);

        let alice = outcome
            .scores
            .iter()
            .find(|e| e.display_name == "alice")
            .unwrap();
        let bob = outcome.scores.iter().find(|e| e.display_name == "bob").unwrap();
        assert_eq!(alice.points, 2);
        assert_eq!(bob.points, 3, "wrong prediction leaves score untouched");
        assert_eq!(outcome.scores[0].display_name, "bob", "highest first");
    }

    #[test]
    fn test_resolve_prediction_same_name_different_identity_scored_separately() {
        let subs = [sub(1, "sam", "X"), sub(2, "sam", "X")];
        let outcome = resolve_prediction(&subs, "X", &[]);
        assert_eq!(outcome.scores.len(), 2);
        assert_eq!(outcome.winners, vec!["sam", "sam"]);
    }

    #[test]
    fn test_resolve_prediction_credits_identity_once() {
        let user = Identity::User(UserRef::new("u-1"));
        let mut first = sub(1, "alice", "X");
        first.identity = user.clone();
        let mut second = sub(2, "alice", "X");
        second.identity = user;

        let outcome = resolve_prediction(&[first, second], "X", &[]);
        assert_eq!(outcome.winners, vec!["alice"]);
        assert_eq!(outcome.scores[0].points, 1);
    }

    #[test]
    fn test_resolve_prediction_no_correct_answers() {
        let outcome = resolve_prediction(&[sub(1, "alice", "Y")], "X", &[]);
        assert!(outcome.winners.is_empty());
        assert!(outcome.scores.is_empty());
    }
}
