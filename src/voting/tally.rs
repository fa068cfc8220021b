use thiserror::Error;

use crate::models::{Ballot, TallyResult};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    #[error("options count must be positive, got {0}")]
    InvalidOptionsCount(i32),

    #[error("ballot {ballot_id} selects option {index}, poll only has {options_count}")]
    InvalidOptionIndex {
        ballot_id: String,
        index: i32,
        options_count: i32,
    },
}

/// Aggregates ballots into per-option statistics.
///
/// A ballot may select several options, so the vote counts can sum to more
/// than the number of ballots. Percentages are relative to the number of
/// ballots, participation rates to the room's membership. Any index outside
/// `[0, options_count)` fails the whole computation.
pub fn compute_stats(
    ballots: &[Ballot],
    total_participants: u32,
    options_count: i32,
) -> Result<Vec<TallyResult>, TallyError> {
    if options_count <= 0 {
        return Err(TallyError::InvalidOptionsCount(options_count));
    }

    let mut counts = vec![0u32; options_count as usize];
    for ballot in ballots {
        for &index in &ballot.option_indices {
            if index < 0 || index >= options_count {
                return Err(TallyError::InvalidOptionIndex {
                    ballot_id: ballot.id.clone(),
                    index,
                    options_count,
                });
            }
            counts[index as usize] += 1;
        }
    }

    let total_ballots = ballots.len();
    let results = counts
        .into_iter()
        .enumerate()
        .map(|(option_index, votes)| TallyResult {
            option_index,
            votes,
            percentage: share(votes, total_ballots as u64),
            participation_rate: share(votes, total_participants as u64),
        })
        .collect();

    Ok(results)
}

fn share(votes: u32, total: u64) -> f64 {
    if total > 0 {
        votes as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(indices: &[i32]) -> Ballot {
        Ballot::new("poll".to_string(), "user".to_string(), indices.to_vec())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn empty_ballots_give_zeroed_rows() {
        let results = compute_stats(&[], 5, 3).unwrap();
        assert_eq!(
            results,
            vec![
                TallyResult { option_index: 0, votes: 0, percentage: 0.0, participation_rate: 0.0 },
                TallyResult { option_index: 1, votes: 0, percentage: 0.0, participation_rate: 0.0 },
                TallyResult { option_index: 2, votes: 0, percentage: 0.0, participation_rate: 0.0 },
            ]
        );
    }

    #[test]
    fn empty_ballots_ignore_participant_count() {
        for participants in [0, 1, 1000] {
            let results = compute_stats(&[], participants, 4).unwrap();
            assert_eq!(results.len(), 4);
            assert!(results.iter().all(|r| r.votes == 0 && r.participation_rate == 0.0));
        }
    }

    #[test]
    fn multi_select_counts_every_choice() {
        let ballots = vec![ballot(&[0]), ballot(&[0, 1]), ballot(&[2])];
        let results = compute_stats(&ballots, 10, 3).unwrap();

        let votes: Vec<u32> = results.iter().map(|r| r.votes).collect();
        assert_eq!(votes, vec![2, 1, 1]);

        assert!(approx(results[0].percentage, 66.67));
        assert!(approx(results[1].percentage, 33.33));
        assert!(approx(results[2].percentage, 33.33));

        assert!(approx(results[0].participation_rate, 20.0));
        assert!(approx(results[1].participation_rate, 10.0));
        assert!(approx(results[2].participation_rate, 10.0));
    }

    #[test]
    fn percentages_use_ballot_count_not_selection_count() {
        let ballots = vec![ballot(&[0, 1]), ballot(&[0, 1])];
        let results = compute_stats(&ballots, 2, 2).unwrap();
        let total: f64 = results.iter().map(|r| r.percentage).sum();
        assert!(approx(total, 200.0));
    }

    #[test]
    fn zero_participants_zero_rates() {
        let ballots = vec![ballot(&[1]), ballot(&[1]), ballot(&[0])];
        let results = compute_stats(&ballots, 0, 2).unwrap();
        assert!(results.iter().all(|r| r.participation_rate == 0.0));
        assert!(approx(results[0].percentage, 33.33));
        assert!(approx(results[1].percentage, 66.67));
    }

    #[test]
    fn vote_sum_matches_ballots_for_single_choice() {
        let ballots = vec![ballot(&[0]), ballot(&[1]), ballot(&[1]), ballot(&[2])];
        let results = compute_stats(&ballots, 4, 3).unwrap();
        let sum: u32 = results.iter().map(|r| r.votes).sum();
        assert_eq!(sum as usize, ballots.len());
    }

    #[test]
    fn vote_sum_exceeds_ballots_for_multi_choice() {
        let ballots = vec![ballot(&[0]), ballot(&[1, 2])];
        let results = compute_stats(&ballots, 4, 3).unwrap();
        let sum: u32 = results.iter().map(|r| r.votes).sum();
        assert!(sum as usize > ballots.len());
    }

    #[test]
    fn results_ordered_by_option_index() {
        let ballots = vec![ballot(&[4]), ballot(&[2])];
        let results = compute_stats(&ballots, 2, 5).unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.option_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn non_positive_options_count_fails() {
        assert_eq!(compute_stats(&[], 3, 0), Err(TallyError::InvalidOptionsCount(0)));
        assert_eq!(
            compute_stats(&[ballot(&[0])], 3, -2),
            Err(TallyError::InvalidOptionsCount(-2))
        );
    }

    #[test]
    fn out_of_range_index_fails() {
        let bad = ballot(&[5]);
        let ballots = vec![ballot(&[0]), bad.clone()];
        let err = compute_stats(&ballots, 10, 3).unwrap_err();
        assert_eq!(
            err,
            TallyError::InvalidOptionIndex { ballot_id: bad.id, index: 5, options_count: 3 }
        );
    }

    #[test]
    fn negative_index_fails() {
        let err = compute_stats(&[ballot(&[-1])], 1, 3).unwrap_err();
        assert!(matches!(err, TallyError::InvalidOptionIndex { index: -1, .. }));
    }
}
