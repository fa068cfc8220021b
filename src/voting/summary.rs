use crate::models::{Poll, TallyResult};

// Text block shown in the room when results are requested or a poll ends
pub struct PollSummary {
    pub leader: String,
    pub summary: String,
}

pub fn summarize(poll: &Poll, results: &[TallyResult], total_ballots: usize, total_participants: u32) -> PollSummary {
    if total_ballots == 0 {
        return PollSummary {
            leader: "No votes were cast".to_string(),
            summary: format!("Poll \"{}\": no votes were cast.", poll.question),
        };
    }

    // Highest vote count wins; every tied option is named
    let top_votes = results.iter().map(|r| r.votes).max().unwrap_or(0);
    let leaders: Vec<&TallyResult> = results.iter().filter(|r| r.votes == top_votes).collect();

    let leader = if leaders.len() == 1 {
        option_text(poll, leaders[0].option_index)
    } else {
        let names: Vec<String> = leaders.iter().map(|r| option_text(poll, r.option_index)).collect();
        format!("Tie: {}", names.join(", "))
    };

    let mut summary = format!("Poll \"{}\"", poll.question);
    if poll.multi_select {
        summary.push_str(" (multiple choice)");
    }
    summary.push('\n');

    for result in results {
        let name = option_text(poll, result.option_index);
        let line = if result.votes == top_votes {
            format!(
                "{}. **{}**: {} votes ({:.1}%, {:.1}% of room)",
                result.option_index + 1,
                name,
                result.votes,
                result.percentage,
                result.participation_rate
            )
        } else {
            format!(
                "{}. {}: {} votes ({:.1}%, {:.1}% of room)",
                result.option_index + 1,
                name,
                result.votes,
                result.percentage,
                result.participation_rate
            )
        };
        summary.push_str(&line);
        summary.push('\n');
    }

    summary.push_str(&format!("{} of {} members voted.", total_ballots, total_participants));

    PollSummary { leader, summary }
}

fn option_text(poll: &Poll, index: usize) -> String {
    poll.options
        .get(index)
        .cloned()
        .unwrap_or_else(|| "Unknown Option".to_string())
}
