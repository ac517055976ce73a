use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::rules::GameRules;
use crate::season::Bets;
use crate::season::log::RoundSummary;
use crate::simulation::rng::SeededRng;
use crate::simulation::voting::{trial_wins, votes_received};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JuryVote {
    pub juror_id: String,
    pub finalist_id: String,
}

/// Which rule settled a tie at the top of the jury tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieBreak {
    TrialWins,
    FewerVotesReceived,
    SeededPick,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub champion: Option<String>,
    pub tallies: BTreeMap<String, u32>,
    pub tie_break: Option<TieBreak>,
}

/// Tally jury votes and break ties: more trial wins, then fewer votes
/// received across the season, then a seeded pick.
pub fn resolve_champion(
    finalists: &[String],
    jury_votes: &[JuryVote],
    rounds: &[RoundSummary],
    rng: &mut SeededRng,
) -> Resolution {
    let mut tallies: BTreeMap<String, u32> = finalists.iter().map(|f| (f.clone(), 0)).collect();
    for v in jury_votes {
        if let Some(count) = tallies.get_mut(&v.finalist_id) {
            *count += 1;
        }
    }

    let top = tallies.values().copied().max().unwrap_or(0);
    let mut tied: Vec<&String> = finalists.iter().filter(|f| tallies[*f] == top).collect();

    if tied.len() <= 1 {
        return Resolution {
            champion: tied.first().map(|s| s.to_string()),
            tallies,
            tie_break: None,
        };
    }

    let most_wins = tied.iter().map(|f| trial_wins(rounds, f)).max().unwrap_or(0);
    tied.retain(|f| trial_wins(rounds, f) == most_wins);
    if tied.len() == 1 {
        return Resolution {
            champion: Some(tied[0].clone()),
            tallies,
            tie_break: Some(TieBreak::TrialWins),
        };
    }

    let fewest = tied.iter().map(|f| votes_received(rounds, f)).min().unwrap_or(0);
    tied.retain(|f| votes_received(rounds, f) == fewest);
    if tied.len() == 1 {
        return Resolution {
            champion: Some(tied[0].clone()),
            tallies,
            tie_break: Some(TieBreak::FewerVotesReceived),
        };
    }

    Resolution {
        champion: rng.select(&tied).map(|s| s.to_string()),
        tallies,
        tie_break: Some(TieBreak::SeededPick),
    }
}

/// Points earned by the viewer's bets once the champion is known.
pub fn bet_payout(bets: &Bets, champion: &str, rules: &GameRules) -> i32 {
    let mut points = 0;
    if bets.opening.as_deref() == Some(champion) {
        points += rules.opening_bet_payout;
    }
    if bets.final_pick.as_deref() == Some(champion) {
        points += rules.final_bet_payout;
    }
    points
}
