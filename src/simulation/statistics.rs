use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::season::Season;

/// A character singled out by a count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standout {
    pub character_id: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RivalryStat {
    pub first: String,
    pub second: String,
    /// Votes cast between the two in either direction.
    pub mutual_votes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoyaltyStat {
    pub character_id: String,
    /// Share of votes that matched the voter's alliance majority.
    pub ratio: f64,
    pub votes_considered: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlipStat {
    pub voter_id: String,
    pub target_id: String,
    pub round: u32,
}

/// Season-wide awards, derived from round history once a champion exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonStats {
    pub champion: String,
    pub rounds_played: u32,
    pub most_strategic: Option<Standout>,
    pub biggest_rivalry: Option<RivalryStat>,
    pub most_loyal: Option<LoyaltyStat>,
    pub social_butterfly: Option<Standout>,
    pub biggest_flip: Option<FlipStat>,
    pub underdog: Option<Standout>,
}

/// Compute the awards. `None` until the season has a champion.
pub fn compute_season_stats(season: &Season) -> Option<SeasonStats> {
    let champion = season.champion.clone()?;
    Some(SeasonStats {
        champion,
        rounds_played: season.rounds.len() as u32,
        most_strategic: most_strategic(season),
        biggest_rivalry: biggest_rivalry(season),
        most_loyal: most_loyal(season),
        social_butterfly: social_butterfly(season),
        biggest_flip: biggest_flip(season),
        underdog: underdog(season),
    })
}

/// Highest positive count, earliest in cast order on ties.
fn top_in_cast_order(season: &Season, counts: &BTreeMap<String, u32>) -> Option<Standout> {
    let mut best: Option<Standout> = None;
    for id in &season.cast {
        let count = counts.get(id).copied().unwrap_or(0);
        if count > 0 && best.as_ref().is_none_or(|b| count > b.count) {
            best = Some(Standout {
                character_id: id.clone(),
                count,
            });
        }
    }
    best
}

fn most_strategic(season: &Season) -> Option<Standout> {
    let mut correct: BTreeMap<String, u32> = BTreeMap::new();
    for round in &season.rounds {
        let Some(out) = &round.eliminated else {
            continue;
        };
        for v in round.votes.iter().filter(|v| &v.target_id == out) {
            *correct.entry(v.voter_id.clone()).or_insert(0) += 1;
        }
    }
    top_in_cast_order(season, &correct)
}

fn biggest_rivalry(season: &Season) -> Option<RivalryStat> {
    let mut directed: BTreeMap<(&str, &str), u32> = BTreeMap::new();
    for v in season.rounds.iter().flat_map(|r| &r.votes) {
        *directed.entry((v.voter_id.as_str(), v.target_id.as_str())).or_insert(0) += 1;
    }

    let mut best: Option<RivalryStat> = None;
    for (i, a) in season.cast.iter().enumerate() {
        for b in &season.cast[i + 1..] {
            let ab = directed.get(&(a.as_str(), b.as_str())).copied().unwrap_or(0);
            let ba = directed.get(&(b.as_str(), a.as_str())).copied().unwrap_or(0);
            if ab == 0 || ba == 0 {
                continue;
            }
            if best.as_ref().is_none_or(|r| ab + ba > r.mutual_votes) {
                best = Some(RivalryStat {
                    first: a.clone(),
                    second: b.clone(),
                    mutual_votes: ab + ba,
                });
            }
        }
    }
    best
}

fn most_loyal(season: &Season) -> Option<LoyaltyStat> {
    // (with majority, considered)
    let mut tally: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for round in &season.rounds {
        for v in &round.votes {
            let Some(voter) = season.dossiers.get(&v.voter_id) else {
                continue;
            };
            let allies = voter.allies_in_round(round.round);
            let mut ally_targets: BTreeMap<&str, u32> = BTreeMap::new();
            for w in round.votes.iter().filter(|w| allies.contains(&w.voter_id)) {
                *ally_targets.entry(w.target_id.as_str()).or_insert(0) += 1;
            }
            let Some(top) = ally_targets.values().max().copied() else {
                continue;
            };
            let entry = tally.entry(v.voter_id.as_str()).or_insert((0, 0));
            entry.1 += 1;
            if ally_targets.get(v.target_id.as_str()) == Some(&top) {
                entry.0 += 1;
            }
        }
    }

    let mut best: Option<LoyaltyStat> = None;
    for id in &season.cast {
        let Some(&(with, considered)) = tally.get(id.as_str()) else {
            continue;
        };
        let ratio = with as f64 / considered as f64;
        let better = best.as_ref().is_none_or(|b| {
            ratio > b.ratio || (ratio == b.ratio && considered > b.votes_considered)
        });
        if better {
            best = Some(LoyaltyStat {
                character_id: id.clone(),
                ratio,
                votes_considered: considered,
            });
        }
    }
    best
}

fn social_butterfly(season: &Season) -> Option<Standout> {
    let breadth: BTreeMap<String, u32> = season
        .dossiers
        .values()
        .map(|d| {
            let mates: BTreeSet<&String> = d.snapshots.values().flat_map(|s| &s.allies).collect();
            (d.character_id.clone(), mates.len() as u32)
        })
        .collect();
    top_in_cast_order(season, &breadth)
}

fn biggest_flip(season: &Season) -> Option<FlipStat> {
    season.rounds.iter().find_map(|round| {
        round.votes.iter().find_map(|v| {
            let voter = season.dossiers.get(&v.voter_id)?;
            voter
                .allies_in_round(round.round)
                .contains(&v.target_id)
                .then(|| FlipStat {
                    voter_id: v.voter_id.clone(),
                    target_id: v.target_id.clone(),
                    round: round.round,
                })
        })
    })
}

fn underdog(season: &Season) -> Option<Standout> {
    let mut survived: BTreeMap<String, u32> = BTreeMap::new();
    for round in &season.rounds {
        for v in &round.votes {
            if round.eliminated.as_ref() != Some(&v.target_id) {
                *survived.entry(v.target_id.clone()).or_insert(0) += 1;
            }
        }
    }
    top_in_cast_order(season, &survived)
}
