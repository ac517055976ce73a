use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::rules::GameRules;
use crate::season::dossier::{Advantage, Archetype, Dossier};
use crate::season::log::Vote;
use crate::simulation::alliances::{share_alliance, Alliance};
use crate::simulation::rng::SeededRng;
use crate::simulation::voting::{calculate_vote, vote_candidates};

/// Hidden advantages found around camp this round, in cast order.
pub fn discover_advantages(
    dossiers: &BTreeMap<String, Dossier>,
    cast: &[String],
    rules: &GameRules,
    rng: &mut SeededRng,
) -> Vec<(String, Advantage)> {
    let mut found = Vec::new();
    for d in cast.iter().filter_map(|id| dossiers.get(id)).filter(|d| d.is_active()) {
        if rng.chance(rules.advantage_discovery_chance)
            && let Some(kind) = rng.select(Advantage::all())
        {
            found.push((d.character_id.clone(), *kind));
        }
    }
    found
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvantagePlay {
    pub holder: String,
    pub advantage: Advantage,
    /// Whose vote was blocked, or who the extra vote targeted.
    pub affected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdvantageOutcome {
    pub plays: Vec<AdvantagePlay>,
    /// Characters whose votes against them no longer count.
    pub nullified: Vec<String>,
    pub extra_votes: Vec<Vote>,
    /// Indices into `cast votes ++ extra_votes` removed from the tally.
    pub blocked: Vec<usize>,
}

impl AdvantageOutcome {
    /// Cast votes followed by extra votes, the order `blocked` indexes into.
    pub fn all_votes(&self, cast_votes: &[Vote]) -> Vec<Vote> {
        let mut all = cast_votes.to_vec();
        all.extend(self.extra_votes.iter().cloned());
        all
    }
}

/// Snapshot of everything the advantage phase reads.
pub struct AdvantageContext<'a> {
    pub dossiers: &'a BTreeMap<String, Dossier>,
    pub cast: &'a [String],
    pub alliances: &'a [Alliance],
    pub votes: &'a [Vote],
    pub round: u32,
    pub rules: &'a GameRules,
}

/// Vote counts per target, skipping blocked votes and nullified targets.
/// Keys are ordered, so iteration is stable.
pub fn counted_tally(votes: &[Vote], blocked: &[usize], nullified: &[String]) -> BTreeMap<String, u32> {
    let mut tally = BTreeMap::new();
    for (i, v) in votes.iter().enumerate() {
        if blocked.contains(&i) || nullified.contains(&v.target_id) {
            continue;
        }
        *tally.entry(v.target_id.clone()).or_insert(0) += 1;
    }
    tally
}

/// Top two tallies within `margin` of each other. A lone target counts
/// against an implicit zero.
pub fn is_close_vote(tally: &BTreeMap<String, u32>, margin: u32) -> bool {
    let mut counts: Vec<u32> = tally.values().copied().collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    match counts.as_slice() {
        [] => false,
        [top] => *top <= margin,
        [top, second, ..] => top - second <= margin,
    }
}

/// Resolve advantage plays for the round.
///
/// Holders are processed in cast order and each held advantage in the order
/// it was found, so the shared rng stream is consumed reproducibly. The
/// secondary rng checks only draw when the primary condition fails.
pub fn resolve_advantages(ctx: &AdvantageContext, rng: &mut SeededRng) -> AdvantageOutcome {
    let mut outcome = AdvantageOutcome::default();

    for holder in ctx
        .cast
        .iter()
        .filter_map(|id| ctx.dossiers.get(id))
        .filter(|d| d.is_active())
    {
        let id = holder.character_id.as_str();
        for advantage in holder.advantages.clone() {
            let working = outcome.all_votes(ctx.votes);
            match advantage {
                Advantage::ImmunityIdol => {
                    if outcome.nullified.iter().any(|n| n == id) {
                        continue;
                    }
                    let counted: Vec<&Vote> = working
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| !outcome.blocked.contains(i))
                        .map(|(_, v)| v)
                        .collect();
                    let against = counted.iter().filter(|v| v.target_id == id).count();
                    let share = if counted.is_empty() {
                        0.0
                    } else {
                        against as f64 / counted.len() as f64
                    };
                    if share >= ctx.rules.idol_vote_share || rng.chance(ctx.rules.idol_whim_chance) {
                        outcome.nullified.push(id.to_string());
                        outcome.plays.push(AdvantagePlay {
                            holder: id.to_string(),
                            advantage,
                            affected: None,
                        });
                    }
                }
                Advantage::ExtraVote => {
                    if !triggered(holder, &working, &outcome, ctx.rules, rng) {
                        continue;
                    }
                    let candidates =
                        vote_candidates(id, ctx.dossiers, ctx.cast, ctx.alliances, ctx.round);
                    if let Some(choice) = calculate_vote(holder, &candidates, ctx.alliances, ctx.rules, rng) {
                        outcome.plays.push(AdvantagePlay {
                            holder: id.to_string(),
                            advantage,
                            affected: Some(choice.target_id.clone()),
                        });
                        outcome.extra_votes.push(Vote {
                            voter_id: id.to_string(),
                            target_id: choice.target_id,
                            reasoning: choice.reasoning,
                            extra: true,
                        });
                    }
                }
                Advantage::BlockVote => {
                    if !triggered(holder, &working, &outcome, ctx.rules, rng) {
                        continue;
                    }
                    if let Some(idx) = least_trusted_vote(holder, &working, &outcome.blocked, ctx) {
                        outcome.plays.push(AdvantagePlay {
                            holder: id.to_string(),
                            advantage,
                            affected: Some(working[idx].voter_id.clone()),
                        });
                        outcome.blocked.push(idx);
                    }
                }
            }
        }
    }

    outcome
}

fn triggered(
    holder: &Dossier,
    working: &[Vote],
    outcome: &AdvantageOutcome,
    rules: &GameRules,
    rng: &mut SeededRng,
) -> bool {
    let tally = counted_tally(working, &outcome.blocked, &outcome.nullified);
    if is_close_vote(&tally, rules.close_vote_margin) {
        return true;
    }
    holder.archetype == Archetype::Strategist && rng.chance(rules.strategist_trigger_chance)
}

/// First counted vote cast by the non-ally voter the holder trusts least.
fn least_trusted_vote(
    holder: &Dossier,
    working: &[Vote],
    blocked: &[usize],
    ctx: &AdvantageContext,
) -> Option<usize> {
    let mut best: Option<(f64, usize)> = None;
    for (i, v) in working.iter().enumerate() {
        if blocked.contains(&i)
            || v.voter_id == holder.character_id
            || share_alliance(ctx.alliances, &holder.character_id, &v.voter_id)
        {
            continue;
        }
        let trust = holder.trust_toward(ctx.round, &v.voter_id);
        if best.is_none_or(|(t, _)| trust < t) {
            best = Some((trust, i));
        }
    }
    best.map(|(_, i)| i)
}

/// Apply an outcome's consumption to the holders' dossiers.
pub fn consume_played(dossiers: &mut BTreeMap<String, Dossier>, outcome: &AdvantageOutcome) {
    for play in &outcome.plays {
        if let Some(d) = dossiers.get_mut(&play.holder) {
            d.consume(play.advantage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season::dossier::Traits;

    fn traits() -> Traits {
        Traits {
            logic: 0.5,
            endurance: 0.5,
            persuasion: 0.5,
            chaos: 0.5,
            creative: 0.5,
        }
    }

    fn setup(ids: &[&str]) -> (Vec<String>, BTreeMap<String, Dossier>) {
        let cast: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        let dossiers = ids
            .iter()
            .map(|id| (id.to_string(), Dossier::new(id, id, Archetype::Underdog, traits())))
            .collect();
        (cast, dossiers)
    }

    fn vote(voter: &str, target: &str) -> Vote {
        Vote {
            voter_id: voter.to_string(),
            target_id: target.to_string(),
            reasoning: String::new(),
            extra: false,
        }
    }

    fn no_whims() -> GameRules {
        GameRules {
            idol_whim_chance: 0.0,
            strategist_trigger_chance: 0.0,
            ..GameRules::default()
        }
    }

    #[test]
    fn idol_nullifies_only_votes_against_holder() {
        let (cast, mut dossiers) = setup(&["a", "b", "c", "d"]);
        dossiers.get_mut("a").unwrap().advantages.push(Advantage::ImmunityIdol);
        let votes = vec![vote("b", "a"), vote("c", "a"), vote("d", "b"), vote("a", "b")];
        let rules = no_whims();
        let ctx = AdvantageContext { dossiers: &dossiers, cast: &cast, alliances: &[], votes: &votes, round: 1, rules: &rules };
        let outcome = resolve_advantages(&ctx, &mut SeededRng::new(1, 1));

        assert_eq!(outcome.nullified, vec!["a".to_string()]);
        let tally = counted_tally(&outcome.all_votes(&votes), &outcome.blocked, &outcome.nullified);
        assert_eq!(tally.get("a"), None);
        assert_eq!(tally["b"], 2);
        // the recorded votes are untouched
        assert_eq!(votes.iter().filter(|v| v.target_id == "a").count(), 2);
    }

    #[test]
    fn idol_kept_when_holder_is_safe() {
        let (cast, mut dossiers) = setup(&["a", "b", "c", "d"]);
        dossiers.get_mut("a").unwrap().advantages.push(Advantage::ImmunityIdol);
        let votes = vec![vote("a", "b"), vote("c", "b"), vote("d", "b"), vote("b", "c")];
        let rules = no_whims();
        let ctx = AdvantageContext { dossiers: &dossiers, cast: &cast, alliances: &[], votes: &votes, round: 1, rules: &rules };
        let outcome = resolve_advantages(&ctx, &mut SeededRng::new(1, 1));
        assert!(outcome.plays.is_empty());
    }

    #[test]
    fn extra_vote_fires_on_close_vote() {
        let (cast, mut dossiers) = setup(&["a", "b", "c", "d"]);
        dossiers.get_mut("a").unwrap().advantages.push(Advantage::ExtraVote);
        let votes = vec![vote("a", "c"), vote("b", "c"), vote("c", "d"), vote("d", "a")];
        let rules = no_whims();
        let ctx = AdvantageContext { dossiers: &dossiers, cast: &cast, alliances: &[], votes: &votes, round: 1, rules: &rules };
        let outcome = resolve_advantages(&ctx, &mut SeededRng::new(1, 1));
        assert_eq!(outcome.extra_votes.len(), 1);
        assert!(outcome.extra_votes[0].extra);
        assert_eq!(outcome.extra_votes[0].voter_id, "a");
        assert_ne!(outcome.extra_votes[0].target_id, "a");
    }

    #[test]
    fn extra_vote_waits_for_a_close_vote() {
        let (cast, mut dossiers) = setup(&["a", "b", "c", "d", "e"]);
        dossiers.get_mut("a").unwrap().advantages.push(Advantage::ExtraVote);
        let votes = vec![vote("a", "c"), vote("b", "c"), vote("d", "c"), vote("e", "c"), vote("c", "a")];
        let rules = no_whims();
        let ctx = AdvantageContext { dossiers: &dossiers, cast: &cast, alliances: &[], votes: &votes, round: 1, rules: &rules };
        let outcome = resolve_advantages(&ctx, &mut SeededRng::new(1, 1));
        assert!(outcome.extra_votes.is_empty());
    }

    #[test]
    fn block_removes_least_trusted_non_ally_vote() {
        let (cast, mut dossiers) = setup(&["a", "b", "c", "d"]);
        {
            let a = dossiers.get_mut("a").unwrap();
            a.advantages.push(Advantage::BlockVote);
            let s = a.ensure_snapshot(1);
            s.trust.insert("b".into(), -0.2);
            s.trust.insert("c".into(), -0.8);
            s.trust.insert("d".into(), -1.5);
        }
        let alliances = vec![Alliance { id: 0, members: vec!["a".into(), "d".into()], strength: 0.6, formed_round: 1 }];
        let votes = vec![vote("b", "a"), vote("c", "a"), vote("d", "b"), vote("a", "b")];
        let rules = no_whims();
        let ctx = AdvantageContext { dossiers: &dossiers, cast: &cast, alliances: &alliances, votes: &votes, round: 1, rules: &rules };
        let outcome = resolve_advantages(&ctx, &mut SeededRng::new(1, 1));
        // d is trusted least but allied; c is the least-trusted outsider.
        assert_eq!(outcome.blocked, vec![1]);
        assert_eq!(outcome.plays[0].affected.as_deref(), Some("c"));
    }

    #[test]
    fn close_vote_detection() {
        let mut tally = BTreeMap::new();
        assert!(!is_close_vote(&tally, 1));
        tally.insert("a".to_string(), 1);
        assert!(is_close_vote(&tally, 1));
        tally.insert("a".to_string(), 3);
        tally.insert("b".to_string(), 2);
        assert!(is_close_vote(&tally, 1));
        tally.insert("a".to_string(), 4);
        assert!(!is_close_vote(&tally, 1));
    }

    #[test]
    fn discovery_is_seeded() {
        let (cast, dossiers) = setup(&["a", "b", "c", "d", "e", "f"]);
        let rules = GameRules {
            advantage_discovery_chance: 0.5,
            ..GameRules::default()
        };
        let x = discover_advantages(&dossiers, &cast, &rules, &mut SeededRng::new(3, 2));
        let y = discover_advantages(&dossiers, &cast, &rules, &mut SeededRng::new(3, 2));
        assert_eq!(x, y);
        let none = GameRules {
            advantage_discovery_chance: 0.0,
            ..GameRules::default()
        };
        assert!(discover_advantages(&dossiers, &cast, &none, &mut SeededRng::new(3, 2)).is_empty());
    }

    #[test]
    fn consumed_advantages_leave_the_dossier() {
        let (_, mut dossiers) = setup(&["a"]);
        dossiers.get_mut("a").unwrap().advantages = vec![Advantage::ImmunityIdol, Advantage::ImmunityIdol];
        let outcome = AdvantageOutcome {
            plays: vec![AdvantagePlay { holder: "a".into(), advantage: Advantage::ImmunityIdol, affected: None }],
            ..AdvantageOutcome::default()
        };
        consume_played(&mut dossiers, &outcome);
        assert_eq!(dossiers["a"].advantages, vec![Advantage::ImmunityIdol]);
    }
}
