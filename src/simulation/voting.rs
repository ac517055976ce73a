use std::collections::BTreeMap;

use crate::config::rules::GameRules;
use crate::season::dossier::{Archetype, Dossier};
use crate::season::log::RoundSummary;
use crate::simulation::alliances::{share_alliance, Alliance};
use crate::simulation::rng::SeededRng;

#[derive(Debug, Clone, PartialEq)]
pub struct VoteChoice {
    pub target_id: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Penalty {
    Outsider,
    Threat,
    Rivalry,
}

fn reasoning_for(penalty: Option<Penalty>, target_name: &str) -> String {
    match penalty {
        Some(Penalty::Outsider) => {
            format!("{} isn't one of us, and I stand with my people.", target_name)
        }
        Some(Penalty::Threat) => {
            format!("{} is too dangerous to sit next to at the end.", target_name)
        }
        Some(Penalty::Rivalry) => {
            format!("This one is personal. {} has been coming for me.", target_name)
        }
        None => format!(
            "Nothing personal. {} is simply the vote that makes sense tonight.",
            target_name
        ),
    }
}

/// Pick one elimination vote for `voter` among `candidates`.
///
/// Lower scores are more votable. Wildcards draw one jitter per candidate in
/// candidate order; nobody else touches the rng. Returns `None` when there is
/// nobody to vote for.
pub fn calculate_vote(
    voter: &Dossier,
    candidates: &[&Dossier],
    alliances: &[Alliance],
    rules: &GameRules,
    rng: &mut SeededRng,
) -> Option<VoteChoice> {
    let mut scored: Vec<(f64, Option<Penalty>, &Dossier)> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let mut score = 0.0;
        let mut first_penalty = None;
        let allied = share_alliance(alliances, &voter.character_id, &candidate.character_id);

        if allied {
            score += rules.ally_bonus;
        }
        if voter.archetype == Archetype::Loyalist && !allied {
            score -= rules.loyalist_outsider_penalty;
            first_penalty.get_or_insert(Penalty::Outsider);
        }
        if voter.archetype == Archetype::Strategist
            && candidate.traits.strategic_threat() > rules.strategic_threat_floor
        {
            score -= rules.strategic_threat_penalty;
            first_penalty.get_or_insert(Penalty::Threat);
        }
        if voter.is_rival(&candidate.character_id) {
            score -= rules.rivalry_penalty;
            first_penalty.get_or_insert(Penalty::Rivalry);
        }
        if voter.archetype == Archetype::Wildcard {
            score += (rng.next() - 0.5) * rules.wildcard_jitter;
        }

        scored.push((score, first_penalty, candidate));
    }

    // Stable sort keeps candidate order among equal scores.
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    scored.first().map(|(_, penalty, target)| VoteChoice {
        target_id: target.character_id.clone(),
        reasoning: reasoning_for(*penalty, &target.name),
    })
}

/// Legal targets for `voter_id` this round, in cast order.
///
/// Excludes the voter, eliminated and immune characters. Allies are dropped
/// too as long as that leaves someone to vote for.
pub fn vote_candidates<'a>(
    voter_id: &str,
    dossiers: &'a BTreeMap<String, Dossier>,
    cast: &[String],
    alliances: &[Alliance],
    round: u32,
) -> Vec<&'a Dossier> {
    let open: Vec<&Dossier> = cast
        .iter()
        .filter(|id| id.as_str() != voter_id)
        .filter_map(|id| dossiers.get(id))
        .filter(|d| d.is_active() && !d.is_immune(round))
        .collect();

    let outsiders: Vec<&Dossier> = open
        .iter()
        .copied()
        .filter(|d| !share_alliance(alliances, voter_id, &d.character_id))
        .collect();

    if outsiders.is_empty() { open } else { outsiders }
}

pub fn trial_wins(rounds: &[RoundSummary], character_id: &str) -> usize {
    rounds
        .iter()
        .filter(|r| r.trial_winners.iter().any(|w| w == character_id))
        .count()
}

/// Votes received across the whole season, nullified ones included.
pub fn votes_received(rounds: &[RoundSummary], character_id: &str) -> usize {
    rounds.iter().map(|r| r.votes_against(character_id)).sum()
}

fn voted_out(rounds: &[RoundSummary], finalist_id: &str, juror: &Dossier) -> bool {
    let Some(round) = juror.eliminated_round else {
        return false;
    };
    rounds
        .iter()
        .filter(|r| r.round == round && r.eliminated.as_deref() == Some(juror.character_id.as_str()))
        .flat_map(|r| r.votes.iter())
        .any(|v| v.voter_id == finalist_id && v.target_id == juror.character_id)
}

/// A juror's vote for the champion. One rng draw per finalist, in order.
pub fn calculate_jury_vote(
    juror: &Dossier,
    finalists: &[&Dossier],
    rounds: &[RoundSummary],
    rules: &GameRules,
    rng: &mut SeededRng,
) -> Option<String> {
    let mut best: Option<(f64, &str)> = None;
    for finalist in finalists {
        let id = finalist.character_id.as_str();
        let mut score = 0.0;
        if voted_out(rounds, id, juror) {
            score -= rules.jury_voted_out_penalty;
        }
        if juror.was_ever_allied_with(id) || finalist.was_ever_allied_with(&juror.character_id) {
            score += rules.jury_ally_bonus;
        }
        score += trial_wins(rounds, id) as f64;
        score += rng.next();

        if best.is_none_or(|(b, _)| score > b) {
            best = Some((score, id));
        }
    }
    best.map(|(_, id)| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season::dossier::Traits;
    use crate::season::log::VoteRecord;
    use crate::simulation::trial::TrialCategory;

    fn d(id: &str, archetype: Archetype, logic: f64, persuasion: f64) -> Dossier {
        Dossier::new(
            id,
            &id.to_uppercase(),
            archetype,
            Traits {
                logic,
                endurance: 0.5,
                persuasion,
                chaos: 0.5,
                creative: 0.5,
            },
        )
    }

    fn alliance(id: u32, members: &[&str]) -> Alliance {
        Alliance {
            id,
            members: members.iter().map(|s| s.to_string()).collect(),
            strength: 0.6,
            formed_round: 1,
        }
    }

    #[test]
    fn strategist_targets_the_biggest_threat() {
        let voter = d("v", Archetype::Strategist, 0.5, 0.5);
        let weak = d("weak", Archetype::Underdog, 0.2, 0.3);
        let strong = d("strong", Archetype::Underdog, 0.9, 0.8);
        let mut rng = SeededRng::new(1, 1);
        let choice = calculate_vote(&voter, &[&weak, &strong], &[], &GameRules::default(), &mut rng).unwrap();
        assert_eq!(choice.target_id, "strong");
        assert!(choice.reasoning.contains("dangerous"));
        assert!(choice.reasoning.contains("STRONG"));
    }

    #[test]
    fn rivalry_outweighs_threat() {
        let mut voter = d("v", Archetype::Strategist, 0.5, 0.5);
        voter.add_rivalry("foe");
        let foe = d("foe", Archetype::Underdog, 0.1, 0.1);
        let strong = d("strong", Archetype::Underdog, 0.9, 0.9);
        let mut rng = SeededRng::new(1, 1);
        let choice = calculate_vote(&voter, &[&strong, &foe], &[], &GameRules::default(), &mut rng).unwrap();
        assert_eq!(choice.target_id, "foe");
        assert!(choice.reasoning.contains("personal"));
    }

    #[test]
    fn loyalist_spares_allies() {
        let voter = d("v", Archetype::Loyalist, 0.5, 0.5);
        let ally = d("ally", Archetype::Loyalist, 0.5, 0.5);
        let outsider = d("out", Archetype::Underdog, 0.5, 0.5);
        let alliances = vec![alliance(0, &["v", "ally"])];
        let mut rng = SeededRng::new(1, 1);
        let choice =
            calculate_vote(&voter, &[&ally, &outsider], &alliances, &GameRules::default(), &mut rng).unwrap();
        assert_eq!(choice.target_id, "out");
        assert!(choice.reasoning.contains("one of us"));
    }

    #[test]
    fn ties_keep_candidate_order_with_generic_reasoning() {
        let voter = d("v", Archetype::Underdog, 0.5, 0.5);
        let a = d("a", Archetype::Underdog, 0.5, 0.5);
        let b = d("b", Archetype::Underdog, 0.5, 0.5);
        let mut rng = SeededRng::new(1, 1);
        let choice = calculate_vote(&voter, &[&a, &b], &[], &GameRules::default(), &mut rng).unwrap();
        assert_eq!(choice.target_id, "a");
        assert!(choice.reasoning.starts_with("Nothing personal"));
    }

    #[test]
    fn wildcard_choice_is_reproducible_under_seed() {
        let voter = d("v", Archetype::Wildcard, 0.5, 0.5);
        let pool: Vec<Dossier> = (0..6).map(|i| d(&format!("c{}", i), Archetype::Underdog, 0.5, 0.5)).collect();
        let refs: Vec<&Dossier> = pool.iter().collect();
        let rules = GameRules::default();
        let first = calculate_vote(&voter, &refs, &[], &rules, &mut SeededRng::new(77, 3)).unwrap();
        let second = calculate_vote(&voter, &refs, &[], &rules, &mut SeededRng::new(77, 3)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_candidate_list_abstains() {
        let voter = d("v", Archetype::Wildcard, 0.5, 0.5);
        let mut rng = SeededRng::new(1, 1);
        assert!(calculate_vote(&voter, &[], &[], &GameRules::default(), &mut rng).is_none());
    }

    #[test]
    fn candidates_exclude_self_immune_eliminated_and_allies() {
        let mut dossiers = BTreeMap::new();
        for id in ["v", "imm", "gone", "ally", "open"] {
            dossiers.insert(id.to_string(), d(id, Archetype::Underdog, 0.5, 0.5));
        }
        dossiers.get_mut("imm").unwrap().ensure_snapshot(2).immune = true;
        dossiers.get_mut("gone").unwrap().eliminate(1);
        let cast: Vec<String> = ["v", "imm", "gone", "ally", "open"].iter().map(|s| s.to_string()).collect();
        let alliances = vec![alliance(0, &["v", "ally"])];

        let ids: Vec<&str> = vote_candidates("v", &dossiers, &cast, &alliances, 2)
            .iter()
            .map(|d| d.character_id.as_str())
            .collect();
        assert_eq!(ids, vec!["open"]);
    }

    #[test]
    fn allies_remain_candidates_when_no_one_else_is_left() {
        let mut dossiers = BTreeMap::new();
        for id in ["v", "ally"] {
            dossiers.insert(id.to_string(), d(id, Archetype::Underdog, 0.5, 0.5));
        }
        let cast: Vec<String> = vec!["v".into(), "ally".into()];
        let alliances = vec![alliance(0, &["v", "ally"])];
        let got = vote_candidates("v", &dossiers, &cast, &alliances, 1);
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn never_selects_excluded_candidate() {
        let mut dossiers = BTreeMap::new();
        let ids = ["a", "b", "c", "d", "e"];
        for id in ids {
            dossiers.insert(id.to_string(), d(id, Archetype::Wildcard, 0.9, 0.9));
        }
        dossiers.get_mut("c").unwrap().ensure_snapshot(1).immune = true;
        let cast: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        let rules = GameRules::default();
        for seed in 0..50 {
            for voter in ["a", "b", "d", "e"] {
                let cands = vote_candidates(voter, &dossiers, &cast, &[], 1);
                let mut rng = SeededRng::new(seed, 1);
                let choice = calculate_vote(&dossiers[voter], &cands, &[], &rules, &mut rng).unwrap();
                assert_ne!(choice.target_id, "c");
                assert_ne!(choice.target_id, voter);
            }
        }
    }

    fn summary(round: u32, winners: &[&str], eliminated: Option<&str>, votes: &[(&str, &str)]) -> RoundSummary {
        RoundSummary {
            round,
            trial_name: "Reef Crossing".to_string(),
            trial_category: TrialCategory::Endurance,
            trial_winners: winners.iter().map(|s| s.to_string()).collect(),
            eliminated: eliminated.map(|s| s.to_string()),
            votes: votes
                .iter()
                .map(|(v, t)| VoteRecord { voter_id: v.to_string(), target_id: t.to_string() })
                .collect(),
            nullified_targets: vec![],
            blocked_voters: vec![],
        }
    }

    #[test]
    fn juror_punishes_the_finalist_who_voted_them_out() {
        let mut juror = d("j", Archetype::Underdog, 0.5, 0.5);
        juror.eliminate(1);
        let betrayer = d("x", Archetype::Underdog, 0.5, 0.5);
        let bystander = d("y", Archetype::Underdog, 0.5, 0.5);
        let rounds = vec![summary(1, &["x"], Some("j"), &[("x", "j"), ("y", "x")])];
        let mut rng = SeededRng::new(5, 9);
        let vote = calculate_jury_vote(&juror, &[&betrayer, &bystander], &rounds, &GameRules::default(), &mut rng);
        // x: -5 + 1 trial win + <1 jitter; y: 0 + <1 jitter
        assert_eq!(vote.as_deref(), Some("y"));
    }

    #[test]
    fn juror_rewards_former_allies() {
        let mut juror = d("j", Archetype::Underdog, 0.5, 0.5);
        juror.ensure_snapshot(1).allies = vec!["friend".to_string()];
        juror.eliminate(2);
        let friend = d("friend", Archetype::Underdog, 0.5, 0.5);
        let other = d("other", Archetype::Underdog, 0.5, 0.5);
        let rounds = vec![summary(1, &["other"], None, &[]), summary(2, &[], Some("j"), &[])];
        let mut rng = SeededRng::new(2, 9);
        let vote = calculate_jury_vote(&juror, &[&other, &friend], &rounds, &GameRules::default(), &mut rng);
        // friend: +3 + jitter; other: +1 + jitter
        assert_eq!(vote.as_deref(), Some("friend"));
    }

    #[test]
    fn season_tallies() {
        let rounds = vec![
            summary(1, &["a"], Some("c"), &[("a", "c"), ("b", "c"), ("c", "a")]),
            summary(2, &["a"], Some("b"), &[("a", "b")]),
        ];
        assert_eq!(trial_wins(&rounds, "a"), 2);
        assert_eq!(votes_received(&rounds, "c"), 2);
        assert_eq!(votes_received(&rounds, "a"), 1);
    }
}
