use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::rules::GameRules;
use crate::season::dossier::Dossier;
use crate::season::log::VoteRecord;
use crate::simulation::rng::SeededRng;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alliance {
    pub id: u32,
    /// Members in cast order, at least two, no duplicates.
    pub members: Vec<String>,
    pub strength: f64,
    pub formed_round: u32,
}

impl Alliance {
    pub fn contains(&self, character_id: &str) -> bool {
        self.members.iter().any(|m| m == character_id)
    }
}

/// A directed trust adjustment: `from` now trusts `to` by `delta` more.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustChange {
    pub from: String,
    pub to: String,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllianceUpdate {
    /// Existing alliances followed by the ones formed in this pass.
    pub alliances: Vec<Alliance>,
    pub formed: Vec<Alliance>,
    pub trust_boosts: Vec<TrustChange>,
}

pub fn share_alliance(alliances: &[Alliance], a: &str, b: &str) -> bool {
    alliances.iter().any(|al| al.contains(a) && al.contains(b))
}

/// Alliance ids and co-members for one character.
pub fn membership(alliances: &[Alliance], character_id: &str) -> (Vec<u32>, Vec<String>) {
    let mut ids = Vec::new();
    let mut allies: Vec<String> = Vec::new();
    for al in alliances.iter().filter(|al| al.contains(character_id)) {
        ids.push(al.id);
        for m in &al.members {
            if m != character_id && !allies.contains(m) {
                allies.push(m.clone());
            }
        }
    }
    (ids, allies)
}

/// Form new alliances among unaffiliated active characters and compute the
/// round's alliance trust boosts.
///
/// Pairs are visited in cast order. Each eligible pair (same archetype, not
/// rivals, both still unclaimed) consumes exactly one draw; a draw above the
/// threshold forms the alliance and claims both members for this pass.
pub fn update_alliances(
    dossiers: &BTreeMap<String, Dossier>,
    cast: &[String],
    existing: &[Alliance],
    round: u32,
    next_id: u32,
    rules: &GameRules,
    rng: &mut SeededRng,
) -> AllianceUpdate {
    let mut pool: Vec<&Dossier> = cast
        .iter()
        .filter_map(|id| dossiers.get(id))
        .filter(|d| d.is_active())
        .filter(|d| !existing.iter().any(|al| al.contains(&d.character_id)))
        .collect();

    let mut formed = Vec::new();
    let mut id = next_id;
    let mut i = 0;
    while i < pool.len() {
        let mut claimed = None;
        for j in (i + 1)..pool.len() {
            let (a, b) = (pool[i], pool[j]);
            if a.archetype != b.archetype
                || a.is_rival(&b.character_id)
                || b.is_rival(&a.character_id)
            {
                continue;
            }
            if rng.next() > rules.alliance_threshold {
                formed.push(Alliance {
                    id,
                    members: vec![a.character_id.clone(), b.character_id.clone()],
                    strength: rules.alliance_strength,
                    formed_round: round,
                });
                id += 1;
                claimed = Some(j);
                break;
            }
        }
        match claimed {
            Some(j) => {
                pool.remove(j);
                pool.remove(i);
            }
            None => i += 1,
        }
    }

    let mut alliances = existing.to_vec();
    alliances.extend(formed.iter().cloned());

    let mut trust_boosts = Vec::new();
    for al in &alliances {
        for from in &al.members {
            for to in &al.members {
                if from != to {
                    trust_boosts.push(TrustChange {
                        from: from.clone(),
                        to: to.clone(),
                        delta: rules.alliance_trust_boost,
                    });
                }
            }
        }
    }

    AllianceUpdate {
        alliances,
        formed,
        trust_boosts,
    }
}

/// Trust consequences of a round of votes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VoteFallout {
    pub changes: Vec<TrustChange>,
    /// (voter, target) pairs where the voter turned on an ally.
    pub betrayals: Vec<(String, String)>,
}

/// Voter→target loses the voter penalty, target→voter the target penalty.
/// A vote against an ally also costs target→voter the betrayal penalty and
/// is reported so both sides record a rivalry.
pub fn vote_fallout(votes: &[VoteRecord], alliances: &[Alliance], rules: &GameRules) -> VoteFallout {
    let mut fallout = VoteFallout::default();
    for v in votes {
        if v.voter_id == v.target_id {
            continue;
        }
        fallout.changes.push(TrustChange {
            from: v.voter_id.clone(),
            to: v.target_id.clone(),
            delta: -rules.voter_trust_penalty,
        });
        fallout.changes.push(TrustChange {
            from: v.target_id.clone(),
            to: v.voter_id.clone(),
            delta: -rules.target_trust_penalty,
        });
        if share_alliance(alliances, &v.voter_id, &v.target_id) {
            fallout.changes.push(TrustChange {
                from: v.target_id.clone(),
                to: v.voter_id.clone(),
                delta: -rules.betrayal_trust_penalty,
            });
            let pair = (v.voter_id.clone(), v.target_id.clone());
            if !fallout.betrayals.contains(&pair) {
                fallout.betrayals.push(pair);
            }
        }
    }
    fallout
}

/// Apply trust changes to the given round's snapshots.
pub fn apply_trust_changes(
    dossiers: &mut BTreeMap<String, Dossier>,
    round: u32,
    changes: &[TrustChange],
) {
    for change in changes {
        if let Some(d) = dossiers.get_mut(&change.from) {
            *d.ensure_snapshot(round)
                .trust
                .entry(change.to.clone())
                .or_insert(0.0) += change.delta;
        }
    }
}

/// Set each active character's suspicion for `round` to their share of the
/// votes cast, including votes later cancelled.
pub fn record_suspicion(dossiers: &mut BTreeMap<String, Dossier>, round: u32, votes: &[VoteRecord]) {
    let total = votes.len();
    for (id, d) in dossiers.iter_mut().filter(|(_, d)| d.is_active()) {
        let against = votes.iter().filter(|v| &v.target_id == id).count();
        d.ensure_snapshot(round).suspicion = if total == 0 {
            0.0
        } else {
            against as f64 / total as f64
        };
    }
}

/// Drop eliminated members; alliances left with fewer than two dissolve.
pub fn prune_alliances(alliances: &[Alliance], dossiers: &BTreeMap<String, Dossier>) -> Vec<Alliance> {
    alliances
        .iter()
        .filter_map(|al| {
            let members: Vec<String> = al
                .members
                .iter()
                .filter(|m| dossiers.get(*m).is_some_and(|d| d.is_active()))
                .cloned()
                .collect();
            (members.len() >= 2).then(|| Alliance {
                members,
                ..al.clone()
            })
        })
        .collect()
}
