use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// === Enums ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Archetype {
    Strategist,
    SocialButterfly,
    Wildcard,
    Loyalist,
    Underdog,
}

impl Archetype {
    pub fn all() -> &'static [Archetype] {
        &[
            Archetype::Strategist,
            Archetype::SocialButterfly,
            Archetype::Wildcard,
            Archetype::Loyalist,
            Archetype::Underdog,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Archetype::Strategist => "strategist",
            Archetype::SocialButterfly => "social butterfly",
            Archetype::Wildcard => "wildcard",
            Archetype::Loyalist => "loyalist",
            Archetype::Underdog => "underdog",
        }
    }
}

/// A consumable hidden power. Duplicates of the same kind may be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Advantage {
    ImmunityIdol,
    ExtraVote,
    BlockVote,
}

impl Advantage {
    pub fn all() -> &'static [Advantage] {
        &[
            Advantage::ImmunityIdol,
            Advantage::ExtraVote,
            Advantage::BlockVote,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Advantage::ImmunityIdol => "immunity idol",
            Advantage::ExtraVote => "extra vote",
            Advantage::BlockVote => "block vote",
        }
    }
}

// === Traits ===

/// Base trait vector, each component in [0, 1]. Fixed once a season starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Traits {
    pub logic: f64,
    pub endurance: f64,
    pub persuasion: f64,
    pub chaos: f64,
    pub creative: f64,
}

impl Traits {
    /// Combined logic + persuasion, used for elimination tie-breaks.
    pub fn threat(&self) -> f64 {
        self.logic + self.persuasion
    }

    /// Mean of logic and persuasion, compared against the strategist's threat floor.
    pub fn strategic_threat(&self) -> f64 {
        (self.logic + self.persuasion) / 2.0
    }

    pub fn is_valid(&self) -> bool {
        [
            self.logic,
            self.endurance,
            self.persuasion,
            self.chaos,
            self.creative,
        ]
        .iter()
        .all(|v| (0.0..=1.0).contains(v))
    }
}

// === Round snapshot ===

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Trust toward every other character. Unclamped; drifts roughly in [-2, 2].
    pub trust: BTreeMap<String, f64>,
    pub alliance_ids: Vec<u32>,
    /// Everyone sharing at least one alliance with this character this round.
    pub allies: Vec<String>,
    pub immune: bool,
    pub suspicion: f64,
    pub note: Option<String>,
}

// === Dossier ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dossier {
    pub character_id: String,
    pub name: String,
    pub archetype: Archetype,
    pub traits: Traits,
    pub rivalries: Vec<String>,
    pub advantages: Vec<Advantage>,
    pub snapshots: BTreeMap<u32, RoundSnapshot>,
    pub eliminated_round: Option<u32>,
}

impl Dossier {
    pub fn new(character_id: &str, name: &str, archetype: Archetype, traits: Traits) -> Self {
        Dossier {
            character_id: character_id.to_string(),
            name: name.to_string(),
            archetype,
            traits,
            rivalries: Vec::new(),
            advantages: Vec::new(),
            snapshots: BTreeMap::new(),
            eliminated_round: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.eliminated_round.is_none()
    }

    pub fn is_rival(&self, other: &str) -> bool {
        self.rivalries.iter().any(|r| r == other)
    }

    /// Record a rivalry once; returns false if it was already known.
    pub fn add_rivalry(&mut self, other: &str) -> bool {
        if self.is_rival(other) || other == self.character_id {
            return false;
        }
        self.rivalries.push(other.to_string());
        true
    }

    /// Mark the character eliminated. The first recorded round wins.
    pub fn eliminate(&mut self, round: u32) {
        if self.eliminated_round.is_none() {
            self.eliminated_round = Some(round);
        }
    }

    /// Remove one copy of an advantage; returns whether one was held.
    pub fn consume(&mut self, advantage: Advantage) -> bool {
        match self.advantages.iter().position(|a| *a == advantage) {
            Some(idx) => {
                self.advantages.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Most recent snapshot at or before `round`.
    pub fn latest_snapshot(&self, round: u32) -> Option<&RoundSnapshot> {
        self.snapshots.range(..=round).next_back().map(|(_, s)| s)
    }

    /// Snapshot for `round`, creating it by rolling the previous round forward.
    pub fn ensure_snapshot(&mut self, round: u32) -> &mut RoundSnapshot {
        if !self.snapshots.contains_key(&round) {
            let rolled = match self.snapshots.range(..round).next_back() {
                Some((_, prev)) => RoundSnapshot {
                    trust: prev.trust.clone(),
                    alliance_ids: prev.alliance_ids.clone(),
                    allies: prev.allies.clone(),
                    immune: false,
                    suspicion: prev.suspicion,
                    note: None,
                },
                None => RoundSnapshot::default(),
            };
            self.snapshots.insert(round, rolled);
        }
        self.snapshots.entry(round).or_default()
    }

    pub fn trust_toward(&self, round: u32, other: &str) -> f64 {
        self.latest_snapshot(round)
            .and_then(|s| s.trust.get(other).copied())
            .unwrap_or(0.0)
    }

    pub fn is_immune(&self, round: u32) -> bool {
        self.snapshots.get(&round).is_some_and(|s| s.immune)
    }

    /// Whether this character shared an alliance with `other` in any round.
    pub fn was_ever_allied_with(&self, other: &str) -> bool {
        self.snapshots
            .values()
            .any(|s| s.allies.iter().any(|a| a == other))
    }

    pub fn allies_in_round(&self, round: u32) -> &[String] {
        self.snapshots
            .get(&round)
            .map(|s| s.allies.as_slice())
            .unwrap_or(&[])
    }
}
