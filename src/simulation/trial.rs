use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::rules::GameRules;
use crate::season::dossier::{Dossier, Traits};
use crate::simulation::rng::SeededRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialCategory {
    Logic,
    Endurance,
    Persuasion,
    Chaos,
    Creative,
}

impl TrialCategory {
    pub fn all() -> &'static [TrialCategory] {
        &[
            TrialCategory::Logic,
            TrialCategory::Endurance,
            TrialCategory::Persuasion,
            TrialCategory::Chaos,
            TrialCategory::Creative,
        ]
    }

    /// The trait a category is raced on.
    pub fn primary_trait(&self, traits: &Traits) -> f64 {
        match self {
            TrialCategory::Logic => traits.logic,
            TrialCategory::Endurance => traits.endurance,
            TrialCategory::Persuasion => traits.persuasion,
            TrialCategory::Chaos => traits.chaos,
            TrialCategory::Creative => traits.creative,
        }
    }

    fn catalog(&self) -> &'static [&'static str] {
        match self {
            TrialCategory::Logic => &["Tide Table Cipher", "Knotted Ledger", "Lantern Grid"],
            TrialCategory::Endurance => &["Driftwood Hold", "Reef Crossing", "Last One Standing"],
            TrialCategory::Persuasion => &["Market Barter", "Council of Shells", "Sell the Storm"],
            TrialCategory::Chaos => &["Coconut Roulette", "Blindfold Relay", "Wrong Map Race"],
            TrialCategory::Creative => &["Sandcastle Saga", "Totem Carving", "Campfire Fable"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub name: String,
    pub category: TrialCategory,
}

/// Pick a trial, avoiding the two most recently used categories.
pub fn select_trial(recent: &[TrialCategory], rng: &mut SeededRng) -> Trial {
    let excluded: Vec<TrialCategory> = recent.iter().rev().take(2).copied().collect();
    let mut open: Vec<TrialCategory> = TrialCategory::all()
        .iter()
        .copied()
        .filter(|c| !excluded.contains(c))
        .collect();
    if open.is_empty() {
        open = TrialCategory::all().to_vec();
    }
    let category = rng.select(&open).copied().unwrap_or(TrialCategory::Logic);
    let name = rng
        .select(category.catalog())
        .copied()
        .unwrap_or("Open Challenge");
    Trial {
        name: name.to_string(),
        category,
    }
}

// === Race ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub character_id: String,
    pub progress: f64,
    pub active: bool,
}

/// A trial race in progress. Advanced one tick per engine tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRun {
    pub trial: Trial,
    pub tick: u32,
    pub competitors: Vec<Competitor>,
}

impl TrialRun {
    pub fn start(trial: Trial, competitor_ids: &[String]) -> Self {
        TrialRun {
            trial,
            tick: 0,
            competitors: competitor_ids
                .iter()
                .map(|id| Competitor {
                    character_id: id.clone(),
                    progress: 0.0,
                    active: true,
                })
                .collect(),
        }
    }

    pub fn is_complete(&self, rules: &GameRules) -> bool {
        self.tick >= rules.trial_ticks
    }

    pub fn active_count(&self) -> usize {
        self.competitors.iter().filter(|c| c.active).count()
    }

    /// Leader among active competitors; earlier cast position wins ties.
    pub fn leader(&self) -> Option<&Competitor> {
        let mut best: Option<&Competitor> = None;
        for c in self.competitors.iter().filter(|c| c.active) {
            if best.is_none_or(|b| c.progress > b.progress) {
                best = Some(c);
            }
        }
        best
    }
}

/// Run one race tick and return the updated run.
///
/// Draw order per active competitor (cast order): base jitter, then either
/// the catch-up roll (+ burst size on success) when behind the leader, or the
/// stumble roll when leading past the stumble threshold.
pub fn advance_trial(
    run: &TrialRun,
    dossiers: &BTreeMap<String, Dossier>,
    nudges: &BTreeMap<String, f64>,
    rules: &GameRules,
    rng: &mut SeededRng,
) -> TrialRun {
    let mut next = run.clone();
    next.tick += 1;

    let (leader_id, leader_progress) = match run.leader() {
        Some(l) => (l.character_id.clone(), l.progress),
        None => return next,
    };
    let category = run.trial.category;

    for c in next.competitors.iter_mut().filter(|c| c.active) {
        let primary = dossiers
            .get(&c.character_id)
            .map(|d| category.primary_trait(&d.traits))
            .unwrap_or(0.0);
        let nudge = nudges
            .get(&c.character_id)
            .copied()
            .unwrap_or(0.0)
            .clamp(-rules.max_fate_nudge, rules.max_fate_nudge);

        let mut gain = (primary + rng.next() * rules.trial_jitter) * (1.0 + nudge) * rules.trial_scale;

        if c.progress < leader_progress {
            if rng.chance(rules.catch_up_chance) {
                gain *= 1.5 + rng.next() * 0.5;
            }
        } else if c.character_id == leader_id
            && c.progress > rules.stumble_progress
            && rng.chance(rules.stumble_chance)
        {
            gain *= rules.stumble_factor;
        }

        c.progress += gain;
    }

    if next.tick >= rules.dropout_tick {
        drop_stragglers(&mut next, rules);
    }

    next
}

/// Mark competitors too far behind the leader as out, furthest behind
/// first, never leaving fewer than three in the race.
fn drop_stragglers(run: &mut TrialRun, rules: &GameRules) {
    const MIN_ACTIVE: usize = 3;
    let top = run
        .competitors
        .iter()
        .filter(|c| c.active)
        .map(|c| c.progress)
        .fold(f64::MIN, f64::max);
    let mut behind: Vec<usize> = run
        .competitors
        .iter()
        .enumerate()
        .filter(|(_, c)| c.active && top - c.progress > rules.dropout_gap)
        .map(|(i, _)| i)
        .collect();
    // Stable sort keeps cast order among equal progress.
    behind.sort_by(|a, b| run.competitors[*a].progress.total_cmp(&run.competitors[*b].progress));

    let mut active = run.active_count();
    for idx in behind {
        if active <= MIN_ACTIVE {
            break;
        }
        run.competitors[idx].active = false;
        active -= 1;
    }
}

/// Highest progress among still-active competitors.
pub fn trial_winner(run: &TrialRun) -> Option<String> {
    run.leader().map(|c| c.character_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season::dossier::Archetype;

    fn dossier(id: &str, endurance: f64) -> Dossier {
        Dossier::new(
            id,
            id,
            Archetype::Underdog,
            Traits {
                logic: 0.5,
                endurance,
                persuasion: 0.5,
                chaos: 0.5,
                creative: 0.5,
            },
        )
    }

    fn endurance_run(ids: &[&str]) -> TrialRun {
        let trial = Trial {
            name: "Driftwood Hold".to_string(),
            category: TrialCategory::Endurance,
        };
        let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        TrialRun::start(trial, &ids)
    }

    fn run_to_end(
        run: TrialRun,
        dossiers: &BTreeMap<String, Dossier>,
        nudges: &BTreeMap<String, f64>,
        rules: &GameRules,
    ) -> TrialRun {
        let mut run = run;
        while !run.is_complete(rules) {
            let mut rng = SeededRng::new(11, run.tick);
            run = advance_trial(&run, dossiers, nudges, rules, &mut rng);
        }
        run
    }

    #[test]
    fn selection_avoids_last_two_categories() {
        let recent = [
            TrialCategory::Creative,
            TrialCategory::Logic,
            TrialCategory::Chaos,
        ];
        for round in 0..200 {
            let mut rng = SeededRng::new(3, round);
            let trial = select_trial(&recent, &mut rng);
            assert_ne!(trial.category, TrialCategory::Logic);
            assert_ne!(trial.category, TrialCategory::Chaos);
            assert!(trial.category.catalog().contains(&trial.name.as_str()));
        }
    }

    #[test]
    fn selection_unconstrained_without_history() {
        let mut seen = std::collections::HashSet::new();
        for round in 0..200 {
            let mut rng = SeededRng::new(3, round);
            seen.insert(select_trial(&[], &mut rng).category);
        }
        assert_eq!(seen.len(), TrialCategory::all().len());
    }

    #[test]
    fn race_runs_configured_tick_count() {
        let rules = GameRules::default();
        let dossiers: BTreeMap<String, Dossier> = ["a", "b", "c"]
            .iter()
            .map(|id| (id.to_string(), dossier(id, 0.5)))
            .collect();
        let run = run_to_end(endurance_run(&["a", "b", "c"]), &dossiers, &BTreeMap::new(), &rules);
        assert_eq!(run.tick, rules.trial_ticks);
        assert!(trial_winner(&run).is_some());
    }

    #[test]
    fn dominant_trait_wins() {
        let rules = GameRules::default();
        let mut dossiers = BTreeMap::new();
        dossiers.insert("strong".to_string(), dossier("strong", 1.0));
        for id in ["w1", "w2", "w3"] {
            dossiers.insert(id.to_string(), dossier(id, 0.0));
        }
        let run = run_to_end(
            endurance_run(&["w1", "w2", "strong", "w3"]),
            &dossiers,
            &BTreeMap::new(),
            &rules,
        );
        assert_eq!(trial_winner(&run).as_deref(), Some("strong"));
    }

    #[test]
    fn stragglers_drop_out_but_leader_never_does() {
        let rules = GameRules::default();
        let mut dossiers = BTreeMap::new();
        dossiers.insert("fast".to_string(), dossier("fast", 1.0));
        dossiers.insert("mid".to_string(), dossier("mid", 1.0));
        for id in ["slow1", "slow2"] {
            dossiers.insert(id.to_string(), dossier(id, 0.0));
        }
        dossiers.insert("steady".to_string(), dossier("steady", 1.0));
        let mut run = endurance_run(&["fast", "mid", "steady", "slow1", "slow2"]);
        // Put the slow pair far behind before the dropout tick.
        run.tick = rules.dropout_tick - 1;
        run.competitors[0].progress = 80.0;
        run.competitors[1].progress = 78.0;
        run.competitors[2].progress = 79.0;
        let mut rng = SeededRng::new(1, 1);
        let next = advance_trial(&run, &dossiers, &BTreeMap::new(), &rules, &mut rng);
        assert!(next.competitors[0].active);
        assert!(next.competitors[1].active);
        assert!(next.competitors[2].active);
        assert!(!next.competitors[3].active);
        assert!(!next.competitors[4].active);
    }

    #[test]
    fn dropout_stops_with_three_left() {
        let rules = GameRules::default();
        let ids = ["lead", "b", "c", "d", "e"];
        let dossiers: BTreeMap<String, Dossier> =
            ids.iter().map(|id| (id.to_string(), dossier(id, 0.0))).collect();
        let mut run = endurance_run(&ids);
        run.tick = rules.dropout_tick - 1;
        run.competitors[0].progress = 200.0;
        run.competitors[1].progress = 80.0;
        run.competitors[2].progress = 20.0;
        run.competitors[3].progress = 60.0;
        run.competitors[4].progress = 40.0;
        let next = advance_trial(&run, &dossiers, &BTreeMap::new(), &rules, &mut SeededRng::new(1, 1));
        assert_eq!(next.active_count(), 3);
        let out: Vec<&str> = next
            .competitors
            .iter()
            .filter(|c| !c.active)
            .map(|c| c.character_id.as_str())
            .collect();
        assert_eq!(out, vec!["c", "e"]);
    }

    #[test]
    fn no_dropout_with_fewer_than_three_active() {
        let rules = GameRules::default();
        let mut dossiers = BTreeMap::new();
        dossiers.insert("a".to_string(), dossier("a", 1.0));
        dossiers.insert("b".to_string(), dossier("b", 0.0));
        let mut run = endurance_run(&["a", "b"]);
        run.tick = rules.dropout_tick;
        run.competitors[0].progress = 100.0;
        let mut rng = SeededRng::new(1, 1);
        let next = advance_trial(&run, &dossiers, &BTreeMap::new(), &rules, &mut rng);
        assert!(next.competitors.iter().all(|c| c.active));
    }

    #[test]
    fn fate_nudge_is_clamped() {
        let rules = GameRules::default();
        let mut dossiers = BTreeMap::new();
        dossiers.insert("a".to_string(), dossier("a", 0.5));
        let run = endurance_run(&["a"]);

        let mut huge = BTreeMap::new();
        huge.insert("a".to_string(), 50.0);
        let mut capped = BTreeMap::new();
        capped.insert("a".to_string(), rules.max_fate_nudge);

        let x = advance_trial(&run, &dossiers, &huge, &rules, &mut SeededRng::new(4, 1));
        let y = advance_trial(&run, &dossiers, &capped, &rules, &mut SeededRng::new(4, 1));
        assert_eq!(x.competitors[0].progress, y.competitors[0].progress);
    }

    #[test]
    fn race_is_reproducible() {
        let rules = GameRules::default();
        let dossiers: BTreeMap<String, Dossier> = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), dossier(id, 0.2 * i as f64)))
            .collect();
        let a = run_to_end(endurance_run(&["a", "b", "c", "d"]), &dossiers, &BTreeMap::new(), &rules);
        let b = run_to_end(endurance_run(&["a", "b", "c", "d"]), &dossiers, &BTreeMap::new(), &rules);
        assert_eq!(a, b);
    }
}
