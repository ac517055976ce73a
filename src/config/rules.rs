use serde::{Deserialize, Serialize};

/// Tunable constants of the elimination game.
///
/// Stored with every season so a replay under the same seed uses the exact
/// thresholds it was started with. Every field has a serde default, so a
/// `[rules]` table in the config only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRules {
    // --- alliances & trust ---
    #[serde(default = "default_alliance_threshold")]
    pub alliance_threshold: f64,
    #[serde(default = "default_alliance_strength")]
    pub alliance_strength: f64,
    #[serde(default = "default_alliance_trust_boost")]
    pub alliance_trust_boost: f64,
    #[serde(default = "default_voter_trust_penalty")]
    pub voter_trust_penalty: f64,
    #[serde(default = "default_target_trust_penalty")]
    pub target_trust_penalty: f64,
    #[serde(default = "default_betrayal_trust_penalty")]
    pub betrayal_trust_penalty: f64,

    // --- vote calculus ---
    #[serde(default = "default_ally_bonus")]
    pub ally_bonus: f64,
    #[serde(default = "default_loyalist_outsider_penalty")]
    pub loyalist_outsider_penalty: f64,
    #[serde(default = "default_strategic_threat_penalty")]
    pub strategic_threat_penalty: f64,
    #[serde(default = "default_strategic_threat_floor")]
    pub strategic_threat_floor: f64,
    #[serde(default = "default_rivalry_penalty")]
    pub rivalry_penalty: f64,
    #[serde(default = "default_wildcard_jitter")]
    pub wildcard_jitter: f64,

    // --- jury vote ---
    #[serde(default = "default_jury_voted_out_penalty")]
    pub jury_voted_out_penalty: f64,
    #[serde(default = "default_jury_ally_bonus")]
    pub jury_ally_bonus: f64,

    // --- trials ---
    #[serde(default = "default_trial_ticks")]
    pub trial_ticks: u32,
    #[serde(default = "default_trial_scale")]
    pub trial_scale: f64,
    #[serde(default = "default_trial_jitter")]
    pub trial_jitter: f64,
    #[serde(default = "default_catch_up_chance")]
    pub catch_up_chance: f64,
    #[serde(default = "default_stumble_chance")]
    pub stumble_chance: f64,
    #[serde(default = "default_stumble_progress")]
    pub stumble_progress: f64,
    #[serde(default = "default_stumble_factor")]
    pub stumble_factor: f64,
    #[serde(default = "default_dropout_tick")]
    pub dropout_tick: u32,
    #[serde(default = "default_dropout_gap")]
    pub dropout_gap: f64,
    #[serde(default = "default_max_fate_nudge")]
    pub max_fate_nudge: f64,

    // --- advantages ---
    #[serde(default = "default_advantage_discovery_chance")]
    pub advantage_discovery_chance: f64,
    #[serde(default = "default_idol_vote_share")]
    pub idol_vote_share: f64,
    #[serde(default = "default_idol_whim_chance")]
    pub idol_whim_chance: f64,
    #[serde(default = "default_close_vote_margin")]
    pub close_vote_margin: u32,
    #[serde(default = "default_strategist_trigger_chance")]
    pub strategist_trigger_chance: f64,

    // --- season shape ---
    #[serde(default = "default_cast_size")]
    pub cast_size: usize,
    #[serde(default = "default_jury_size")]
    pub jury_size: usize,
    #[serde(default = "default_finalist_count")]
    pub finalist_count: usize,
    #[serde(default = "default_finalists_without_jury")]
    pub finalists_without_jury: usize,
    #[serde(default = "default_opening_bet_payout")]
    pub opening_bet_payout: i32,
    #[serde(default = "default_final_bet_payout")]
    pub final_bet_payout: i32,
    #[serde(default = "default_max_debate_line_chars")]
    pub max_debate_line_chars: usize,
}

fn default_alliance_threshold() -> f64 {
    0.5
}
fn default_alliance_strength() -> f64 {
    0.6
}
fn default_alliance_trust_boost() -> f64 {
    0.05
}
fn default_voter_trust_penalty() -> f64 {
    0.1
}
fn default_target_trust_penalty() -> f64 {
    0.3
}
fn default_betrayal_trust_penalty() -> f64 {
    0.6
}
fn default_ally_bonus() -> f64 {
    10.0
}
fn default_loyalist_outsider_penalty() -> f64 {
    2.0
}
fn default_strategic_threat_penalty() -> f64 {
    3.0
}
fn default_strategic_threat_floor() -> f64 {
    0.7
}
fn default_rivalry_penalty() -> f64 {
    4.0
}
fn default_wildcard_jitter() -> f64 {
    5.0
}
fn default_jury_voted_out_penalty() -> f64 {
    5.0
}
fn default_jury_ally_bonus() -> f64 {
    3.0
}
fn default_trial_ticks() -> u32 {
    8
}
fn default_trial_scale() -> f64 {
    10.0
}
fn default_trial_jitter() -> f64 {
    0.5
}
fn default_catch_up_chance() -> f64 {
    0.35
}
fn default_stumble_chance() -> f64 {
    0.2
}
fn default_stumble_progress() -> f64 {
    40.0
}
fn default_stumble_factor() -> f64 {
    0.3
}
fn default_dropout_tick() -> u32 {
    4
}
fn default_dropout_gap() -> f64 {
    30.0
}
fn default_max_fate_nudge() -> f64 {
    0.5
}
fn default_advantage_discovery_chance() -> f64 {
    0.08
}
fn default_idol_vote_share() -> f64 {
    0.3
}
fn default_idol_whim_chance() -> f64 {
    0.1
}
fn default_close_vote_margin() -> u32 {
    1
}
fn default_strategist_trigger_chance() -> f64 {
    0.5
}
fn default_cast_size() -> usize {
    12
}
fn default_jury_size() -> usize {
    7
}
fn default_finalist_count() -> usize {
    3
}
fn default_finalists_without_jury() -> usize {
    2
}
fn default_opening_bet_payout() -> i32 {
    3
}
fn default_final_bet_payout() -> i32 {
    5
}
fn default_max_debate_line_chars() -> usize {
    160
}

impl Default for GameRules {
    fn default() -> Self {
        GameRules {
            alliance_threshold: default_alliance_threshold(),
            alliance_strength: default_alliance_strength(),
            alliance_trust_boost: default_alliance_trust_boost(),
            voter_trust_penalty: default_voter_trust_penalty(),
            target_trust_penalty: default_target_trust_penalty(),
            betrayal_trust_penalty: default_betrayal_trust_penalty(),
            ally_bonus: default_ally_bonus(),
            loyalist_outsider_penalty: default_loyalist_outsider_penalty(),
            strategic_threat_penalty: default_strategic_threat_penalty(),
            strategic_threat_floor: default_strategic_threat_floor(),
            rivalry_penalty: default_rivalry_penalty(),
            wildcard_jitter: default_wildcard_jitter(),
            jury_voted_out_penalty: default_jury_voted_out_penalty(),
            jury_ally_bonus: default_jury_ally_bonus(),
            trial_ticks: default_trial_ticks(),
            trial_scale: default_trial_scale(),
            trial_jitter: default_trial_jitter(),
            catch_up_chance: default_catch_up_chance(),
            stumble_chance: default_stumble_chance(),
            stumble_progress: default_stumble_progress(),
            stumble_factor: default_stumble_factor(),
            dropout_tick: default_dropout_tick(),
            dropout_gap: default_dropout_gap(),
            max_fate_nudge: default_max_fate_nudge(),
            advantage_discovery_chance: default_advantage_discovery_chance(),
            idol_vote_share: default_idol_vote_share(),
            idol_whim_chance: default_idol_whim_chance(),
            close_vote_margin: default_close_vote_margin(),
            strategist_trigger_chance: default_strategist_trigger_chance(),
            cast_size: default_cast_size(),
            jury_size: default_jury_size(),
            finalist_count: default_finalist_count(),
            finalists_without_jury: default_finalists_without_jury(),
            opening_bet_payout: default_opening_bet_payout(),
            final_bet_payout: default_final_bet_payout(),
            max_debate_line_chars: default_max_debate_line_chars(),
        }
    }
}

impl GameRules {
    /// Validate parameter ranges. All problems are reported together.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        let probabilities = [
            ("alliance_threshold", self.alliance_threshold),
            ("catch_up_chance", self.catch_up_chance),
            ("stumble_chance", self.stumble_chance),
            ("advantage_discovery_chance", self.advantage_discovery_chance),
            ("idol_vote_share", self.idol_vote_share),
            ("idol_whim_chance", self.idol_whim_chance),
            ("strategist_trigger_chance", self.strategist_trigger_chance),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("rules.{} must be 0.0-1.0, got {}", name, value));
            }
        }

        if self.trial_ticks == 0 {
            errors.push("rules.trial_ticks must be > 0, got 0. Example: trial_ticks = 8".to_string());
        }
        if self.trial_scale <= 0.0 {
            errors.push(format!(
                "rules.trial_scale must be > 0.0, got {}",
                self.trial_scale
            ));
        }
        if self.max_fate_nudge < 0.0 {
            errors.push(format!(
                "rules.max_fate_nudge must be >= 0.0, got {}",
                self.max_fate_nudge
            ));
        }
        if self.cast_size < 2 {
            errors.push(format!(
                "rules.cast_size must be >= 2, got {}",
                self.cast_size
            ));
        }
        if self.finalist_count < 2 || self.finalist_count >= self.cast_size {
            errors.push(format!(
                "rules.finalist_count must be 2..cast_size, got {}",
                self.finalist_count
            ));
        }
        if self.finalists_without_jury == 0 || self.finalists_without_jury >= self.cast_size {
            errors.push(format!(
                "rules.finalists_without_jury must be 1..cast_size, got {}",
                self.finalists_without_jury
            ));
        }
        if self.jury_size + self.finalist_count > self.cast_size {
            errors.push(format!(
                "rules.jury_size + finalist_count must not exceed cast_size ({}), got {} + {}",
                self.cast_size, self.jury_size, self.finalist_count
            ));
        }
        if self.max_debate_line_chars == 0 {
            errors.push("rules.max_debate_line_chars must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }

    /// How many eliminations happen before eliminated players start joining the jury.
    pub fn pre_jury_eliminations(&self) -> usize {
        self.cast_size
            .saturating_sub(self.finalist_count)
            .saturating_sub(self.jury_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let rules = GameRules::default();
        assert_eq!(rules.idol_vote_share, 0.3);
        assert_eq!(rules.close_vote_margin, 1);
        assert_eq!(rules.alliance_strength, 0.6);
        assert_eq!(rules.alliance_trust_boost, 0.05);
        assert_eq!(rules.trial_ticks, 8);
        assert_eq!(rules.opening_bet_payout, 3);
        assert_eq!(rules.final_bet_payout, 5);
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn partial_table_keeps_other_defaults() {
        let rules: GameRules = toml::from_str("idol_vote_share = 0.5\ntrial_ticks = 10").unwrap();
        assert_eq!(rules.idol_vote_share, 0.5);
        assert_eq!(rules.trial_ticks, 10);
        assert_eq!(rules.close_vote_margin, 1);
    }

    #[test]
    fn out_of_range_values_reported_together() {
        let rules = GameRules {
            idol_vote_share: 1.5,
            trial_ticks: 0,
            ..GameRules::default()
        };
        let err = rules.validate().unwrap_err();
        assert!(err.contains("idol_vote_share"));
        assert!(err.contains("trial_ticks"));
    }

    #[test]
    fn jury_cannot_outgrow_cast() {
        let rules = GameRules {
            jury_size: 10,
            ..GameRules::default()
        };
        assert!(rules.validate().unwrap_err().contains("jury_size"));
    }

    #[test]
    fn default_season_shape_seats_seven_jurors() {
        let rules = GameRules::default();
        assert_eq!(rules.pre_jury_eliminations(), 2);
    }
}
