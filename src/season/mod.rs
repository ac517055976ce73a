//! The season aggregate: everything one game owns, plus creation and the
//! small bookkeeping helpers the phase engine writes through.

pub mod dossier;
pub mod log;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::roster::CastMember;
use crate::config::rules::GameRules;
use crate::narration::{NarrationKind, estimated_entry_cost};
use crate::season::dossier::Dossier;
use crate::season::log::{Bookmark, BookmarkKind, LogEntry, LogKind, Materialization, RoundSummary, Vote, entry_seed};
use crate::simulation::advantages::AdvantageOutcome;
use crate::simulation::alliances::{Alliance, membership};
use crate::simulation::jury::JuryVote;
use crate::simulation::pace::{PaceState, Speed};
use crate::simulation::phase::Phase;
use crate::simulation::trial::{Trial, TrialCategory, TrialRun};

// === Errors ===

#[derive(Debug, Clone, PartialEq)]
pub enum SeasonError {
    CastSize { expected: usize, got: usize },
    DuplicateCastMember(String),
    HostInCast(String),
    InvalidTraits(String),
    UnknownCharacter(String),
    InvalidRules(String),
    NotActive(String),
    FateNudgeUsed,
    NotRevealing(Phase),
    BetClosed,
    UnknownLogEntry(u64),
}

impl std::fmt::Display for SeasonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeasonError::CastSize { expected, got } => {
                write!(f, "A season needs exactly {} cast members, got {}", expected, got)
            }
            SeasonError::DuplicateCastMember(id) => write!(f, "Cast member '{}' appears twice", id),
            SeasonError::HostInCast(id) => write!(f, "Host '{}' cannot also be in the cast", id),
            SeasonError::InvalidTraits(id) => {
                write!(f, "Traits for '{}' must all be within 0.0-1.0", id)
            }
            SeasonError::UnknownCharacter(id) => write!(f, "'{}' is not in this season's cast", id),
            SeasonError::InvalidRules(e) => write!(f, "Invalid rules: {}", e),
            SeasonError::NotActive(id) => write!(f, "'{}' has already been eliminated", id),
            SeasonError::FateNudgeUsed => write!(f, "The fate nudge has already been used this season"),
            SeasonError::NotRevealing(phase) => {
                write!(f, "No reveal is running (phase is {})", phase.label())
            }
            SeasonError::BetClosed => write!(f, "Final bets are not open right now"),
            SeasonError::UnknownLogEntry(id) => write!(f, "No log entry with id {}", id),
        }
    }
}

impl std::error::Error for SeasonError {}

// === Settings ===

/// Per-season knobs. Loaded from the `[season]` config table and copied into
/// every new season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonSettings {
    #[serde(default)]
    pub speed: Speed,
    /// Suppresses every narration request.
    #[serde(default)]
    pub quiet_hours: bool,
    #[serde(default = "default_token_budget")]
    pub token_budget_per_round: u32,
    #[serde(default = "default_true")]
    pub jury_enabled: bool,
    #[serde(default = "default_true")]
    pub host_narration: bool,
    #[serde(default = "default_true")]
    pub tribunal_debate: bool,
    #[serde(default = "default_true")]
    pub voting_ceremony: bool,
    #[serde(default = "default_true")]
    pub camp_dialogue: bool,
    #[serde(default = "default_true")]
    pub confessionals: bool,
    /// Spoken-line pacing when no audio duration is known.
    #[serde(default = "default_speech_ms_per_char")]
    pub speech_ms_per_char: u64,
    #[serde(default = "default_min_speech_ms")]
    pub min_speech_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_token_budget() -> u32 {
    4000
}
fn default_speech_ms_per_char() -> u64 {
    55
}
fn default_min_speech_ms() -> u64 {
    1200
}

impl Default for SeasonSettings {
    fn default() -> Self {
        SeasonSettings {
            speed: Speed::default(),
            quiet_hours: false,
            token_budget_per_round: default_token_budget(),
            jury_enabled: true,
            host_narration: true,
            tribunal_debate: true,
            voting_ceremony: true,
            camp_dialogue: true,
            confessionals: true,
            speech_ms_per_char: default_speech_ms_per_char(),
            min_speech_ms: default_min_speech_ms(),
        }
    }
}

impl SeasonSettings {
    /// Headless settings: no narration requests at all.
    pub fn silent() -> Self {
        SeasonSettings {
            host_narration: false,
            tribunal_debate: false,
            camp_dialogue: false,
            ..SeasonSettings::default()
        }
    }

    pub fn speech_duration_ms(&self, text: &str) -> u64 {
        (text.chars().count() as u64 * self.speech_ms_per_char).max(self.min_speech_ms)
    }
}

// === Viewer state ===

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bets {
    pub opening: Option<String>,
    pub final_pick: Option<String>,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudienceInfluence {
    /// Trial bias for the current round only.
    pub fate_nudges: BTreeMap<String, f64>,
    pub fate_nudge_used: bool,
}

// === Transient state ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateTurn {
    pub speaker_id: String,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debate {
    pub turns: Vec<DebateTurn>,
    pub index: usize,
}

impl Debate {
    /// The character whose line is being spoken, if the debate is running.
    pub fn current_speaker(&self) -> Option<&str> {
        self.turns.get(self.index).map(|t| t.speaker_id.as_str())
    }

    pub fn current_turn(&self) -> Option<&DebateTurn> {
        self.turns.get(self.index)
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.turns.len()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TribunalState {
    /// Provisional votes; they become the cast votes once the ceremony ends.
    pub votes: Vec<Vote>,
    pub debate: Option<Debate>,
    pub ceremony_index: usize,
    pub reveal_index: usize,
    pub outcome: Option<AdvantageOutcome>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinaleState {
    pub jury_votes: Vec<JuryVote>,
    pub ceremony_index: usize,
    pub reveal_index: usize,
}

/// What the current phase is working on between ticks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Activity {
    #[default]
    Idle,
    Trial(TrialRun),
    Tribunal(TribunalState),
    Finale(FinaleState),
}

/// Suspension around the narrative collaborator. While not `Idle` the engine
/// makes no phase transitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Narration {
    #[default]
    Idle,
    Waiting {
        request_id: u64,
        kind: NarrationKind,
        on_success: Phase,
        on_failure: Phase,
    },
    Speaking {
        request_id: u64,
        content: String,
        on_complete: Phase,
    },
}

/// The round's trial and who won it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub trial: Trial,
    pub winner: Option<String>,
}

// === Season ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: Uuid,
    pub seed: u64,
    pub host_id: String,
    pub cast: Vec<String>,
    pub round: u32,
    pub phase: Phase,
    pub tick: u64,
    pub dossiers: BTreeMap<String, Dossier>,
    pub alliances: Vec<Alliance>,
    pub next_alliance_id: u32,
    pub log: Vec<LogEntry>,
    pub rounds: Vec<RoundSummary>,
    pub bookmarks: Vec<Bookmark>,
    pub bets: Bets,
    pub jury: Vec<String>,
    pub finalists: Vec<String>,
    pub champion: Option<String>,
    pub settings: SeasonSettings,
    pub rules: GameRules,
    pub audience: AudienceInfluence,
    pub paused: bool,
    pub pace: PaceState,
    pub recent_trial_categories: Vec<TrialCategory>,
    pub current_trial: Option<TrialOutcome>,
    pub tokens_spent_this_round: u32,
    pub next_request_id: u64,
    pub next_log_id: u64,
    pub activity: Activity,
    pub narration: Narration,
}

/// Create a season in `Setup`.
///
/// The cast must have exactly `rules.cast_size` unique members with traits
/// in range, the host must not be one of them, and an opening bet must name
/// a cast member.
pub fn start_season(
    cast: &[CastMember],
    seed: u64,
    opening_bet: Option<&str>,
    host_id: &str,
    settings: SeasonSettings,
    rules: GameRules,
) -> Result<Season, SeasonError> {
    rules.validate().map_err(SeasonError::InvalidRules)?;
    if cast.len() != rules.cast_size {
        return Err(SeasonError::CastSize {
            expected: rules.cast_size,
            got: cast.len(),
        });
    }

    let mut dossiers = BTreeMap::new();
    let mut order = Vec::with_capacity(cast.len());
    for member in cast {
        if member.id == host_id {
            return Err(SeasonError::HostInCast(member.id.clone()));
        }
        if !member.traits.is_valid() {
            return Err(SeasonError::InvalidTraits(member.id.clone()));
        }
        let dossier = Dossier::new(&member.id, &member.name, member.archetype, member.traits);
        if dossiers.insert(member.id.clone(), dossier).is_some() {
            return Err(SeasonError::DuplicateCastMember(member.id.clone()));
        }
        order.push(member.id.clone());
    }

    if let Some(bet) = opening_bet
        && !dossiers.contains_key(bet)
    {
        return Err(SeasonError::UnknownCharacter(bet.to_string()));
    }

    Ok(Season {
        id: Uuid::new_v4(),
        seed,
        host_id: host_id.to_string(),
        cast: order,
        round: 1,
        phase: Phase::Setup,
        tick: 0,
        dossiers,
        alliances: Vec::new(),
        next_alliance_id: 1,
        log: Vec::new(),
        rounds: Vec::new(),
        bookmarks: Vec::new(),
        bets: Bets {
            opening: opening_bet.map(str::to_string),
            ..Bets::default()
        },
        jury: Vec::new(),
        finalists: Vec::new(),
        champion: None,
        settings,
        rules,
        audience: AudienceInfluence::default(),
        paused: false,
        pace: PaceState::default(),
        recent_trial_categories: Vec::new(),
        current_trial: None,
        tokens_spent_this_round: 0,
        next_request_id: 1,
        next_log_id: 1,
        activity: Activity::Idle,
        narration: Narration::Idle,
    })
}

impl Season {
    /// Active character ids in cast order.
    pub fn active_ids(&self) -> Vec<String> {
        self.cast
            .iter()
            .filter(|id| self.dossiers.get(*id).is_some_and(|d| d.is_active()))
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.dossiers.values().filter(|d| d.is_active()).count()
    }

    pub fn elimination_count(&self) -> usize {
        self.dossiers.len() - self.active_count()
    }

    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.dossiers.get(id).map(|d| d.name.as_str()).unwrap_or(id)
    }

    pub fn is_waiting(&self) -> bool {
        !matches!(self.narration, Narration::Idle)
    }

    pub fn alloc_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Append a log entry stamped with the current round and tick.
    /// Materializable kinds start with an empty detail and a cost estimate.
    pub fn push_log(&mut self, kind: LogKind, participants: Vec<String>, summary: String) -> u64 {
        let id = self.next_log_id;
        self.next_log_id += 1;
        let materialization = kind.is_materializable().then(|| Materialization {
            detail: None,
            estimated_cost: estimated_entry_cost(kind),
        });
        self.log.push(LogEntry {
            id,
            kind,
            round: self.round,
            timestamp: self.tick,
            participants,
            summary,
            seed: entry_seed(self.seed, id),
            materialization,
            question: None,
        });
        id
    }

    pub fn push_bookmark(&mut self, kind: BookmarkKind, summary: String, log_entry_id: u64) -> u64 {
        let id = self.bookmarks.len() as u64 + 1;
        self.bookmarks.push(Bookmark {
            id,
            round: self.round,
            kind,
            summary,
            log_entry_id,
        });
        id
    }

    pub fn log_entry(&self, id: u64) -> Option<&LogEntry> {
        self.log.iter().find(|e| e.id == id)
    }

    /// Make sure every active character has a snapshot for the current round.
    pub fn ensure_round_snapshots(&mut self) {
        let round = self.round;
        for d in self.dossiers.values_mut().filter(|d| d.is_active()) {
            d.ensure_snapshot(round);
        }
    }

    /// Copy alliance membership into the current round's snapshots.
    pub fn refresh_membership(&mut self) {
        let round = self.round;
        for d in self.dossiers.values_mut().filter(|d| d.is_active()) {
            let (ids, allies) = membership(&self.alliances, &d.character_id);
            let snap = d.ensure_snapshot(round);
            snap.alliance_ids = ids;
            snap.allies = allies;
        }
    }

    pub fn tribunal(&self) -> Option<&TribunalState> {
        match &self.activity {
            Activity::Tribunal(t) => Some(t),
            _ => None,
        }
    }

    pub fn tribunal_mut(&mut self) -> Option<&mut TribunalState> {
        match &mut self.activity {
            Activity::Tribunal(t) => Some(t),
            _ => None,
        }
    }

    /// The character whose debate line is on air, if any.
    pub fn speaking_debate_character(&self) -> Option<&str> {
        if !matches!(self.narration, Narration::Speaking { .. }) {
            return None;
        }
        self.tribunal()
            .and_then(|t| t.debate.as_ref())
            .and_then(|d| d.current_speaker())
    }

    /// Structural checks used when a season comes from outside the engine.
    pub fn check_integrity(&self) -> Result<(), String> {
        let mut errors = Vec::new();
        if self.cast.len() != self.rules.cast_size {
            errors.push(format!(
                "cast has {} members, rules require {}",
                self.cast.len(),
                self.rules.cast_size
            ));
        }
        if self.cast.iter().any(|id| id == &self.host_id) {
            errors.push(format!("host '{}' is in the cast", self.host_id));
        }
        for (i, id) in self.cast.iter().enumerate() {
            if self.cast[..i].contains(id) {
                errors.push(format!("cast member '{}' appears twice", id));
            }
            match self.dossiers.get(id) {
                Some(d) if !d.traits.is_valid() => {
                    errors.push(format!("traits for '{}' out of range", id))
                }
                Some(_) => {}
                None => errors.push(format!("no dossier for cast member '{}'", id)),
            }
        }
        if self.dossiers.len() != self.cast.len() {
            errors.push("dossiers do not match the cast".to_string());
        }
        if self.round == 0 {
            errors.push("round must start at 1".to_string());
        }
        if self.champion.is_some() != (self.phase == Phase::Finished) {
            errors.push("champion must be set exactly when the season is finished".to_string());
        }
        for id in self.jury.iter().chain(self.finalists.iter()) {
            if !self.dossiers.contains_key(id) {
                errors.push(format!("unknown character '{}' in jury or finalists", id));
            }
        }
        if let Err(e) = self.rules.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::roster::Roster;

    fn season() -> Season {
        let roster = Roster::sample(42);
        start_season(
            &roster.cast,
            42,
            Some("mara"),
            "host",
            SeasonSettings::default(),
            GameRules::default(),
        )
        .unwrap()
    }

    #[test]
    fn new_season_starts_in_setup() {
        let s = season();
        assert_eq!(s.phase, Phase::Setup);
        assert_eq!(s.round, 1);
        assert_eq!(s.cast.len(), 12);
        assert_eq!(s.active_count(), 12);
        assert_eq!(s.bets.opening.as_deref(), Some("mara"));
        assert!(s.champion.is_none());
        assert!(s.check_integrity().is_ok());
    }

    #[test]
    fn cast_must_have_twelve() {
        let roster = Roster::sample(1);
        let err = start_season(
            &roster.cast[..11],
            1,
            None,
            "host",
            SeasonSettings::default(),
            GameRules::default(),
        )
        .unwrap_err();
        assert_eq!(err, SeasonError::CastSize { expected: 12, got: 11 });
    }

    #[test]
    fn host_cannot_play() {
        let roster = Roster::sample(1);
        let err = start_season(
            &roster.cast,
            1,
            None,
            "mara",
            SeasonSettings::default(),
            GameRules::default(),
        )
        .unwrap_err();
        assert_eq!(err, SeasonError::HostInCast("mara".to_string()));
    }

    #[test]
    fn duplicates_and_bad_traits_rejected() {
        let mut roster = Roster::sample(1);
        roster.cast[3] = roster.cast[2].clone();
        let err = start_season(&roster.cast, 1, None, "host", SeasonSettings::default(), GameRules::default())
            .unwrap_err();
        assert!(matches!(err, SeasonError::DuplicateCastMember(_)));

        let mut roster = Roster::sample(1);
        roster.cast[0].traits.logic = -0.1;
        let err = start_season(&roster.cast, 1, None, "host", SeasonSettings::default(), GameRules::default())
            .unwrap_err();
        assert_eq!(err, SeasonError::InvalidTraits("mara".to_string()));
    }

    #[test]
    fn opening_bet_must_name_cast_member() {
        let roster = Roster::sample(1);
        let err = start_season(
            &roster.cast,
            1,
            Some("ghost"),
            "host",
            SeasonSettings::default(),
            GameRules::default(),
        )
        .unwrap_err();
        assert_eq!(err, SeasonError::UnknownCharacter("ghost".to_string()));
    }

    #[test]
    fn log_entries_get_sequential_ids_and_costs() {
        let mut s = season();
        let a = s.push_log(LogKind::RoundStart, vec![], "Round 1".into());
        let b = s.push_log(LogKind::Confessional, vec!["mara".into()], "Mara reflects".into());
        assert_eq!((a, b), (1, 2));
        assert!(s.log[0].materialization.is_none());
        let m = s.log[1].materialization.as_ref().unwrap();
        assert!(m.detail.is_none());
        assert!(m.estimated_cost > 0);
        assert_ne!(s.log[0].seed, s.log[1].seed);
    }

    #[test]
    fn speech_duration_has_floor() {
        let settings = SeasonSettings::default();
        assert_eq!(settings.speech_duration_ms("hi"), 1200);
        assert_eq!(settings.speech_duration_ms(&"x".repeat(100)), 5500);
    }

    #[test]
    fn debate_tracks_current_speaker() {
        let mut debate = Debate {
            turns: vec![
                DebateTurn { speaker_id: "a".into(), line: "I trust nobody.".into() },
                DebateTurn { speaker_id: "b".into(), line: "Then trust this vote.".into() },
            ],
            index: 0,
        };
        assert_eq!(debate.current_speaker(), Some("a"));
        debate.index = 1;
        assert_eq!(debate.current_speaker(), Some("b"));
        debate.index = 2;
        assert!(debate.is_finished());
        assert_eq!(debate.current_speaker(), None);
    }
}
