use serde::{Deserialize, Serialize};

use crate::season::dossier::Archetype;
use crate::season::log::{Bookmark, LogEntry};
use crate::season::{Activity, Season, SeasonError};
use crate::simulation::alliances::Alliance;
use crate::simulation::pace::Speed;
use crate::simulation::phase::Phase;
use crate::simulation::{self, SideEffect, TickResult};

/// How many recent log entries a snapshot carries.
const SNAPSHOT_LOG_TAIL: usize = 50;

/// Complete season state sent to a client on connect.
#[derive(Debug, Clone, Serialize)]
pub struct SeasonSnapshot {
    pub message_type: &'static str,
    pub season_id: String,
    pub round: u32,
    pub phase: &'static str,
    pub tick: u64,
    pub paused: bool,
    pub speed: &'static str,
    pub cast: Vec<CastStatus>,
    pub alliances: Vec<Alliance>,
    pub bookmarks: Vec<Bookmark>,
    pub recent_log: Vec<LogLine>,
    pub jury: Vec<String>,
    pub finalists: Vec<String>,
    pub champion: Option<String>,
    pub bet_points: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CastStatus {
    pub id: String,
    pub name: String,
    pub archetype: Archetype,
    pub eliminated_round: Option<u32>,
    pub immune: bool,
    pub advantages_held: usize,
}

/// A log entry as shown to spectators. Detail text appears once materialized.
#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub id: u64,
    pub kind: String,
    pub round: u32,
    pub participants: Vec<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Something the presentation layer should play.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cue {
    Speak {
        speaker_id: Option<String>,
        text: String,
        duration_ms: u64,
    },
    Reveal {
        kind: &'static str,
        count: usize,
    },
}

/// Sent after every tick that changed something.
#[derive(Debug, Clone, Serialize)]
pub struct SeasonEvent {
    pub message_type: &'static str,
    pub tick: u64,
    pub round: u32,
    pub phase: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_phase: Option<&'static str>,
    pub entries: Vec<LogLine>,
    pub cues: Vec<Cue>,
}

/// Health endpoint response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub season_id: String,
    pub round: u32,
    pub phase: &'static str,
    pub tick: u64,
    pub paused: bool,
    pub speed: &'static str,
    pub snapshot_age_ticks: u64,
}

/// Host and audience commands accepted over the websocket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    Pause,
    Resume,
    Speed { speed: String },
    SkipToBookmark,
    Bookmark { log_entry_id: u64, note: String },
    RevealComplete,
    FateNudge { character_id: String, amount: f64 },
    FinalBet { character_id: String },
    Confessional { character_id: String, question: String },
    /// Expand a log entry's detail text. Needs a narrator, so the driver
    /// handles it; `apply` leaves the season alone.
    Materialize { log_entry_id: u64 },
}

impl ControlMessage {
    /// Apply to a season. Takes effect on the next tick.
    pub fn apply(&self, season: &mut Season) -> Result<(), String> {
        if let ControlMessage::Speed { speed } = self {
            let speed = Speed::parse(speed).ok_or_else(|| format!("Unknown speed '{}'", speed))?;
            simulation::set_speed(season, speed);
            return Ok(());
        }
        self.apply_engine(season).map_err(|e| e.to_string())
    }

    fn apply_engine(&self, season: &mut Season) -> Result<(), SeasonError> {
        match self {
            ControlMessage::Pause => simulation::set_paused(season, true),
            ControlMessage::Resume => simulation::set_paused(season, false),
            ControlMessage::Speed { .. } => {}
            ControlMessage::SkipToBookmark => simulation::skip_to_next_bookmark(season),
            ControlMessage::Bookmark { log_entry_id, note } => {
                simulation::add_user_bookmark(season, *log_entry_id, note)?;
            }
            ControlMessage::RevealComplete => {
                while simulation::advance_reveal(season)? < reveal_total(season) {}
                simulation::reveal_complete(season)?;
            }
            ControlMessage::FateNudge {
                character_id,
                amount,
            } => {
                simulation::apply_fate_nudge(season, character_id, *amount)?;
            }
            ControlMessage::FinalBet { character_id } => {
                simulation::place_final_bet(season, character_id)?;
            }
            ControlMessage::Confessional {
                character_id,
                question,
            } => {
                simulation::ask_confessional(season, character_id, question)?;
            }
            ControlMessage::Materialize { .. } => {}
        }
        Ok(())
    }
}

fn reveal_total(season: &Season) -> usize {
    match &season.activity {
        Activity::Tribunal(t) => t.votes.len(),
        Activity::Finale(f) => f.jury_votes.len(),
        Activity::Idle | Activity::Trial(_) => 0,
    }
}

impl LogLine {
    pub fn from_entry(entry: &LogEntry) -> Self {
        LogLine {
            id: entry.id,
            kind: format!("{:?}", entry.kind),
            round: entry.round,
            participants: entry.participants.clone(),
            summary: entry.summary.clone(),
            detail: entry.materialization.as_ref().and_then(|m| m.detail.clone()),
        }
    }
}

impl Cue {
    pub fn from_effect(effect: &SideEffect) -> Option<Self> {
        match effect {
            SideEffect::Narrate(_) => None,
            SideEffect::Speak {
                speaker_id,
                text,
                duration_ms,
                ..
            } => Some(Cue::Speak {
                speaker_id: speaker_id.clone(),
                text: text.clone(),
                duration_ms: *duration_ms,
            }),
            SideEffect::AwaitReveal { kind, count } => Some(Cue::Reveal {
                kind: match kind {
                    simulation::RevealKind::Votes => "votes",
                    simulation::RevealKind::JuryVotes => "jury_votes",
                },
                count: *count,
            }),
        }
    }
}

impl SeasonSnapshot {
    pub fn from_season(season: &Season) -> Self {
        let cast = season
            .cast
            .iter()
            .filter_map(|id| season.dossiers.get(id))
            .map(|d| CastStatus {
                id: d.character_id.clone(),
                name: d.name.clone(),
                archetype: d.archetype,
                eliminated_round: d.eliminated_round,
                immune: d.is_immune(season.round),
                advantages_held: d.advantages.len(),
            })
            .collect();
        let tail = season.log.len().saturating_sub(SNAPSHOT_LOG_TAIL);
        SeasonSnapshot {
            message_type: "SeasonSnapshot",
            season_id: season.id.to_string(),
            round: season.round,
            phase: season.phase.label(),
            tick: season.tick,
            paused: season.paused,
            speed: season.settings.speed.label(),
            cast,
            alliances: season.alliances.clone(),
            bookmarks: season.bookmarks.clone(),
            recent_log: season.log[tail..].iter().map(LogLine::from_entry).collect(),
            jury: season.jury.clone(),
            finalists: season.finalists.clone(),
            champion: season.champion.clone(),
            bet_points: season.bets.points,
        }
    }
}

impl SeasonEvent {
    /// Event for a tick, or `None` when nothing visible happened.
    pub fn from_tick(season: &Season, result: &TickResult, effects: &[SideEffect]) -> Option<Self> {
        let start = season.log.len().saturating_sub(result.new_log_entries);
        Self::build(season, result.phase_before, &season.log[start..], effects)
    }

    /// Event for log entries and effects produced outside a tick, e.g. by a
    /// narration delivery.
    pub fn from_entries(
        season: &Season,
        phase_before: Phase,
        entries: &[LogEntry],
        effects: &[SideEffect],
    ) -> Option<Self> {
        Self::build(season, phase_before, entries, effects)
    }

    fn build(
        season: &Season,
        phase_before: Phase,
        entries: &[LogEntry],
        effects: &[SideEffect],
    ) -> Option<Self> {
        let cues: Vec<Cue> = effects.iter().filter_map(Cue::from_effect).collect();
        let changed = phase_before != season.phase;
        if entries.is_empty() && cues.is_empty() && !changed {
            return None;
        }
        Some(SeasonEvent {
            message_type: "SeasonEvent",
            tick: season.tick,
            round: season.round,
            phase: season.phase.label(),
            previous_phase: changed.then(|| phase_before.label()),
            entries: entries.iter().map(LogLine::from_entry).collect(),
            cues,
        })
    }
}
