pub mod advantages;
pub mod alliances;
pub mod jury;
pub mod pace;
pub mod phase;
pub mod rng;
pub mod statistics;
pub mod trial;
pub mod voting;

use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::narration::{
    BudgetGuard, NarrationError, NarrationKind, NarrationRequest, NarrationResponse,
    TemplateNarrator, parse_debate_text, sanitize_debate,
};
use crate::season::log::{BookmarkKind, LogKind};
use crate::season::{Activity, Debate, Narration, Season, SeasonError};
use crate::simulation::pace::Speed;
use crate::simulation::phase::{Phase, participants, transition};

/// Which reveal the companion component should play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealKind {
    Votes,
    JuryVotes,
}

/// Work the host must do on the engine's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Generate text, then call `deliver_narration` with the request id.
    Narrate(NarrationRequest),
    /// Play a line, then call `speech_complete` with the request id.
    Speak {
        request_id: u64,
        speaker_id: Option<String>,
        text: String,
        duration_ms: u64,
    },
    /// Step `advance_reveal` through `count` items, then `reveal_complete`.
    AwaitReveal { kind: RevealKind, count: usize },
}

/// Result of executing a single tick.
#[derive(Debug)]
pub struct TickResult {
    /// False when the tick was a no-op (paused, suspended, awaiting a reveal
    /// or finished).
    pub advanced: bool,
    pub phase_before: Phase,
    pub phase_after: Phase,
    pub effects: Vec<SideEffect>,
    /// Number of log entries appended by this tick.
    pub new_log_entries: usize,
}

/// Advance the season by one step.
///
/// Does nothing while paused, while a narration request or spoken line is
/// outstanding, while a reveal is running, or once the season is finished.
/// After every tick the pace controller gets a chance to end a bookmark skip.
pub fn tick(season: &mut Season) -> TickResult {
    let phase_before = season.phase;
    let log_before = season.log.len();
    let mut effects = Vec::new();

    let blocked = season.paused
        || season.is_waiting()
        || season.phase.awaits_reveal()
        || season.phase == Phase::Finished;
    if !blocked {
        season.tick += 1;
        phase::step(season, &mut effects);
    }

    if let Some(speed) = season.pace.settle(season.bookmarks.len()) {
        info!(speed = speed.label(), "Bookmark reached, restoring speed");
        season.settings.speed = speed;
    }

    TickResult {
        advanced: !blocked,
        phase_before,
        phase_after: season.phase,
        effects,
        new_log_entries: season.log.len() - log_before,
    }
}

// === Narration completions ===

/// Hand a collaborator result back to the engine.
///
/// Results for anything but the outstanding request are ignored. Success
/// stages the text as speaking content; failure goes straight to the
/// fallback successor.
pub fn deliver_narration(
    season: &mut Season,
    request_id: u64,
    result: Result<NarrationResponse, NarrationError>,
) -> Vec<SideEffect> {
    let (kind, on_success, on_failure) = match &season.narration {
        Narration::Waiting {
            request_id: pending,
            kind,
            on_success,
            on_failure,
        } if *pending == request_id => (*kind, *on_success, *on_failure),
        _ => {
            debug!(request_id, "Ignoring stale narration result");
            return Vec::new();
        }
    };
    season.narration = Narration::Idle;

    let response = match result {
        Ok(r) => r,
        Err(e) => {
            warn!(kind = kind.label(), error = %e, "Narration failed, using fallback");
            transition(season, on_failure);
            return Vec::new();
        }
    };
    season.tokens_spent_this_round += kind.estimated_tokens();

    if kind == NarrationKind::TribunalDebate {
        let lines = match response {
            NarrationResponse::Lines(lines) => lines,
            NarrationResponse::Text(text) => parse_debate_text(&text),
        };
        let active = season.active_ids();
        let turns = sanitize_debate(
            &lines,
            &participants(season, &active),
            season.rules.max_debate_line_chars,
        );
        match season.tribunal_mut() {
            Some(t) if !turns.is_empty() => t.debate = Some(Debate { turns, index: 0 }),
            _ => {
                warn!("Debate had no usable lines, skipping");
                transition(season, on_failure);
                return Vec::new();
            }
        }
        return stage_debate_turn(season, on_success);
    }

    let text = match response {
        NarrationResponse::Text(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => {
            warn!(kind = kind.label(), "Malformed narration, using fallback");
            transition(season, on_failure);
            return Vec::new();
        }
    };
    season.push_log(kind.log_kind(), Vec::new(), text.clone());
    let duration_ms = season.settings.speech_duration_ms(&text);
    season.narration = Narration::Speaking {
        request_id,
        content: text.clone(),
        on_complete: on_success,
    };
    vec![SideEffect::Speak {
        request_id,
        speaker_id: None,
        text,
        duration_ms,
    }]
}

fn stage_debate_turn(season: &mut Season, on_complete: Phase) -> Vec<SideEffect> {
    let Some(turn) = season
        .tribunal()
        .and_then(|t| t.debate.as_ref())
        .and_then(|d| d.current_turn())
        .cloned()
    else {
        transition(season, on_complete);
        return Vec::new();
    };
    let request_id = season.alloc_request_id();
    let summary = format!("{}: {}", season.display_name(&turn.speaker_id), turn.line);
    season.push_log(LogKind::TribunalDebate, vec![turn.speaker_id.clone()], summary);
    let duration_ms = season.settings.speech_duration_ms(&turn.line);
    season.narration = Narration::Speaking {
        request_id,
        content: turn.line.clone(),
        on_complete,
    };
    vec![SideEffect::Speak {
        request_id,
        speaker_id: Some(turn.speaker_id),
        text: turn.line,
        duration_ms,
    }]
}

/// The presentation layer finished playing a line.
pub fn speech_complete(season: &mut Season, request_id: u64) -> Vec<SideEffect> {
    let on_complete = match &season.narration {
        Narration::Speaking {
            request_id: pending,
            on_complete,
            ..
        } if *pending == request_id => *on_complete,
        _ => {
            debug!(request_id, "Ignoring stale speech completion");
            return Vec::new();
        }
    };
    season.narration = Narration::Idle;

    if season.phase == Phase::Tribunal
        && let Some(debate) = season.tribunal_mut().and_then(|t| t.debate.as_mut())
        && !debate.is_finished()
    {
        debate.index += 1;
        if !debate.is_finished() {
            return stage_debate_turn(season, on_complete);
        }
    }
    transition(season, on_complete);
    Vec::new()
}

/// The host gave up waiting. An outstanding request counts as a failure; a
/// line on air counts as finished.
pub fn narration_timeout(season: &mut Season, request_id: u64) -> Vec<SideEffect> {
    match &season.narration {
        Narration::Waiting { request_id: pending, .. } if *pending == request_id => {
            deliver_narration(season, request_id, Err(NarrationError::Timeout))
        }
        Narration::Speaking { request_id: pending, .. } if *pending == request_id => {
            speech_complete(season, request_id)
        }
        _ => Vec::new(),
    }
}

/// Drop a suspension nobody will complete, e.g. after restoring a snapshot
/// taken mid-request. Goes to the fallback successor.
pub fn abandon_suspension(season: &mut Season) {
    match std::mem::take(&mut season.narration) {
        Narration::Idle => {}
        Narration::Waiting { on_failure, .. } => transition(season, on_failure),
        Narration::Speaking { on_complete, .. } => transition(season, on_complete),
    }
}

// === Reveals ===

/// Step the reveal index of the running reveal. Returns the new index.
pub fn advance_reveal(season: &mut Season) -> Result<usize, SeasonError> {
    let phase = season.phase;
    match (phase, &mut season.activity) {
        (Phase::Vote, Activity::Tribunal(t)) => {
            t.reveal_index = (t.reveal_index + 1).min(t.votes.len());
            Ok(t.reveal_index)
        }
        (Phase::JuryVoteReveal, Activity::Finale(f)) => {
            f.reveal_index = (f.reveal_index + 1).min(f.jury_votes.len());
            Ok(f.reveal_index)
        }
        _ => Err(SeasonError::NotRevealing(phase)),
    }
}

/// The companion reveal finished; resume the engine.
pub fn reveal_complete(season: &mut Season) -> Result<(), SeasonError> {
    match season.phase {
        Phase::Vote => transition(season, Phase::AdvantagePlay),
        Phase::JuryVoteReveal => transition(season, Phase::Finale),
        other => return Err(SeasonError::NotRevealing(other)),
    }
    Ok(())
}

// === Host and viewer controls ===

pub fn set_paused(season: &mut Season, paused: bool) {
    if season.paused != paused {
        info!(paused, "Pause toggled");
    }
    season.paused = paused;
}

/// An explicit speed choice ends any bookmark skip.
pub fn set_speed(season: &mut Season, speed: Speed) {
    season.pace.cancel();
    season.settings.speed = speed;
}

/// Run at full speed until the next bookmark appears.
pub fn skip_to_next_bookmark(season: &mut Season) {
    let count = season.bookmarks.len();
    season.settings.speed = season.pace.begin_skip(season.settings.speed, count);
}

pub fn add_user_bookmark(
    season: &mut Season,
    log_entry_id: u64,
    note: &str,
) -> Result<u64, SeasonError> {
    if season.log_entry(log_entry_id).is_none() {
        return Err(SeasonError::UnknownLogEntry(log_entry_id));
    }
    Ok(season.push_bookmark(BookmarkKind::User, note.to_string(), log_entry_id))
}

/// Bias one character's trial progress for the current round. Usable once
/// per season; the amount is clamped to the configured maximum.
pub fn apply_fate_nudge(
    season: &mut Season,
    character_id: &str,
    amount: f64,
) -> Result<f64, SeasonError> {
    if season.audience.fate_nudge_used {
        return Err(SeasonError::FateNudgeUsed);
    }
    let dossier = season
        .dossiers
        .get(character_id)
        .ok_or_else(|| SeasonError::UnknownCharacter(character_id.to_string()))?;
    if !dossier.is_active() {
        return Err(SeasonError::NotActive(character_id.to_string()));
    }
    let max = season.rules.max_fate_nudge;
    let clamped = amount.clamp(-max, max);
    season.audience.fate_nudges.insert(character_id.to_string(), clamped);
    season.audience.fate_nudge_used = true;
    Ok(clamped)
}

/// Pick the champion among the finalists. Open once finalists are known and
/// until the jury votes start being revealed. A season without a jury keeps
/// the window open through the finale since nothing is revealed there.
pub fn place_final_bet(season: &mut Season, character_id: &str) -> Result<(), SeasonError> {
    let reveal_started = matches!(&season.activity, Activity::Finale(f) if f.reveal_index > 0);
    if season.finalists.is_empty()
        || season.champion.is_some()
        || reveal_started
        || season.phase == Phase::JuryVoteReveal
        || (season.phase == Phase::Finale && season.settings.jury_enabled)
    {
        return Err(SeasonError::BetClosed);
    }
    if !season.finalists.iter().any(|f| f == character_id) {
        return Err(SeasonError::UnknownCharacter(character_id.to_string()));
    }
    season.bets.final_pick = Some(character_id.to_string());
    Ok(())
}

/// Queue a viewer question as a confessional entry. Returns its log id.
pub fn ask_confessional(
    season: &mut Season,
    character_id: &str,
    question: &str,
) -> Result<u64, SeasonError> {
    let dossier = season
        .dossiers
        .get(character_id)
        .ok_or_else(|| SeasonError::UnknownCharacter(character_id.to_string()))?;
    if !dossier.is_active() {
        return Err(SeasonError::NotActive(character_id.to_string()));
    }
    let summary = format!("{} answers a viewer question.", dossier.name);
    let id = season.push_log(LogKind::Confessional, vec![character_id.to_string()], summary);
    if let Some(entry) = season.log.last_mut() {
        entry.question = Some(question.to_string());
    }
    Ok(id)
}

// === Lazy materialization ===

#[derive(Debug, Clone, PartialEq)]
pub enum MaterializeError {
    UnknownEntry(u64),
    NotMaterializable(u64),
    BudgetExceeded { needed: u32, remaining: u32 },
}

impl std::fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaterializeError::UnknownEntry(id) => write!(f, "No log entry with id {}", id),
            MaterializeError::NotMaterializable(id) => {
                write!(f, "Log entry {} has no detail to expand", id)
            }
            MaterializeError::BudgetExceeded { needed, remaining } => write!(
                f,
                "Not enough narration budget this round: needs {}, {} left",
                needed, remaining
            ),
        }
    }
}

impl std::error::Error for MaterializeError {}

/// Check an entry can be expanded now and return its cost.
fn materialization_cost(season: &Season, entry_id: u64) -> Result<u32, MaterializeError> {
    let entry = season
        .log_entry(entry_id)
        .ok_or(MaterializeError::UnknownEntry(entry_id))?;
    let cost = match &entry.materialization {
        Some(m) if m.detail.is_none() => m.estimated_cost,
        _ => return Err(MaterializeError::NotMaterializable(entry_id)),
    };
    let guard = BudgetGuard::for_season(season);
    if guard.admit(cost).is_err() {
        return Err(MaterializeError::BudgetExceeded {
            needed: cost,
            remaining: guard.remaining(),
        });
    }
    Ok(cost)
}

/// Build the narration request that expands a log entry's detail text.
/// Nothing is charged until `apply_materialization`.
pub fn materialize_entry(
    season: &mut Season,
    entry_id: u64,
) -> Result<NarrationRequest, MaterializeError> {
    let cost = materialization_cost(season, entry_id)?;
    let entry = season
        .log_entry(entry_id)
        .cloned()
        .ok_or(MaterializeError::UnknownEntry(entry_id))?;
    let kind = NarrationKind::for_entry(entry.kind).ok_or(MaterializeError::NotMaterializable(entry_id))?;
    let mut params = std::collections::BTreeMap::new();
    params.insert("summary".to_string(), entry.summary.clone());
    if let Some(q) = &entry.question {
        params.insert("question".to_string(), q.clone());
    }
    let request_id = season.alloc_request_id();
    Ok(NarrationRequest {
        season_id: season.id,
        request_id,
        kind,
        round: entry.round,
        seed: entry.seed,
        participants: participants(season, &entry.participants),
        params,
        estimated_tokens: cost,
        max_line_chars: season.rules.max_debate_line_chars,
    })
}

/// Store generated detail text on an entry and charge the round budget.
/// The text also becomes the first participant's note for that round.
pub fn apply_materialization(
    season: &mut Season,
    entry_id: u64,
    text: &str,
) -> Result<(), MaterializeError> {
    let cost = materialization_cost(season, entry_id)?;
    let (round, owner) = {
        let entry = season
            .log
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or(MaterializeError::UnknownEntry(entry_id))?;
        if let Some(m) = entry.materialization.as_mut() {
            m.detail = Some(text.to_string());
        }
        (entry.round, entry.participants.first().cloned())
    };
    season.tokens_spent_this_round += cost;
    if let Some(d) = owner.and_then(|id| season.dossiers.get_mut(&id)) {
        d.ensure_snapshot(round).note = Some(text.to_string());
    }
    Ok(())
}

// === Headless driving ===

/// Perform side effects synchronously: narration from the template narrator
/// (or refused when `None`), speech finished at once, reveals run instantly.
pub fn fulfil_offline(
    season: &mut Season,
    effects: Vec<SideEffect>,
    narrator: Option<&TemplateNarrator>,
) {
    let mut queue: VecDeque<SideEffect> = effects.into();
    while let Some(effect) = queue.pop_front() {
        let more = match effect {
            SideEffect::Narrate(request) => {
                let result = match narrator {
                    Some(n) => Ok(n.respond(&request)),
                    None => Err(NarrationError::Refused("offline".to_string())),
                };
                deliver_narration(season, request.request_id, result)
            }
            SideEffect::Speak { request_id, .. } => speech_complete(season, request_id),
            SideEffect::AwaitReveal { count, .. } => {
                for _ in 0..count {
                    if advance_reveal(season).is_err() {
                        break;
                    }
                }
                if let Err(e) = reveal_complete(season) {
                    warn!(error = %e, "Reveal completion rejected");
                }
                Vec::new()
            }
        };
        queue.extend(more);
    }
}

/// Tick until the season finishes or `max_ticks` engine steps have run.
/// Returns the number of ticks taken.
pub fn simulate(season: &mut Season, narrator: Option<&TemplateNarrator>, max_ticks: u64) -> u64 {
    let was_paused = season.paused;
    season.paused = false;
    let mut ticks = 0;
    while season.phase != Phase::Finished && ticks < max_ticks {
        let result = tick(season);
        fulfil_offline(season, result.effects, narrator);
        ticks += 1;
    }
    season.paused = was_paused;
    ticks
}
