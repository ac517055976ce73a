use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::narration::{BudgetGuard, NarrationKind, NarrationRequest, Participant};
use crate::season::dossier::{Archetype, Dossier};
use crate::season::log::{BookmarkKind, LogKind, RoundSummary, Vote, VoteRecord, entry_seed};
use crate::season::{Activity, FinaleState, Narration, Season, TribunalState, TrialOutcome};
use crate::simulation::advantages::{
    AdvantageContext, consume_played, counted_tally, discover_advantages, is_close_vote,
    resolve_advantages,
};
use crate::simulation::alliances::{
    apply_trust_changes, prune_alliances, record_suspicion, update_alliances, vote_fallout,
};
use crate::simulation::jury::{JuryVote, bet_payout, resolve_champion};
use crate::simulation::rng::{SeededRng, Stream};
use crate::simulation::trial::{TrialCategory, TrialRun, advance_trial, select_trial, trial_winner};
use crate::simulation::voting::{calculate_jury_vote, calculate_vote, vote_candidates};
use crate::simulation::{RevealKind, SideEffect};

/// Every state of a season. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Setup,
    HostRoundIntro,
    Trial,
    HostTrialIntro,
    TrialInProgress,
    TrialEnd,
    Camp,
    Tribunal,
    VotingCeremony,
    Vote,
    AdvantagePlay,
    Elimination,
    HostEliminationSendoff,
    EliminationReveal,
    HostFinaleOpen,
    FinaleOpeningStatements,
    JuryQuestions,
    FinaleClosingStatements,
    JuryVoting,
    JuryVoteReveal,
    Finale,
    Finished,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::HostRoundIntro => "host_round_intro",
            Phase::Trial => "trial",
            Phase::HostTrialIntro => "host_trial_intro",
            Phase::TrialInProgress => "trial_in_progress",
            Phase::TrialEnd => "trial_end",
            Phase::Camp => "camp",
            Phase::Tribunal => "tribunal",
            Phase::VotingCeremony => "voting_ceremony",
            Phase::Vote => "vote",
            Phase::AdvantagePlay => "advantage_play",
            Phase::Elimination => "elimination",
            Phase::HostEliminationSendoff => "host_elimination_sendoff",
            Phase::EliminationReveal => "elimination_reveal",
            Phase::HostFinaleOpen => "host_finale_open",
            Phase::FinaleOpeningStatements => "finale_opening_statements",
            Phase::JuryQuestions => "jury_questions",
            Phase::FinaleClosingStatements => "finale_closing_statements",
            Phase::JuryVoting => "jury_voting",
            Phase::JuryVoteReveal => "jury_vote_reveal",
            Phase::Finale => "finale",
            Phase::Finished => "finished",
        }
    }

    /// Phases the engine sits in until an external reveal completes.
    pub fn awaits_reveal(&self) -> bool {
        matches!(self, Phase::Vote | Phase::JuryVoteReveal)
    }

    /// Phases that only exist when a jury decides the season.
    pub fn is_jury_phase(&self) -> bool {
        matches!(
            self,
            Phase::HostFinaleOpen
                | Phase::FinaleOpeningStatements
                | Phase::JuryQuestions
                | Phase::FinaleClosingStatements
                | Phase::JuryVoting
                | Phase::JuryVoteReveal
        )
    }
}

pub(crate) fn transition(season: &mut Season, to: Phase) {
    if season.phase != to {
        info!(
            round = season.round,
            tick = season.tick,
            from = season.phase.label(),
            to = to.label(),
            "Phase change"
        );
    }
    season.phase = to;
}

fn rng(season: &Season, stream: Stream, step: u64) -> SeededRng {
    SeededRng::for_stream(season.seed, season.round, stream, step)
}

pub(crate) fn participants(season: &Season, ids: &[String]) -> Vec<Participant> {
    ids.iter()
        .map(|id| Participant {
            id: id.clone(),
            name: season.display_name(id).to_string(),
        })
        .collect()
}

fn names(season: &Season, ids: &[String]) -> String {
    ids.iter()
        .map(|id| season.display_name(id))
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Ask the narrative collaborator for text and suspend, or go straight to
/// the fallback when narration is switched off or over budget.
fn narrate(
    season: &mut Season,
    kind: NarrationKind,
    ids: &[String],
    params: BTreeMap<String, String>,
    on_success: Phase,
    on_failure: Phase,
    fx: &mut Vec<SideEffect>,
) {
    let settings = &season.settings;
    let enabled = !settings.quiet_hours
        && match kind {
            NarrationKind::TribunalDebate => settings.tribunal_debate,
            NarrationKind::CampDialogue => settings.camp_dialogue,
            k if k.is_host_line() => settings.host_narration,
            _ => true,
        };
    if !enabled {
        transition(season, on_failure);
        return;
    }

    let cost = kind.estimated_tokens();
    if let Err(e) = BudgetGuard::for_season(season).admit(cost) {
        warn!(kind = kind.label(), error = %e, "Narration skipped");
        transition(season, on_failure);
        return;
    }

    let request_id = season.alloc_request_id();
    let request = NarrationRequest {
        season_id: season.id,
        request_id,
        kind,
        round: season.round,
        seed: entry_seed(season.seed, request_id),
        participants: participants(season, ids),
        params,
        estimated_tokens: cost,
        max_line_chars: season.rules.max_debate_line_chars,
    };
    season.narration = Narration::Waiting {
        request_id,
        kind,
        on_success,
        on_failure,
    };
    fx.push(SideEffect::Narrate(request));
}

/// Run the handler for the current phase.
pub(crate) fn step(season: &mut Season, fx: &mut Vec<SideEffect>) {
    match season.phase {
        Phase::Setup => setup(season),
        Phase::HostRoundIntro => {
            let active = season.active_ids();
            season.push_log(
                LogKind::RoundStart,
                active.clone(),
                format!("Round {} begins with {} castaways.", season.round, active.len()),
            );
            let params = BTreeMap::from([("remaining".to_string(), active.len().to_string())]);
            narrate(season, NarrationKind::RoundIntro, &active, params, Phase::Trial, Phase::Trial, fx);
        }
        Phase::Trial => start_trial(season),
        Phase::HostTrialIntro => {
            let mut params = BTreeMap::new();
            if let Some(t) = &season.current_trial {
                params.insert("trial".to_string(), t.trial.name.clone());
                params.insert("category".to_string(), format!("{:?}", t.trial.category));
            }
            narrate(
                season,
                NarrationKind::TrialIntro,
                &[],
                params,
                Phase::TrialInProgress,
                Phase::TrialInProgress,
                fx,
            );
        }
        Phase::TrialInProgress => run_trial_tick(season),
        Phase::TrialEnd => finish_trial(season),
        Phase::Camp => camp(season, fx),
        Phase::Tribunal => tribunal(season, fx),
        Phase::VotingCeremony => voting_ceremony(season, fx),
        // Driven by the reveal entry points.
        Phase::Vote | Phase::JuryVoteReveal => {}
        Phase::AdvantagePlay => advantage_play(season),
        Phase::Elimination => eliminate(season),
        Phase::HostEliminationSendoff => {
            let eliminated: Vec<String> = season
                .rounds
                .last()
                .and_then(|r| r.eliminated.clone())
                .into_iter()
                .collect();
            let mut params = BTreeMap::new();
            if let Some(id) = eliminated.first() {
                params.insert("eliminated".to_string(), season.display_name(id).to_string());
            }
            narrate(
                season,
                NarrationKind::EliminationSendoff,
                &eliminated,
                params,
                Phase::EliminationReveal,
                Phase::EliminationReveal,
                fx,
            );
        }
        Phase::EliminationReveal => elimination_reveal(season),
        Phase::HostFinaleOpen => {
            let finalists = season.finalists.clone();
            let params = BTreeMap::from([("jurors".to_string(), season.jury.len().to_string())]);
            narrate(
                season,
                NarrationKind::FinaleOpen,
                &finalists,
                params,
                Phase::FinaleOpeningStatements,
                Phase::FinaleOpeningStatements,
                fx,
            );
        }
        Phase::FinaleOpeningStatements => {
            let finalists = season.finalists.clone();
            narrate(
                season,
                NarrationKind::OpeningStatements,
                &finalists,
                BTreeMap::new(),
                Phase::JuryQuestions,
                Phase::JuryQuestions,
                fx,
            );
        }
        Phase::JuryQuestions => {
            let mut ids = season.finalists.clone();
            ids.extend(season.jury.iter().cloned());
            narrate(
                season,
                NarrationKind::JuryQuestions,
                &ids,
                BTreeMap::new(),
                Phase::FinaleClosingStatements,
                Phase::FinaleClosingStatements,
                fx,
            );
        }
        Phase::FinaleClosingStatements => {
            let finalists = season.finalists.clone();
            narrate(
                season,
                NarrationKind::ClosingStatements,
                &finalists,
                BTreeMap::new(),
                Phase::JuryVoting,
                Phase::JuryVoting,
                fx,
            );
        }
        Phase::JuryVoting => jury_voting(season, fx),
        Phase::Finale => crown_champion(season, fx),
        Phase::Finished => {}
    }
}

fn setup(season: &mut Season) {
    season.ensure_round_snapshots();
    let cast = season.cast.clone();
    season.push_log(
        LogKind::SeasonStart,
        cast.clone(),
        format!("{} castaways arrive on the island.", cast.len()),
    );
    transition(season, Phase::HostRoundIntro);
}

fn start_trial(season: &mut Season) {
    let trial = select_trial(&season.recent_trial_categories, &mut rng(season, Stream::Trial, 0));
    season.recent_trial_categories.push(trial.category);
    if season.recent_trial_categories.len() > TrialCategory::all().len() {
        season.recent_trial_categories.remove(0);
    }

    let active = season.active_ids();
    season.push_log(
        LogKind::TrialAnnounced,
        active.clone(),
        format!("Trial: {} ({:?}).", trial.name, trial.category),
    );
    season.current_trial = Some(TrialOutcome {
        trial: trial.clone(),
        winner: None,
    });
    season.activity = Activity::Trial(TrialRun::start(trial, &active));
    transition(season, Phase::HostTrialIntro);
}

fn run_trial_tick(season: &mut Season) {
    let Activity::Trial(run) = &season.activity else {
        warn!(round = season.round, "Trial phase without a race, ending trial");
        transition(season, Phase::TrialEnd);
        return;
    };
    let mut rng = rng(season, Stream::Trial, run.tick as u64 + 1);
    let next = advance_trial(
        run,
        &season.dossiers,
        &season.audience.fate_nudges,
        &season.rules,
        &mut rng,
    );
    debug!(round = season.round, race_tick = next.tick, active = next.active_count(), "Trial tick");
    let done = next.is_complete(&season.rules);
    season.activity = Activity::Trial(next);
    if done {
        transition(season, Phase::TrialEnd);
    }
}

fn finish_trial(season: &mut Season) {
    let winner = match &season.activity {
        Activity::Trial(run) => trial_winner(run),
        _ => None,
    };
    let round = season.round;
    if let Some(id) = &winner {
        if let Some(d) = season.dossiers.get_mut(id) {
            d.ensure_snapshot(round).immune = true;
        }
        let summary = format!("{} wins the trial and immunity.", season.display_name(id));
        season.push_log(LogKind::TrialResult, vec![id.clone()], summary);
    }
    if let Some(t) = season.current_trial.as_mut() {
        t.winner = winner;
    }
    season.activity = Activity::Idle;
    transition(season, Phase::Camp);
}

fn camp(season: &mut Season, fx: &mut Vec<SideEffect>) {
    let round = season.round;
    let cast = season.cast.clone();

    let update = update_alliances(
        &season.dossiers,
        &cast,
        &season.alliances,
        round,
        season.next_alliance_id,
        &season.rules,
        &mut rng(season, Stream::Alliances, 0),
    );
    season.next_alliance_id += update.formed.len() as u32;
    season.alliances = update.alliances;
    apply_trust_changes(&mut season.dossiers, round, &update.trust_boosts);
    season.refresh_membership();
    for alliance in &update.formed {
        let summary = format!("{} form an alliance.", names(season, &alliance.members));
        season.push_log(LogKind::AllianceFormed, alliance.members.clone(), summary);
    }

    let found = discover_advantages(
        &season.dossiers,
        &cast,
        &season.rules,
        &mut rng(season, Stream::Discovery, 0),
    );
    for (holder, advantage) in found {
        debug!(round, holder = %holder, advantage = advantage.label(), "Advantage found");
        if let Some(d) = season.dossiers.get_mut(&holder) {
            d.advantages.push(advantage);
        }
        let summary = format!("{} found something buried near camp.", season.display_name(&holder));
        season.push_log(LogKind::AdvantageFound, vec![holder], summary);
    }

    let active = season.active_ids();
    let mut camp_rng = rng(season, Stream::Camp, 0);
    if season.settings.confessionals {
        if let Some(who) = camp_rng.select(&active).cloned() {
            let summary = format!("{} sits down for a confessional.", season.display_name(&who));
            season.push_log(LogKind::Confessional, vec![who], summary);
        }
        let schemers: Vec<String> = active
            .iter()
            .filter(|id| {
                season.dossiers.get(*id).is_some_and(|d| {
                    !d.rivalries.is_empty()
                        || d.archetype == Archetype::Strategist
                })
            })
            .cloned()
            .collect();
        if let Some(who) = camp_rng.select(&schemers).cloned() {
            let summary = format!("{} works the numbers after dark.", season.display_name(&who));
            season.push_log(LogKind::Scheming, vec![who], summary);
        }
    }

    let mut pair = active.clone();
    camp_rng.shuffle(&mut pair);
    pair.truncate(2);
    if pair.len() == 2 {
        narrate(season, NarrationKind::CampDialogue, &pair, BTreeMap::new(), Phase::Tribunal, Phase::Tribunal, fx);
    } else {
        transition(season, Phase::Tribunal);
    }
}

/// Where the tribunal hands off once any debate is over.
fn after_tribunal(season: &Season) -> Phase {
    if season.settings.voting_ceremony {
        Phase::VotingCeremony
    } else {
        Phase::AdvantagePlay
    }
}

fn provisional_votes(season: &Season) -> Vec<Vote> {
    let mut rng = rng(season, Stream::Votes, 0);
    let mut votes = Vec::new();
    for voter_id in season.active_ids() {
        let Some(voter) = season.dossiers.get(&voter_id) else {
            continue;
        };
        let candidates = vote_candidates(&voter_id, &season.dossiers, &season.cast, &season.alliances, season.round);
        if let Some(choice) = calculate_vote(voter, &candidates, &season.alliances, &season.rules, &mut rng) {
            votes.push(Vote {
                voter_id,
                target_id: choice.target_id,
                reasoning: choice.reasoning,
                extra: false,
            });
        }
    }
    votes
}

fn tribunal(season: &mut Season, fx: &mut Vec<SideEffect>) {
    let next = after_tribunal(season);
    if season.tribunal().is_some() {
        // Re-entered after a debate: move on.
        transition(season, next);
        return;
    }
    let votes = provisional_votes(season);
    debug!(round = season.round, votes = votes.len(), "Provisional votes computed");
    season.activity = Activity::Tribunal(TribunalState {
        votes,
        ..TribunalState::default()
    });
    let active = season.active_ids();
    if active.len() < 2 {
        transition(season, next);
        return;
    }
    narrate(season, NarrationKind::TribunalDebate, &active, BTreeMap::new(), next, next, fx);
}

fn log_vote(season: &mut Season, vote: &Vote) {
    let summary = format!(
        "{} votes for {}{}: \"{}\"",
        season.display_name(&vote.voter_id),
        season.display_name(&vote.target_id),
        if vote.extra { " (extra vote)" } else { "" },
        vote.reasoning
    );
    season.push_log(
        LogKind::VoteCast,
        vec![vote.voter_id.clone(), vote.target_id.clone()],
        summary,
    );
}

fn voting_ceremony(season: &mut Season, fx: &mut Vec<SideEffect>) {
    let Some(t) = season.tribunal_mut() else {
        warn!(round = season.round, "Voting ceremony without a tribunal");
        transition(season, Phase::AdvantagePlay);
        return;
    };
    let pending = t.votes.get(t.ceremony_index).cloned();
    if pending.is_some() {
        t.ceremony_index += 1;
    }
    let done = t.ceremony_index >= t.votes.len();
    let count = t.votes.len();
    if let Some(vote) = pending {
        log_vote(season, &vote);
    }
    if done {
        transition(season, Phase::Vote);
        fx.push(SideEffect::AwaitReveal {
            kind: RevealKind::Votes,
            count,
        });
    }
}

fn advantage_play(season: &mut Season) {
    let Some(t) = season.tribunal() else {
        warn!(round = season.round, "Advantage phase without votes");
        transition(season, Phase::Elimination);
        return;
    };
    let votes = t.votes.clone();
    let unlogged: Vec<Vote> = votes.iter().skip(t.ceremony_index).cloned().collect();
    for vote in &unlogged {
        log_vote(season, vote);
    }

    let ctx = AdvantageContext {
        dossiers: &season.dossiers,
        cast: &season.cast,
        alliances: &season.alliances,
        votes: &votes,
        round: season.round,
        rules: &season.rules,
    };
    let outcome = resolve_advantages(&ctx, &mut rng(season, Stream::Advantages, 0));
    consume_played(&mut season.dossiers, &outcome);

    for play in &outcome.plays {
        let holder = season.display_name(&play.holder).to_string();
        let summary = match &play.affected {
            Some(other) => format!(
                "{} plays {} on {}.",
                holder,
                play.advantage.label(),
                season.display_name(other)
            ),
            None => format!("{} plays {}.", holder, play.advantage.label()),
        };
        let mut people = vec![play.holder.clone()];
        people.extend(play.affected.iter().cloned());
        season.push_log(LogKind::AdvantagePlayed, people, summary);
    }
    for vote in &outcome.extra_votes {
        log_vote(season, vote);
    }

    if let Some(t) = season.tribunal_mut() {
        t.ceremony_index = t.votes.len();
        t.outcome = Some(outcome);
    }
    transition(season, Phase::Elimination);
}

/// Highest counted tally goes home. Ties: highest threat, then a seeded pick.
fn pick_eliminated(season: &Season, tally: &BTreeMap<String, u32>) -> Option<String> {
    let top = *tally.values().max()?;
    let tied: Vec<&String> = season
        .cast
        .iter()
        .filter(|id| tally.get(*id) == Some(&top))
        .collect();
    if tied.len() == 1 {
        return Some(tied[0].clone());
    }

    let threat = |id: &String| season.dossiers.get(id).map(|d| d.traits.threat()).unwrap_or(0.0);
    let highest = tied.iter().map(|id| threat(*id)).fold(f64::MIN, f64::max);
    let threatening: Vec<&String> = tied.into_iter().filter(|id| threat(*id) == highest).collect();
    if threatening.len() == 1 {
        return Some(threatening[0].clone());
    }
    let mut rng = rng(season, Stream::Elimination, 0);
    rng.select(&threatening).map(|id| (*id).clone())
}

fn eliminate(season: &mut Season) {
    let round = season.round;
    let (votes, outcome) = match season.tribunal() {
        Some(t) => (t.votes.clone(), t.outcome.clone().unwrap_or_default()),
        None => (Vec::new(), Default::default()),
    };
    let all_votes = outcome.all_votes(&votes);
    let tally = counted_tally(&all_votes, &outcome.blocked, &outcome.nullified);
    let close = tally.len() >= 2 && is_close_vote(&tally, season.rules.close_vote_margin);
    let eliminated = pick_eliminated(season, &tally);

    let records: Vec<VoteRecord> = all_votes
        .iter()
        .map(|v| VoteRecord {
            voter_id: v.voter_id.clone(),
            target_id: v.target_id.clone(),
        })
        .collect();
    let blocked_voters: Vec<String> = outcome
        .blocked
        .iter()
        .filter_map(|&i| all_votes.get(i))
        .map(|v| v.voter_id.clone())
        .collect();

    record_suspicion(&mut season.dossiers, round, &records);

    let entry_id = match &eliminated {
        Some(id) => {
            if let Some(d) = season.dossiers.get_mut(id) {
                d.eliminate(round);
            }
            let count = tally.get(id).copied().unwrap_or(0);
            info!(round, eliminated = %id, votes = count, "Elimination");
            let summary = format!("{} is voted out with {} votes.", season.display_name(id), count);
            season.push_log(LogKind::Elimination, vec![id.clone()], summary)
        }
        None => {
            info!(round, "No elimination: every vote was cancelled");
            season.push_log(
                LogKind::NoElimination,
                Vec::new(),
                "Every vote was cancelled. Nobody goes home tonight.".to_string(),
            )
        }
    };
    if close {
        season.push_bookmark(BookmarkKind::CloseVote, format!("Close vote in round {}", round), entry_id);
    }

    let fallout = vote_fallout(&records, &season.alliances, &season.rules);
    apply_trust_changes(&mut season.dossiers, round, &fallout.changes);
    for (voter, target) in &fallout.betrayals {
        for (a, b) in [(voter, target), (target, voter)] {
            if let Some(d) = season.dossiers.get_mut(a) {
                d.add_rivalry(b);
            }
        }
        let summary = format!(
            "{} turned on ally {}.",
            season.display_name(voter),
            season.display_name(target)
        );
        let id = season.push_log(LogKind::Betrayal, vec![voter.clone(), target.clone()], summary.clone());
        season.push_bookmark(BookmarkKind::Betrayal, summary, id);
    }

    for (i, v) in records.iter().enumerate() {
        let mutual = records[..i]
            .iter()
            .any(|w| w.voter_id == v.target_id && w.target_id == v.voter_id);
        if !mutual {
            continue;
        }
        let mut fresh = false;
        for (a, b) in [(&v.voter_id, &v.target_id), (&v.target_id, &v.voter_id)] {
            if let Some(d) = season.dossiers.get_mut(a) {
                fresh |= d.add_rivalry(b);
            }
        }
        if fresh {
            let summary = format!(
                "{} and {} are at each other's throats.",
                season.display_name(&v.voter_id),
                season.display_name(&v.target_id)
            );
            season.push_bookmark(BookmarkKind::Rivalry, summary, entry_id);
        }
    }

    if let Some(id) = &eliminated
        && season.settings.jury_enabled
        && season.elimination_count() > season.rules.pre_jury_eliminations()
        && season.jury.len() < season.rules.jury_size
    {
        season.jury.push(id.clone());
    }

    // Round snapshots keep the membership the votes were cast under.
    season.alliances = prune_alliances(&season.alliances, &season.dossiers);

    let trial = season.current_trial.take();
    let (trial_name, trial_category, trial_winners): (String, TrialCategory, Vec<String>) = match trial {
        Some(t) => (t.trial.name, t.trial.category, t.winner.into_iter().collect()),
        None => (
            String::new(),
            season.recent_trial_categories.last().copied().unwrap_or(TrialCategory::Logic),
            Vec::new(),
        ),
    };
    season.rounds.push(RoundSummary {
        round,
        trial_name,
        trial_category,
        trial_winners,
        eliminated,
        votes: records,
        nullified_targets: outcome.nullified.clone(),
        blocked_voters,
    });
    season.activity = Activity::Idle;
    transition(season, Phase::HostEliminationSendoff);
}

fn elimination_reveal(season: &mut Season) {
    let active = season.active_count();
    if season.settings.jury_enabled && active <= season.rules.finalist_count {
        season.finalists = season.active_ids();
        transition(season, Phase::HostFinaleOpen);
    } else if !season.settings.jury_enabled && active <= season.rules.finalists_without_jury {
        season.finalists = season.active_ids();
        transition(season, Phase::Finale);
    } else {
        season.round += 1;
        season.tokens_spent_this_round = 0;
        season.audience.fate_nudges.clear();
        season.ensure_round_snapshots();
        season.refresh_membership();
        transition(season, Phase::HostRoundIntro);
    }
}

fn jury_voting(season: &mut Season, fx: &mut Vec<SideEffect>) {
    if !matches!(season.activity, Activity::Finale(_)) {
        season.activity = Activity::Finale(FinaleState::default());
    }
    let idx = match &season.activity {
        Activity::Finale(f) => f.ceremony_index,
        _ => 0,
    };

    if let Some(juror_id) = season.jury.get(idx).cloned() {
        let finalists: Vec<&Dossier> = season
            .finalists
            .iter()
            .filter_map(|id| season.dossiers.get(id))
            .collect();
        let pick = season.dossiers.get(&juror_id).and_then(|juror| {
            calculate_jury_vote(
                juror,
                &finalists,
                &season.rounds,
                &season.rules,
                &mut rng(season, Stream::Jury, idx as u64),
            )
        });
        if let Activity::Finale(f) = &mut season.activity {
            f.ceremony_index += 1;
            if let Some(finalist_id) = &pick {
                f.jury_votes.push(JuryVote {
                    juror_id: juror_id.clone(),
                    finalist_id: finalist_id.clone(),
                });
            }
        }
        if pick.is_some() {
            let summary = format!("{} casts a jury vote.", season.display_name(&juror_id));
            season.push_log(LogKind::JuryVote, vec![juror_id], summary);
        }
    }

    let (done, count) = match &season.activity {
        Activity::Finale(f) => (f.ceremony_index >= season.jury.len(), f.jury_votes.len()),
        _ => (true, 0),
    };
    if done {
        transition(season, Phase::JuryVoteReveal);
        fx.push(SideEffect::AwaitReveal {
            kind: RevealKind::JuryVotes,
            count,
        });
    }
}

fn crown_champion(season: &mut Season, fx: &mut Vec<SideEffect>) {
    let jury_votes = match &season.activity {
        Activity::Finale(f) => f.jury_votes.clone(),
        _ => Vec::new(),
    };
    if season.finalists.is_empty() {
        season.finalists = season.active_ids();
    }
    let resolution = resolve_champion(
        &season.finalists,
        &jury_votes,
        &season.rounds,
        &mut rng(season, Stream::Finale, 0),
    );
    let Some(champion) = resolution.champion else {
        warn!("Finale without finalists");
        return;
    };

    let votes = resolution.tallies.get(&champion).copied().unwrap_or(0);
    let mut summary = format!(
        "{} wins the season with {} jury votes.",
        season.display_name(&champion),
        votes
    );
    if let Some(tie_break) = resolution.tie_break {
        summary.push_str(&format!(" Tie broken by {:?}.", tie_break));
    }
    info!(champion = %champion, jury_votes = votes, "Champion crowned");
    season.push_log(LogKind::Champion, vec![champion.clone()], summary);

    let payout = bet_payout(&season.bets, &champion, &season.rules);
    if payout > 0 {
        season.bets.points += payout;
        season.push_log(
            LogKind::BetPayout,
            vec![champion.clone()],
            format!("Your bets paid out {} points.", payout),
        );
    }

    let params = BTreeMap::from([
        ("rounds".to_string(), season.round.to_string()),
        ("champion".to_string(), season.display_name(&champion).to_string()),
    ]);
    season.champion = Some(champion);
    season.activity = Activity::Idle;
    transition(season, Phase::Finished);

    // The closing summary airs after the season is already decided.
    let finalists = season.finalists.clone();
    narrate(season, NarrationKind::SeasonLore, &finalists, params, Phase::Finished, Phase::Finished, fx);
}
