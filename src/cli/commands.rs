use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::roster::Roster;
use crate::config::simulation::SimulationConfig;
use crate::narration::{
    ConfiguredNarrator, NarrationError, NarrationRequest, NarrationResponse, Narrator,
    TemplateNarrator,
};
use crate::persistence::{self, SeasonStore};
use crate::season::{Season, SeasonSettings};
use crate::server::protocol::{ControlMessage, SeasonEvent};
use crate::server::{self, ServerState};
use crate::simulation::pace::tick_delay_ms;
use crate::simulation::phase::Phase;
use crate::simulation::statistics::compute_season_stats;
use crate::simulation::{self, SideEffect};

/// Minimum loop delay while the engine cannot advance.
const IDLE_POLL_MS: u64 = 50;

/// Completions reported back to the driver by spawned side-effect tasks.
#[derive(Debug)]
enum DriverEvent {
    Narration {
        request_id: u64,
        result: Result<NarrationResponse, NarrationError>,
    },
    NarrationTimedOut {
        request_id: u64,
    },
    SpeechFinished {
        request_id: u64,
    },
    RevealStep {
        generation: u64,
    },
    RevealDone {
        generation: u64,
    },
    Materialized {
        entry_id: u64,
        result: Result<NarrationResponse, NarrationError>,
    },
}

/// Turns engine side effects into background tasks.
struct Dispatcher {
    narrator: Arc<ConfiguredNarrator>,
    events: mpsc::Sender<DriverEvent>,
    narration_timeout: Duration,
    reveal_step: Duration,
    /// Bumped whenever a reveal starts or is finished early, so steps from an
    /// older reveal are dropped.
    reveal_generation: u64,
}

impl Dispatcher {
    fn dispatch(&mut self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::Narrate(request) => self.spawn_narration(request),
                SideEffect::Speak {
                    request_id,
                    duration_ms,
                    ..
                } => {
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                        let _ = events.send(DriverEvent::SpeechFinished { request_id }).await;
                    });
                }
                SideEffect::AwaitReveal { kind, count } => {
                    self.reveal_generation += 1;
                    let generation = self.reveal_generation;
                    let events = self.events.clone();
                    let step = self.reveal_step;
                    debug!(?kind, count, "Reveal started");
                    tokio::spawn(async move {
                        for _ in 0..count {
                            tokio::time::sleep(step).await;
                            if events.send(DriverEvent::RevealStep { generation }).await.is_err() {
                                return;
                            }
                        }
                        tokio::time::sleep(step).await;
                        let _ = events.send(DriverEvent::RevealDone { generation }).await;
                    });
                }
            }
        }
    }

    fn spawn_narration(&self, request: NarrationRequest) {
        let narrator = Arc::clone(&self.narrator);
        let events = self.events.clone();
        let timeout = self.narration_timeout;
        tokio::spawn(async move {
            let request_id = request.request_id;
            let event = match tokio::time::timeout(timeout, narrator.generate(&request)).await {
                Ok(result) => DriverEvent::Narration { request_id, result },
                Err(_) => DriverEvent::NarrationTimedOut { request_id },
            };
            let _ = events.send(event).await;
        });
    }

    fn spawn_materialization(&self, entry_id: u64, request: NarrationRequest) {
        let narrator = Arc::clone(&self.narrator);
        let events = self.events.clone();
        let timeout = self.narration_timeout;
        tokio::spawn(async move {
            let result = tokio::time::timeout(timeout, narrator.generate(&request))
                .await
                .unwrap_or(Err(NarrationError::Timeout));
            let _ = events.send(DriverEvent::Materialized { entry_id, result }).await;
        });
    }
}

/// Feed a task completion back into the engine.
fn apply_driver_event(season: &mut Season, event: DriverEvent, reveal_generation: u64) -> Vec<SideEffect> {
    match event {
        DriverEvent::Narration { request_id, result } => {
            simulation::deliver_narration(season, request_id, result)
        }
        DriverEvent::NarrationTimedOut { request_id } => {
            warn!(request_id, "Narration timed out");
            simulation::narration_timeout(season, request_id)
        }
        DriverEvent::SpeechFinished { request_id } => simulation::speech_complete(season, request_id),
        DriverEvent::RevealStep { generation } => {
            if generation == reveal_generation
                && let Err(e) = simulation::advance_reveal(season)
            {
                debug!(error = %e, "Reveal step ignored");
            }
            Vec::new()
        }
        DriverEvent::RevealDone { generation } => {
            if generation == reveal_generation
                && let Err(e) = simulation::reveal_complete(season)
            {
                debug!(error = %e, "Reveal completion ignored");
            }
            Vec::new()
        }
        DriverEvent::Materialized { entry_id, result } => {
            match result {
                Ok(NarrationResponse::Text(text)) if !text.trim().is_empty() => {
                    match simulation::apply_materialization(season, entry_id, text.trim()) {
                        Ok(()) => info!(entry = entry_id, "Log entry materialized"),
                        Err(e) => warn!(entry = entry_id, error = %e, "Materialization dropped"),
                    }
                }
                Ok(_) => warn!(entry = entry_id, "Materialization returned no text"),
                Err(e) => warn!(entry = entry_id, error = %e, "Materialization failed"),
            }
            Vec::new()
        }
    }
}

fn handle_control(season: &mut Season, message: ControlMessage, dispatcher: &mut Dispatcher) {
    if let ControlMessage::Materialize { log_entry_id } = message {
        match simulation::materialize_entry(season, log_entry_id) {
            Ok(request) => dispatcher.spawn_materialization(log_entry_id, request),
            Err(e) => warn!(entry = log_entry_id, error = %e, "Materialization rejected"),
        }
        return;
    }

    match message.apply(season) {
        Ok(()) => {
            debug!(?message, "Control applied");
            if message == ControlMessage::RevealComplete {
                dispatcher.reveal_generation += 1;
            }
        }
        Err(e) => warn!(?message, error = %e, "Control rejected"),
    }
}

/// Send the entries appended since `log_before` plus any cues to spectators.
async fn publish_since(
    state: &ServerState,
    season: &Season,
    phase_before: Phase,
    log_before: usize,
    effects: &[SideEffect],
) {
    let start = log_before.min(season.log.len());
    let event = SeasonEvent::from_entries(season, phase_before, &season.log[start..], effects);
    state.publish(season, event.as_ref()).await;
}

async fn save_and_prune(season: &Season, config: &SimulationConfig, state: &ServerState) {
    let snapshot_dir = Path::new(&config.snapshot_directory);
    match persistence::save_snapshot(season, snapshot_dir) {
        Ok(path) => {
            info!(path = %path.display(), tick = season.tick, "Snapshot saved");
            state.snapshot_saved(season.tick).await;
            if let Err(e) = persistence::prune_snapshots(snapshot_dir, config.max_snapshots as usize) {
                warn!(error = %e, "Snapshot pruning failed");
            }
        }
        Err(e) => warn!(error = %e, "Snapshot save failed"),
    }
}

fn load_season(config: &SimulationConfig, snapshot: Option<&str>) -> Result<Season, String> {
    match snapshot {
        Some(path) => persistence::load_snapshot(Path::new(path)),
        None => persistence::load_latest_valid_snapshot(Path::new(&config.snapshot_directory)),
    }
    .map_err(|e| format!("Failed to load snapshot: {}", e))
}

fn load_roster(roster_path: Option<&str>, seed: Option<u64>) -> Result<Roster, String> {
    let mut roster = match roster_path {
        Some(path) => Roster::from_file(Path::new(path))?,
        None => Roster::sample(seed.unwrap_or(1)),
    };
    if let Some(seed) = seed {
        roster.seed = seed;
    }
    Ok(roster)
}

/// Drive a season: load it, serve the spectator feed, tick until interrupted.
pub async fn run_season(config: &SimulationConfig, snapshot: Option<&str>) -> Result<(), String> {
    let mut season = load_season(config, snapshot)?;
    // Nobody is left to answer a request that was in flight when the
    // snapshot was taken.
    simulation::abandon_suspension(&mut season);
    info!(
        season = %season.id,
        round = season.round,
        phase = season.phase.label(),
        tick = season.tick,
        "Season loaded"
    );

    let narrator = ConfiguredNarrator::from_config(&config.narration)
        .map_err(|e| format!("Cannot start narrator: {}", e))?;
    info!(mode = narrator.label(), "Narrator ready");

    let (state, mut control_rx) = ServerState::new(&season);
    let state = Arc::new(state);

    let addr: SocketAddr = format!("{}:{}", config.websocket_bind, config.websocket_port)
        .parse()
        .map_err(|e| format!("Invalid bind address: {}", e))?;
    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = server::start_server(server_state, addr).await {
            warn!(error = %e, "Spectator feed stopped");
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let mut dispatcher = Dispatcher {
        narrator: Arc::new(narrator),
        events: event_tx,
        narration_timeout: Duration::from_secs(config.narration.timeout_secs),
        reveal_step: Duration::from_millis(config.reveal_step_ms),
        reveal_generation: 0,
    };

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut next_tick = Instant::now();
    let mut ticks_since_snapshot: u32 = 0;
    info!(
        base_tick_ms = config.base_tick_ms,
        snapshot_interval = config.snapshot_interval,
        "Season running"
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            Some(message) = control_rx.recv() => {
                let phase_before = season.phase;
                let log_before = season.log.len();
                handle_control(&mut season, message, &mut dispatcher);
                publish_since(&state, &season, phase_before, log_before, &[]).await;
            }
            Some(event) = event_rx.recv() => {
                let phase_before = season.phase;
                let log_before = season.log.len();
                let effects = apply_driver_event(&mut season, event, dispatcher.reveal_generation);
                publish_since(&state, &season, phase_before, log_before, &effects).await;
                dispatcher.dispatch(effects);
            }
            _ = tokio::time::sleep_until(next_tick) => {
                let result = simulation::tick(&mut season);
                let event = SeasonEvent::from_tick(&season, &result, &result.effects);
                state.publish(&season, event.as_ref()).await;

                let finished_now =
                    result.phase_before != Phase::Finished && result.phase_after == Phase::Finished;
                let advanced = result.advanced;
                dispatcher.dispatch(result.effects);

                let delay = tick_delay_ms(season.settings.speed, config.base_tick_ms);
                let delay = if advanced { delay } else { delay.max(IDLE_POLL_MS) };
                next_tick = Instant::now() + Duration::from_millis(delay);

                if advanced {
                    ticks_since_snapshot += 1;
                }
                if finished_now {
                    info!(champion = season.champion.as_deref().unwrap_or("none"), "Season finished");
                }
                if ticks_since_snapshot >= config.snapshot_interval || finished_now {
                    save_and_prune(&season, config, &state).await;
                    ticks_since_snapshot = 0;
                }
            }
        }
    }

    info!("Saving final snapshot");
    save_and_prune(&season, config, &state).await;
    info!(tick = season.tick, "Season stopped");
    Ok(())
}

/// Create a season from a roster (or the sample cast) and save its first snapshot.
pub fn new_season(
    config: &SimulationConfig,
    roster_path: Option<&str>,
    seed: Option<u64>,
) -> Result<PathBuf, String> {
    let roster = load_roster(roster_path, seed)?;
    let season = crate::season::start_season(
        &roster.cast,
        roster.seed,
        roster.opening_bet.as_deref(),
        &roster.host,
        config.season.clone(),
        config.rules.clone(),
    )
    .map_err(|e| format!("Cannot start season: {}", e))?;
    print_season_summary(&season);
    persistence::save_snapshot(&season, Path::new(&config.snapshot_directory))
        .map_err(|e| format!("Cannot save snapshot: {}", e))
}

/// Play a whole season headless. Template narration is used when `narrate`
/// is set; otherwise narration is switched off.
pub fn simulate_season(
    config: &SimulationConfig,
    roster_path: Option<&str>,
    seed: Option<u64>,
    max_ticks: u64,
    narrate: bool,
) -> Result<Season, String> {
    let roster = load_roster(roster_path, seed)?;
    let settings = if narrate {
        config.season.clone()
    } else {
        SeasonSettings {
            host_narration: false,
            tribunal_debate: false,
            camp_dialogue: false,
            ..config.season.clone()
        }
    };

    let mut store = SeasonStore::new();
    let id = store
        .start_season(
            &roster.cast,
            roster.seed,
            roster.opening_bet.as_deref(),
            &roster.host,
            settings,
            config.rules.clone(),
        )
        .map_err(|e| format!("Cannot start season: {}", e))?;

    let narrator = TemplateNarrator;
    let ticks = store
        .update_season(id, |s| {
            Ok::<_, String>(simulation::simulate(s, narrate.then_some(&narrator), max_ticks))
        })
        .ok_or_else(|| format!("Season {} disappeared", id))??;

    let season = store
        .delete_season(id)
        .ok_or_else(|| format!("Season {} disappeared", id))?;
    if season.phase != Phase::Finished {
        return Err(format!(
            "Season did not finish within {} ticks (round {}, phase {})",
            max_ticks,
            season.round,
            season.phase.label()
        ));
    }
    info!(ticks, champion = season.champion.as_deref().unwrap_or("none"), "Simulation complete");
    Ok(season)
}

/// Champion, bet result and season awards.
pub fn print_season_report(season: &Season) -> Result<(), String> {
    print_season_summary(season);
    println!();
    println!("Bet points: {}", season.bets.points);
    match compute_season_stats(season) {
        Some(stats) => {
            let json = serde_json::to_string_pretty(&stats)
                .map_err(|e| format!("Cannot encode stats: {}", e))?;
            println!("--- Awards ---");
            println!("{}", json);
        }
        None => println!("(no awards until a champion is crowned)"),
    }
    Ok(())
}

/// Summarize the latest season, or one character's dossier.
pub fn inspect(
    config: &SimulationConfig,
    snapshot: Option<&str>,
    character: Option<&str>,
    log_tail: usize,
) -> Result<(), String> {
    let season = load_season(config, snapshot)?;
    match character {
        Some(id) => inspect_character(&season, id),
        None => {
            print_season_summary(&season);
            print_log_tail(&season, log_tail);
            Ok(())
        }
    }
}

pub fn print_season_summary(season: &Season) {
    println!("=== Season {} ===", season.id);
    println!("Seed: {}", season.seed);
    println!("Round: {}", season.round);
    println!("Phase: {}", season.phase.label());
    println!("Tick: {}", season.tick);
    println!(
        "Speed: {}{}",
        season.settings.speed.label(),
        if season.paused { " (paused)" } else { "" }
    );
    if let Some(champion) = &season.champion {
        println!("Champion: {}", season.display_name(champion));
    }
    println!();

    println!("--- Cast ---");
    for id in &season.cast {
        let Some(d) = season.dossiers.get(id) else {
            continue;
        };
        let status = match d.eliminated_round {
            Some(r) => format!("out in round {}", r),
            None => "active".to_string(),
        };
        println!("  {:<10} {:<18} {}", d.name, d.archetype.label(), status);
    }

    if !season.alliances.is_empty() {
        println!();
        println!("--- Alliances ---");
        for a in &season.alliances {
            let names: Vec<&str> = a.members.iter().map(|m| season.display_name(m)).collect();
            println!("  #{} {} (round {})", a.id, names.join(", "), a.formed_round);
        }
    }

    if !season.jury.is_empty() {
        println!();
        let names: Vec<&str> = season.jury.iter().map(|j| season.display_name(j)).collect();
        println!("Jury: {}", names.join(", "));
    }
}

fn print_log_tail(season: &Season, count: usize) {
    if count == 0 || season.log.is_empty() {
        return;
    }
    println!();
    println!("--- Log ---");
    let start = season.log.len().saturating_sub(count);
    for entry in &season.log[start..] {
        println!("  [{:>4}] r{} {:?}: {}", entry.id, entry.round, entry.kind, entry.summary);
    }
}

fn inspect_character(season: &Season, id: &str) -> Result<(), String> {
    let d = season
        .dossiers
        .get(id)
        .ok_or_else(|| format!("No character '{}' in season {}", id, season.id))?;

    println!("=== {} ({}) ===", d.name, d.character_id);
    println!("Archetype: {}", d.archetype.label());
    match d.eliminated_round {
        Some(r) => println!("Eliminated: round {}", r),
        None => println!("Status: active"),
    }
    println!();
    println!("--- Traits ---");
    println!("  Logic: {:.2}", d.traits.logic);
    println!("  Endurance: {:.2}", d.traits.endurance);
    println!("  Persuasion: {:.2}", d.traits.persuasion);
    println!("  Chaos: {:.2}", d.traits.chaos);
    println!("  Creative: {:.2}", d.traits.creative);
    println!();
    println!("--- Advantages ---");
    if d.advantages.is_empty() {
        println!("  (none)");
    } else {
        for a in &d.advantages {
            println!("  {}", a.label());
        }
    }
    if !d.rivalries.is_empty() {
        let names: Vec<&str> = d.rivalries.iter().map(|r| season.display_name(r)).collect();
        println!();
        println!("Rivals: {}", names.join(", "));
    }

    if let Some(snapshot) = d.latest_snapshot(season.round) {
        println!();
        println!("--- Trust ---");
        let mut trust: Vec<(&String, &f64)> = snapshot.trust.iter().collect();
        trust.sort_by(|a, b| b.1.total_cmp(a.1));
        for (other, value) in trust {
            println!("  {:<10} {:+.2}", season.display_name(other), value);
        }
        println!();
        println!("Suspicion: {:.0}% of the last vote", snapshot.suspicion * 100.0);
        if let Some(note) = &snapshot.note {
            println!();
            println!("Note: {}", note);
        }
    }
    Ok(())
}

/// Write a season as a versioned JSON document to `output`, or stdout.
pub fn export(
    config: &SimulationConfig,
    snapshot: Option<&str>,
    output: Option<&str>,
) -> Result<(), String> {
    let season = load_season(config, snapshot)?;
    let json = persistence::export_season(&season)
        .map_err(|e| format!("Cannot encode season: {}", e))?;
    match output {
        Some(path) => {
            std::fs::write(path, json).map_err(|e| format!("Cannot write {}: {}", path, e))?;
            println!("Season {} exported to {}", season.id, path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Validate an export document and save it as a snapshot.
pub fn import(config: &SimulationConfig, file: &str) -> Result<PathBuf, String> {
    let json = std::fs::read_to_string(file).map_err(|e| format!("Cannot read {}: {}", file, e))?;
    let mut store = SeasonStore::new();
    let id = store.import_season(&json).map_err(|e| e.to_string())?;
    let season = store
        .get(id)
        .ok_or_else(|| format!("Season {} disappeared", id))?;
    persistence::save_snapshot(season, Path::new(&config.snapshot_directory))
        .map_err(|e| format!("Cannot save snapshot: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rules::GameRules;
    use crate::season::start_season;
    use crate::simulation::RevealKind;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> SimulationConfig {
        let toml = format!(
            "snapshot_directory = \"{}\"",
            dir.path().display().to_string().replace('\\', "/")
        );
        SimulationConfig::from_toml_str(&toml, Path::new("test.toml")).unwrap()
    }

    fn dispatcher() -> (Dispatcher, mpsc::Receiver<DriverEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let d = Dispatcher {
            narrator: Arc::new(ConfiguredNarrator::Template(TemplateNarrator)),
            events: tx,
            narration_timeout: Duration::from_secs(5),
            reveal_step: Duration::from_millis(1),
            reveal_generation: 0,
        };
        (d, rx)
    }

    fn season() -> Season {
        let roster = Roster::sample(4);
        start_season(&roster.cast, 4, None, "host", SeasonSettings::default(), GameRules::default()).unwrap()
    }

    /// Tick until the season is waiting on narration and return that request.
    fn pending_request(s: &mut Season) -> NarrationRequest {
        loop {
            let result = simulation::tick(s);
            for effect in result.effects {
                if let SideEffect::Narrate(request) = effect {
                    return request;
                }
            }
        }
    }

    #[tokio::test]
    async fn narration_effect_comes_back_as_delivery() {
        let (mut d, mut rx) = dispatcher();
        let mut s = season();
        let request = pending_request(&mut s);
        let id = request.request_id;
        d.dispatch(vec![SideEffect::Narrate(request)]);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DriverEvent::Narration { request_id, result: Ok(_) } if request_id == id));
        let effects = apply_driver_event(&mut s, event, d.reveal_generation);
        assert!(matches!(effects.as_slice(), [SideEffect::Speak { .. }]));
    }

    #[tokio::test]
    async fn speech_finishes_after_its_duration() {
        let (mut d, mut rx) = dispatcher();
        d.dispatch(vec![SideEffect::Speak {
            request_id: 9,
            speaker_id: None,
            text: "hi".into(),
            duration_ms: 5,
        }]);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DriverEvent::SpeechFinished { request_id: 9 }));
    }

    #[tokio::test]
    async fn reveal_steps_then_completes() {
        let (mut d, mut rx) = dispatcher();
        d.dispatch(vec![SideEffect::AwaitReveal {
            kind: RevealKind::Votes,
            count: 2,
        }]);
        assert_eq!(d.reveal_generation, 1);
        for _ in 0..2 {
            assert!(matches!(rx.recv().await.unwrap(), DriverEvent::RevealStep { generation: 1 }));
        }
        assert!(matches!(rx.recv().await.unwrap(), DriverEvent::RevealDone { generation: 1 }));
    }

    #[test]
    fn stale_reveal_events_are_dropped() {
        let mut s = season();
        let before = s.clone();
        let effects = apply_driver_event(&mut s, DriverEvent::RevealDone { generation: 1 }, 2);
        assert!(effects.is_empty());
        assert_eq!(s, before);
        // Current generation but no reveal running: rejected quietly.
        apply_driver_event(&mut s, DriverEvent::RevealStep { generation: 2 }, 2);
        assert_eq!(s, before);
    }

    #[test]
    fn timed_out_narration_falls_back() {
        let mut s = season();
        let request = pending_request(&mut s);
        assert!(s.is_waiting());
        apply_driver_event(
            &mut s,
            DriverEvent::NarrationTimedOut {
                request_id: request.request_id,
            },
            0,
        );
        assert!(!s.is_waiting());
    }

    #[test]
    fn failed_materialization_leaves_entry_untouched() {
        let mut s = season();
        let id = simulation::ask_confessional(&mut s, "mara", "Who do you trust?").unwrap();
        apply_driver_event(
            &mut s,
            DriverEvent::Materialized {
                entry_id: id,
                result: Err(NarrationError::Failed("down".into())),
            },
            0,
        );
        let entry = s.log_entry(id).unwrap();
        assert!(entry.materialization.as_ref().is_none_or(|m| m.detail.is_none()));
        assert_eq!(s.tokens_spent_this_round, 0);
    }

    #[tokio::test]
    async fn control_messages_reach_the_season() {
        let (mut d, _rx) = dispatcher();
        let mut s = season();
        handle_control(&mut s, ControlMessage::Pause, &mut d);
        assert!(s.paused);
        // Rejected messages change nothing.
        handle_control(&mut s, ControlMessage::RevealComplete, &mut d);
        assert_eq!(d.reveal_generation, 0);
        handle_control(&mut s, ControlMessage::Materialize { log_entry_id: 404 }, &mut d);
        assert_eq!(s.tokens_spent_this_round, 0);
    }

    #[test]
    fn new_season_saves_a_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let path = new_season(&config, None, Some(11)).unwrap();
        let season = persistence::load_snapshot(&path).unwrap();
        assert_eq!(season.seed, 11);
        assert_eq!(season.phase, Phase::Setup);
        assert_eq!(season.cast.len(), 12);
    }

    #[test]
    fn simulate_crowns_a_champion() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let season = simulate_season(&config, None, Some(5), 100_000, true).unwrap();
        assert_eq!(season.phase, Phase::Finished);
        assert!(season.champion.is_some());
        assert!(compute_season_stats(&season).is_some());
        assert!(print_season_report(&season).is_ok());
    }

    #[test]
    fn simulate_is_reproducible_without_narration() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let a = simulate_season(&config, None, Some(8), 100_000, false).unwrap();
        let b = simulate_season(&config, None, Some(8), 100_000, false).unwrap();
        assert_eq!(a.champion, b.champion);
        assert_eq!(a.rounds, b.rounds);
    }

    #[test]
    fn simulate_reports_tick_exhaustion() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let err = simulate_season(&config, None, Some(5), 3, false).unwrap_err();
        assert!(err.contains("did not finish"));
    }

    #[test]
    fn export_then_import_through_files() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let snapshot = new_season(&config, None, Some(3)).unwrap();
        let original = persistence::load_snapshot(&snapshot).unwrap();

        let out = dir.path().join("season.json");
        let out_str = out.to_str().unwrap();
        export(&config, Some(snapshot.to_str().unwrap()), Some(out_str)).unwrap();

        let other = TempDir::new().unwrap();
        let restored_path = import(&config_in(&other), out_str).unwrap();
        assert_eq!(persistence::load_snapshot(&restored_path).unwrap(), original);
    }

    #[test]
    fn import_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{\"version\": 1}").unwrap();
        assert!(import(&config, bad.to_str().unwrap()).is_err());
    }

    #[test]
    fn inspect_unknown_character_errors() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        new_season(&config, None, Some(2)).unwrap();
        assert!(inspect(&config, None, Some("nobody"), 0).is_err());
        assert!(inspect(&config, None, Some("mara"), 0).is_ok());
        assert!(inspect(&config, None, None, 5).is_ok());
    }
}
