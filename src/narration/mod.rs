//! The narrative collaborator: request and response types, the `Narrator`
//! seam, the per-round budget guard and the offline template narrator.

pub mod llm;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use uuid::Uuid;

use crate::config::simulation::NarrationConfig;
use crate::season::log::LogKind;
use crate::season::{DebateTurn, Season};
use crate::simulation::rng::{SeededRng, Stream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NarrationKind {
    RoundIntro,
    TrialIntro,
    EliminationSendoff,
    FinaleOpen,
    OpeningStatements,
    JuryQuestions,
    ClosingStatements,
    TribunalDebate,
    Confessional,
    SchemingNote,
    AllianceHint,
    CampDialogue,
    SeasonLore,
}

impl NarrationKind {
    pub fn label(&self) -> &'static str {
        match self {
            NarrationKind::RoundIntro => "round_intro",
            NarrationKind::TrialIntro => "trial_intro",
            NarrationKind::EliminationSendoff => "elimination_sendoff",
            NarrationKind::FinaleOpen => "finale_open",
            NarrationKind::OpeningStatements => "opening_statements",
            NarrationKind::JuryQuestions => "jury_questions",
            NarrationKind::ClosingStatements => "closing_statements",
            NarrationKind::TribunalDebate => "tribunal_debate",
            NarrationKind::Confessional => "confessional",
            NarrationKind::SchemingNote => "scheming_note",
            NarrationKind::AllianceHint => "alliance_hint",
            NarrationKind::CampDialogue => "camp_dialogue",
            NarrationKind::SeasonLore => "season_lore",
        }
    }

    /// Lines spoken by the host, gated by the host-narration toggle.
    pub fn is_host_line(&self) -> bool {
        matches!(
            self,
            NarrationKind::RoundIntro
                | NarrationKind::TrialIntro
                | NarrationKind::EliminationSendoff
                | NarrationKind::FinaleOpen
                | NarrationKind::SeasonLore
        )
    }

    /// Rough token cost charged against the round budget.
    pub fn estimated_tokens(&self) -> u32 {
        match self {
            NarrationKind::RoundIntro
            | NarrationKind::TrialIntro
            | NarrationKind::EliminationSendoff
            | NarrationKind::FinaleOpen => 80,
            NarrationKind::OpeningStatements
            | NarrationKind::JuryQuestions
            | NarrationKind::ClosingStatements
            | NarrationKind::CampDialogue => 200,
            NarrationKind::TribunalDebate => 320,
            NarrationKind::Confessional => 220,
            NarrationKind::SchemingNote => 160,
            NarrationKind::AllianceHint => 120,
            NarrationKind::SeasonLore => 400,
        }
    }

    /// Log kind written when generated text goes on air.
    pub fn log_kind(&self) -> LogKind {
        match self {
            NarrationKind::TribunalDebate => LogKind::TribunalDebate,
            NarrationKind::CampDialogue => LogKind::CampDialogue,
            NarrationKind::Confessional => LogKind::Confessional,
            NarrationKind::SchemingNote => LogKind::Scheming,
            NarrationKind::AllianceHint => LogKind::AllianceFormed,
            _ => LogKind::HostLine,
        }
    }

    /// The kind that expands a materializable log entry.
    pub fn for_entry(kind: LogKind) -> Option<NarrationKind> {
        match kind {
            LogKind::Confessional => Some(NarrationKind::Confessional),
            LogKind::Scheming => Some(NarrationKind::SchemingNote),
            LogKind::AllianceFormed => Some(NarrationKind::AllianceHint),
            _ => None,
        }
    }
}

/// Cost estimate stored on a materializable log entry.
pub fn estimated_entry_cost(kind: LogKind) -> u32 {
    NarrationKind::for_entry(kind)
        .map(|k| k.estimated_tokens())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationRequest {
    pub season_id: Uuid,
    pub request_id: u64,
    pub kind: NarrationKind,
    pub round: u32,
    pub seed: u64,
    pub participants: Vec<Participant>,
    /// Structured prompt parameters, e.g. trial name or eliminated character.
    pub params: BTreeMap<String, String>,
    pub estimated_tokens: u32,
    pub max_line_chars: usize,
}

/// One line of a generated debate, as returned by the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateLine {
    pub speaker: String,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NarrationResponse {
    Text(String),
    Lines(Vec<DebateLine>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NarrationError {
    Failed(String),
    /// Refused by a budget or usage guard before any call was made.
    Refused(String),
    Timeout,
    Malformed(String),
}

impl std::fmt::Display for NarrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NarrationError::Failed(e) => write!(f, "Narration failed: {}", e),
            NarrationError::Refused(e) => write!(f, "Narration refused: {}", e),
            NarrationError::Timeout => write!(f, "Narration timed out"),
            NarrationError::Malformed(e) => write!(f, "Malformed narration: {}", e),
        }
    }
}

impl std::error::Error for NarrationError {}

/// Anything that can turn a request into short themed text.
pub trait Narrator: Send + Sync {
    fn generate(
        &self,
        request: &NarrationRequest,
    ) -> impl Future<Output = Result<NarrationResponse, NarrationError>> + Send;
}

// === Budget ===

/// Per-round token allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetGuard {
    pub budget: u32,
    pub spent: u32,
}

impl BudgetGuard {
    pub fn for_season(season: &Season) -> Self {
        BudgetGuard {
            budget: season.settings.token_budget_per_round,
            spent: season.tokens_spent_this_round,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.budget.saturating_sub(self.spent)
    }

    pub fn admit(&self, cost: u32) -> Result<(), NarrationError> {
        if cost > self.remaining() {
            return Err(NarrationError::Refused(format!(
                "needs {} tokens, {} left this round",
                cost,
                self.remaining()
            )));
        }
        Ok(())
    }
}

// === Debate lines ===

/// Keep only lines spoken by supplied participants (matched by id or name,
/// case-insensitively), trimmed and cut to `max_chars` characters.
pub fn sanitize_debate(
    lines: &[DebateLine],
    participants: &[Participant],
    max_chars: usize,
) -> Vec<DebateTurn> {
    lines
        .iter()
        .filter_map(|l| {
            let speaker = l.speaker.trim();
            let who = participants.iter().find(|p| {
                p.id.eq_ignore_ascii_case(speaker) || p.name.eq_ignore_ascii_case(speaker)
            })?;
            let text: String = l.line.trim().chars().take(max_chars).collect();
            let text = text.trim_end().to_string();
            if text.is_empty() {
                return None;
            }
            Some(DebateTurn {
                speaker_id: who.id.clone(),
                line: text,
            })
        })
        .collect()
}

/// Parse "Name: line" rows into debate lines. Rows without a colon are
/// skipped.
pub fn parse_debate_text(text: &str) -> Vec<DebateLine> {
    text.lines()
        .filter_map(|row| {
            let row = row.trim().trim_start_matches(['-', '*']).trim();
            let (speaker, line) = row.split_once(':')?;
            let speaker = speaker.trim().trim_matches('*').trim();
            if speaker.is_empty() || line.trim().is_empty() {
                return None;
            }
            Some(DebateLine {
                speaker: speaker.to_string(),
                line: line.trim().trim_matches('"').to_string(),
            })
        })
        .collect()
}

// === Offline narrator ===

/// Seeded fill-in-the-blank narrator. Needs no network and always answers.
#[derive(Debug, Clone, Default)]
pub struct TemplateNarrator;

const DEBATE_TEMPLATES: [&str; 6] = [
    "Everyone keeps saying my name. Maybe look at who benefits.",
    "I have kept my word since day one. Can {other} say the same?",
    "Tonight is about the numbers, not feelings.",
    "{other} has been whispering at the well all afternoon.",
    "If you vote with your gut, you vote for {other}.",
    "I am not going anywhere. Write it down.",
];

fn param<'a>(request: &'a NarrationRequest, key: &str, fallback: &'a str) -> &'a str {
    request.params.get(key).map(String::as_str).unwrap_or(fallback)
}

fn first_name(request: &NarrationRequest, idx: usize) -> &str {
    request
        .participants
        .get(idx)
        .map(|p| p.name.as_str())
        .unwrap_or("someone")
}

impl TemplateNarrator {
    pub fn respond(&self, request: &NarrationRequest) -> NarrationResponse {
        let mut rng = SeededRng::for_stream(request.seed, request.round, Stream::Narration, 0);
        let round = request.round;
        let text = match request.kind {
            NarrationKind::TribunalDebate => return NarrationResponse::Lines(self.debate(request, &mut rng)),
            NarrationKind::RoundIntro => {
                let openers = [
                    format!("Day {} on the island. {} castaways remain.", round, param(request, "remaining", "The")),
                    format!("Round {} begins. The tide is out and so are the knives.", round),
                    format!("Welcome back. Round {}, and nobody slept well.", round),
                ];
                rng.select(&openers).cloned().unwrap_or_default()
            }
            NarrationKind::TrialIntro => format!(
                "Today's trial is {}, a test of {}. Immunity is on the line.",
                param(request, "trial", "a mystery"),
                param(request, "category", "nerve")
            ),
            NarrationKind::EliminationSendoff => match request.params.get("eliminated") {
                Some(name) => format!("{}, the tribe has spoken. Your torch goes out tonight.", name),
                None => "Every vote was cancelled. Nobody leaves tonight.".to_string(),
            },
            NarrationKind::FinaleOpen => format!(
                "Three remain. {} jurors will decide who walks away with the title.",
                param(request, "jurors", "The")
            ),
            NarrationKind::OpeningStatements => format!(
                "{} opens: \"I played every round like it was my last.\"",
                first_name(request, 0)
            ),
            NarrationKind::JuryQuestions => format!(
                "A juror asks {}: \"Name one promise you kept.\"",
                first_name(request, 0)
            ),
            NarrationKind::ClosingStatements => format!(
                "{} closes: \"Vote for the game you watched, not the one you wished for.\"",
                first_name(request, 0)
            ),
            NarrationKind::CampDialogue => format!(
                "{} and {} trade theories by the fire until the embers die.",
                first_name(request, 0),
                first_name(request, 1)
            ),
            NarrationKind::Confessional => match request.params.get("question") {
                Some(q) => format!("{} considers \"{}\" and shrugs: \"Ask me after the vote.\"", first_name(request, 0), q),
                None => format!("{}: \"I know exactly where I stand. That is what scares me.\"", first_name(request, 0)),
            },
            NarrationKind::SchemingNote => format!(
                "{} quietly counts votes and keeps one name off the list.",
                first_name(request, 0)
            ),
            NarrationKind::AllianceHint => format!(
                "{} and {} shook on it behind the supply tent.",
                first_name(request, 0),
                first_name(request, 1)
            ),
            NarrationKind::SeasonLore => format!(
                "A season of {} rounds ends with {} holding the torch.",
                param(request, "rounds", "many"),
                param(request, "champion", "a survivor")
            ),
        };
        NarrationResponse::Text(text)
    }

    fn debate(&self, request: &NarrationRequest, rng: &mut SeededRng) -> Vec<DebateLine> {
        let speakers = &request.participants;
        if speakers.len() < 2 {
            return Vec::new();
        }
        let turns = speakers.len().min(4);
        let mut order: Vec<usize> = (0..speakers.len()).collect();
        rng.shuffle(&mut order);
        order
            .iter()
            .take(turns)
            .enumerate()
            .map(|(n, &i)| {
                let other = &speakers[order[(n + 1) % turns]].name;
                let template = rng.select(&DEBATE_TEMPLATES).copied().unwrap_or("...");
                DebateLine {
                    speaker: speakers[i].name.clone(),
                    line: template.replace("{other}", other),
                }
            })
            .collect()
    }
}

impl Narrator for TemplateNarrator {
    async fn generate(&self, request: &NarrationRequest) -> Result<NarrationResponse, NarrationError> {
        Ok(self.respond(request))
    }
}

/// The narrator selected by `[narration] mode`.
pub enum ConfiguredNarrator {
    Template(TemplateNarrator),
    Llm(llm::LlmNarrator),
}

impl ConfiguredNarrator {
    pub fn from_config(config: &NarrationConfig) -> Result<Self, NarrationError> {
        match config.mode.as_str() {
            "llm" => Ok(ConfiguredNarrator::Llm(llm::LlmNarrator::new(config.clone())?)),
            _ => Ok(ConfiguredNarrator::Template(TemplateNarrator)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfiguredNarrator::Template(_) => "template",
            ConfiguredNarrator::Llm(_) => "llm",
        }
    }
}

impl Narrator for ConfiguredNarrator {
    async fn generate(&self, request: &NarrationRequest) -> Result<NarrationResponse, NarrationError> {
        match self {
            ConfiguredNarrator::Template(n) => n.generate(request).await,
            ConfiguredNarrator::Llm(n) => n.generate(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants(names: &[&str]) -> Vec<Participant> {
        names
            .iter()
            .map(|n| Participant {
                id: n.to_lowercase(),
                name: n.to_string(),
            })
            .collect()
    }

    fn request(kind: NarrationKind, names: &[&str]) -> NarrationRequest {
        NarrationRequest {
            season_id: Uuid::nil(),
            request_id: 1,
            kind,
            round: 2,
            seed: 77,
            participants: participants(names),
            params: BTreeMap::new(),
            estimated_tokens: kind.estimated_tokens(),
            max_line_chars: 160,
        }
    }

    #[test]
    fn budget_guard_refuses_over_budget() {
        let guard = BudgetGuard { budget: 300, spent: 250 };
        assert_eq!(guard.remaining(), 50);
        assert!(guard.admit(50).is_ok());
        assert!(matches!(guard.admit(51), Err(NarrationError::Refused(_))));
    }

    #[test]
    fn debate_sanitizing_drops_strangers_and_truncates() {
        let lines = vec![
            DebateLine { speaker: "Mara".into(), line: "x".repeat(300) },
            DebateLine { speaker: "Stranger".into(), line: "I should not be here".into() },
            DebateLine { speaker: "dax".into(), line: "   ".into() },
            DebateLine { speaker: "DAX".into(), line: " Fine by me. ".into() },
        ];
        let turns = sanitize_debate(&lines, &participants(&["Mara", "Dax"]), 160);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker_id, "mara");
        assert_eq!(turns[0].line.chars().count(), 160);
        assert_eq!(turns[1].speaker_id, "dax");
        assert_eq!(turns[1].line, "Fine by me.");
    }

    #[test]
    fn parse_debate_rows() {
        let text = "Mara: I trust nobody.\n\n- **Dax**: \"Then trust this.\"\nstage direction";
        let lines = parse_debate_text(text);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].speaker, "Dax");
        assert_eq!(lines[1].line, "Then trust this.");
    }

    #[test]
    fn template_narrator_is_seeded() {
        let narrator = TemplateNarrator;
        let req = request(NarrationKind::TribunalDebate, &["Mara", "Dax", "Ines", "Tobi", "Wren"]);
        let a = narrator.respond(&req);
        let b = narrator.respond(&req);
        assert_eq!(a, b);
        match a {
            NarrationResponse::Lines(lines) => {
                assert_eq!(lines.len(), 4);
                let turns = sanitize_debate(&lines, &req.participants, 160);
                assert_eq!(turns.len(), 4);
            }
            NarrationResponse::Text(_) => panic!("debate should produce lines"),
        }
    }

    #[test]
    fn template_narrator_needs_two_debaters() {
        let narrator = TemplateNarrator;
        let req = request(NarrationKind::TribunalDebate, &["Mara"]);
        assert_eq!(narrator.respond(&req), NarrationResponse::Lines(vec![]));
    }

    #[tokio::test]
    async fn template_narrator_answers_host_lines() {
        let narrator = TemplateNarrator;
        let mut req = request(NarrationKind::EliminationSendoff, &[]);
        req.params.insert("eliminated".into(), "Tobi".into());
        match narrator.generate(&req).await.unwrap() {
            NarrationResponse::Text(t) => assert!(t.contains("Tobi")),
            NarrationResponse::Lines(_) => panic!("host line should be text"),
        }
    }

    #[tokio::test]
    async fn configured_narrator_follows_mode() {
        let narrator = ConfiguredNarrator::from_config(&NarrationConfig::default()).unwrap();
        assert_eq!(narrator.label(), "template");
        let req = request(NarrationKind::RoundIntro, &[]);
        assert!(matches!(narrator.generate(&req).await, Ok(NarrationResponse::Text(_))));

        let config = NarrationConfig {
            mode: "llm".to_string(),
            ..NarrationConfig::default()
        };
        assert_eq!(ConfiguredNarrator::from_config(&config).unwrap().label(), "llm");
    }

    #[test]
    fn materializable_entries_have_costs() {
        assert_eq!(estimated_entry_cost(LogKind::Confessional), 220);
        assert_eq!(estimated_entry_cost(LogKind::VoteCast), 0);
        assert_eq!(NarrationKind::for_entry(LogKind::Scheming), Some(NarrationKind::SchemingNote));
    }
}
