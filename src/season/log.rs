use serde::{Deserialize, Serialize};

use crate::simulation::trial::TrialCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogKind {
    SeasonStart,
    RoundStart,
    HostLine,
    TrialAnnounced,
    TrialResult,
    AllianceFormed,
    AdvantageFound,
    Confessional,
    Scheming,
    CampDialogue,
    TribunalDebate,
    VoteCast,
    AdvantagePlayed,
    Elimination,
    NoElimination,
    Betrayal,
    JuryVote,
    Champion,
    BetPayout,
}

impl LogKind {
    /// Entries whose detail text can be generated on demand.
    pub fn is_materializable(&self) -> bool {
        matches!(
            self,
            LogKind::Confessional | LogKind::Scheming | LogKind::AllianceFormed
        )
    }
}

/// Lazily expandable detail text for a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Materialization {
    pub detail: Option<String>,
    pub estimated_cost: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub kind: LogKind,
    pub round: u32,
    /// Logical timestamp: the season tick the entry was written on.
    pub timestamp: u64,
    pub participants: Vec<String>,
    pub summary: String,
    pub seed: u64,
    pub materialization: Option<Materialization>,
    /// Viewer question attached to a confessional before materialization.
    pub question: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookmarkKind {
    Rivalry,
    Betrayal,
    CloseVote,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: u64,
    pub round: u32,
    pub kind: BookmarkKind,
    pub summary: String,
    pub log_entry_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: String,
    pub target_id: String,
    pub reasoning: String,
    /// Cast through an extra-vote advantage.
    pub extra: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter_id: String,
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u32,
    pub trial_name: String,
    pub trial_category: TrialCategory,
    pub trial_winners: Vec<String>,
    /// `None` when every vote was nullified or blocked.
    pub eliminated: Option<String>,
    /// Every vote cast this round, including nullified and blocked ones.
    pub votes: Vec<VoteRecord>,
    pub nullified_targets: Vec<String>,
    pub blocked_voters: Vec<String>,
}

impl RoundSummary {
    pub fn votes_against(&self, character_id: &str) -> usize {
        self.votes
            .iter()
            .filter(|v| v.target_id == character_id)
            .count()
    }
}

/// Mix a season seed and a log entry id into a per-entry seed.
pub fn entry_seed(season_seed: u64, entry_id: u64) -> u64 {
    season_seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(entry_id)
        .wrapping_mul(1442695040888963407)
        .rotate_left(17)
}
