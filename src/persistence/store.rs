//! Owned collection of seasons keyed by id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::roster::CastMember;
use crate::config::rules::GameRules;
use crate::narration::{NarrationError, NarrationResponse};
use crate::season::{Season, SeasonError, SeasonSettings, start_season};
use crate::simulation::{SideEffect, deliver_narration};

/// Version written into every export document.
pub const EXPORT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ExportDocument {
    version: u32,
    season: Season,
}

#[derive(Debug)]
pub enum ImportError {
    Parse(String),
    UnsupportedVersion(u32),
    Invalid(String),
    DuplicateSeason(Uuid),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Parse(e) => write!(f, "Not a season document: {}", e),
            ImportError::UnsupportedVersion(v) => write!(
                f,
                "Season document version {} is not supported (expected {})",
                v, EXPORT_VERSION
            ),
            ImportError::Invalid(e) => write!(f, "Season document failed validation:\n{}", e),
            ImportError::DuplicateSeason(id) => write!(f, "Season {} already exists", id),
        }
    }
}

impl std::error::Error for ImportError {}

#[derive(Debug, Default)]
pub struct SeasonStore {
    seasons: BTreeMap<Uuid, Season>,
}

impl SeasonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_season(
        &mut self,
        cast: &[CastMember],
        seed: u64,
        opening_bet: Option<&str>,
        host_id: &str,
        settings: SeasonSettings,
        rules: GameRules,
    ) -> Result<Uuid, SeasonError> {
        let season = start_season(cast, seed, opening_bet, host_id, settings, rules)?;
        let id = season.id;
        info!(season = %id, seed, "Season started");
        self.seasons.insert(id, season);
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Season> {
        self.seasons.get(&id)
    }

    /// Run `f` on a working copy and commit it only when `f` succeeds.
    /// Returns `None` for an unknown id.
    pub fn update_season<T, E>(
        &mut self,
        id: Uuid,
        f: impl FnOnce(&mut Season) -> Result<T, E>,
    ) -> Option<Result<T, E>> {
        let current = self.seasons.get(&id)?;
        let mut working = current.clone();
        let result = f(&mut working);
        if result.is_ok() {
            self.seasons.insert(id, working);
        }
        Some(result)
    }

    pub fn list_seasons(&self) -> Vec<&Season> {
        self.seasons.values().collect()
    }

    pub fn delete_season(&mut self, id: Uuid) -> Option<Season> {
        let removed = self.seasons.remove(&id);
        if removed.is_some() {
            info!(season = %id, "Season deleted");
        }
        removed
    }

    /// Versioned JSON document of the full season, transient state included.
    pub fn export_season(&self, id: Uuid) -> Option<Result<String, serde_json::Error>> {
        let season = self.seasons.get(&id)?;
        Some(export_season(season))
    }

    /// Validate a document and install it. On any error nothing changes.
    pub fn import_season(&mut self, json: &str) -> Result<Uuid, ImportError> {
        let season = parse_export(json)?;
        if self.seasons.contains_key(&season.id) {
            return Err(ImportError::DuplicateSeason(season.id));
        }
        let id = season.id;
        info!(season = %id, round = season.round, "Season imported");
        self.seasons.insert(id, season);
        Ok(id)
    }

    /// Route a narration result to its season. Results for deleted seasons
    /// are dropped; returns whether a season took it.
    pub fn deliver_to_store(
        &mut self,
        season_id: Uuid,
        request_id: u64,
        result: Result<NarrationResponse, NarrationError>,
    ) -> Option<Vec<SideEffect>> {
        match self.seasons.get_mut(&season_id) {
            Some(season) => Some(deliver_narration(season, request_id, result)),
            None => {
                debug!(season = %season_id, request_id, "Dropping narration for a missing season");
                None
            }
        }
    }
}

pub fn export_season(season: &Season) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ExportDocument {
        version: EXPORT_VERSION,
        season: season.clone(),
    })
}

/// Parse and validate an export document without installing it.
pub fn parse_export(json: &str) -> Result<Season, ImportError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ImportError::Parse(e.to_string()))?;
    let version = value
        .get("version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ImportError::Parse("missing version".to_string()))?;
    if version != EXPORT_VERSION as u64 {
        return Err(ImportError::UnsupportedVersion(version as u32));
    }
    let doc: ExportDocument =
        serde_json::from_value(value).map_err(|e| ImportError::Parse(e.to_string()))?;
    doc.season.check_integrity().map_err(ImportError::Invalid)?;
    Ok(doc.season)
}
