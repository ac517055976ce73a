use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::season::dossier::{Archetype, Traits};
use crate::simulation::rng::SeededRng;

/// One cast member as supplied by the roster. Copied into a dossier when the
/// season starts and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub id: String,
    pub name: String,
    pub archetype: Archetype,
    pub traits: Traits,
}

/// Everything needed to start a season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    pub seed: u64,
    pub host: String,
    #[serde(default)]
    pub opening_bet: Option<String>,
    pub cast: Vec<CastMember>,
}

const SAMPLE_NAMES: [&str; 12] = [
    "Mara", "Dax", "Ines", "Tobi", "Wren", "Kofi", "Lux", "Perrin", "Sable", "Juno", "Odile",
    "Rafe",
];

impl Roster {
    /// Load a roster from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let roster: Self = toml::from_str(content)
            .map_err(|e| format!("Invalid TOML in {}: {}", source_path.display(), e))?;
        roster.validate()?;
        Ok(roster)
    }

    /// Shape checks that do not depend on game rules. Cast size is checked
    /// when the season starts.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("host must not be empty".to_string());
        }
        for (i, member) in self.cast.iter().enumerate() {
            if member.id.trim().is_empty() {
                errors.push(format!("cast[{}].id must not be empty", i));
            }
            if self.cast[..i].iter().any(|m| m.id == member.id) {
                errors.push(format!("cast[{}].id '{}' is a duplicate", i, member.id));
            }
            if member.id == self.host {
                errors.push(format!("host '{}' must not be in the cast", self.host));
            }
            if !member.traits.is_valid() {
                errors.push(format!(
                    "cast[{}] '{}' traits must all be 0.0-1.0",
                    i, member.id
                ));
            }
        }
        if let Some(bet) = &self.opening_bet
            && !self.cast.iter().any(|m| &m.id == bet)
        {
            errors.push(format!("opening_bet '{}' is not a cast member", bet));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }

    /// A seeded twelve-person roster for demos and tests.
    pub fn sample(seed: u64) -> Self {
        let mut rng = SeededRng::new(seed, 0);
        let archetypes = Archetype::all();
        let cast = SAMPLE_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let archetype = archetypes[i % archetypes.len()];
                let traits = Traits {
                    logic: rng.next(),
                    endurance: rng.next(),
                    persuasion: rng.next(),
                    chaos: rng.next(),
                    creative: rng.next(),
                };
                CastMember {
                    id: name.to_lowercase(),
                    name: name.to_string(),
                    archetype,
                    traits,
                }
            })
            .collect();
        Roster {
            seed,
            host: "host".to_string(),
            opening_bet: None,
            cast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn member_toml(id: &str, archetype: &str) -> String {
        format!(
            r#"
            [[cast]]
            id = "{id}"
            name = "{id}"
            archetype = "{archetype}"
            traits = {{ logic = 0.5, endurance = 0.4, persuasion = 0.6, chaos = 0.1, creative = 0.9 }}
            "#
        )
    }

    #[test]
    fn sample_roster_is_valid_and_reproducible() {
        let a = Roster::sample(7);
        let b = Roster::sample(7);
        assert_eq!(a, b);
        assert_eq!(a.cast.len(), 12);
        assert!(a.validate().is_ok());
        assert_ne!(Roster::sample(8).cast[0].traits, a.cast[0].traits);
    }

    #[test]
    fn toml_roster_loads() {
        let mut toml = "seed = 99\nhost = \"emcee\"\nopening_bet = \"a\"\n".to_string();
        toml.push_str(&member_toml("a", "Strategist"));
        toml.push_str(&member_toml("b", "Loyalist"));
        let roster = Roster::from_toml_str(&toml, &PathBuf::from("roster.toml")).unwrap();
        assert_eq!(roster.seed, 99);
        assert_eq!(roster.cast.len(), 2);
        assert_eq!(roster.cast[1].archetype, Archetype::Loyalist);
        assert_eq!(roster.opening_bet.as_deref(), Some("a"));
    }

    #[test]
    fn invalid_roster_reports_every_problem() {
        let mut roster = Roster::sample(1);
        roster.cast[1].id = roster.cast[0].id.clone();
        roster.cast[2].traits.chaos = 1.5;
        roster.host = roster.cast[3].id.clone();
        roster.opening_bet = Some("nobody".to_string());
        let err = roster.validate().unwrap_err();
        assert!(err.contains("duplicate"));
        assert!(err.contains("traits"));
        assert!(err.contains("must not be in the cast"));
        assert!(err.contains("opening_bet"));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "seed = 1\nhost = \"h\"\n{}", member_toml("a", "Wildcard")).unwrap();
        let roster = Roster::from_file(tmp.path()).unwrap();
        assert_eq!(roster.cast[0].archetype, Archetype::Wildcard);
    }

    #[test]
    fn unknown_archetype_rejected() {
        let toml = format!("seed = 1\nhost = \"h\"\n{}", member_toml("a", "Villain"));
        let err = Roster::from_toml_str(&toml, &PathBuf::from("r.toml")).unwrap_err();
        assert!(err.contains("r.toml"));
    }
}
