//! Experience and level progression.
//!
//! Every qualifying completion grants a fixed amount of XP. Crossing the
//! threshold bumps the level and carries the surplus forward, so
//! `current_xp` always stays below `xp_to_next_level`.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::habit::Attribute;

/// Leveling tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelingConfig {
    #[serde(default = "default_xp_per_completion")]
    pub xp_per_completion: u32,
    /// XP needed per level
    #[serde(default = "default_xp_threshold")]
    pub xp_threshold: u32,
}

fn default_xp_per_completion() -> u32 {
    10
}
fn default_xp_threshold() -> u32 {
    100
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            xp_per_completion: default_xp_per_completion(),
            xp_threshold: default_xp_threshold(),
        }
    }
}

/// Per-attribute completion counters. Each has a floor of 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub strength: u32,
    pub intelligence: u32,
    pub wisdom: u32,
    pub discipline: u32,
    pub charisma: u32,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            strength: 1,
            intelligence: 1,
            wisdom: 1,
            discipline: 1,
            charisma: 1,
        }
    }
}

impl Attributes {
    pub fn get(&self, attribute: Attribute) -> u32 {
        match attribute {
            Attribute::Strength => self.strength,
            Attribute::Intelligence => self.intelligence,
            Attribute::Wisdom => self.wisdom,
            Attribute::Discipline => self.discipline,
            Attribute::Charisma => self.charisma,
        }
    }

    fn get_mut(&mut self, attribute: Attribute) -> &mut u32 {
        match attribute {
            Attribute::Strength => &mut self.strength,
            Attribute::Intelligence => &mut self.intelligence,
            Attribute::Wisdom => &mut self.wisdom,
            Attribute::Discipline => &mut self.discipline,
            Attribute::Charisma => &mut self.charisma,
        }
    }

    pub fn increment(&mut self, attribute: Attribute) {
        let counter = self.get_mut(attribute);
        *counter = counter.saturating_add(1);
    }
}

/// The single progression row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub level: u32,
    pub current_xp: u32,
    pub xp_to_next_level: u32,
    pub attributes: Attributes,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            level: 1,
            current_xp: 0,
            xp_to_next_level: default_xp_threshold(),
            attributes: Attributes::default(),
        }
    }
}

/// Result of a single award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardOutcome {
    pub leveled_up: bool,
    pub new_level: u32,
    pub current_xp: u32,
    pub xp_gained: u32,
    /// Levels gained by this award (0 or 1 with default tunables)
    pub levels_gained: u32,
}

/// Applies completion awards to [`UserProgress`].
#[derive(Debug, Clone)]
pub struct LevelingEngine {
    config: LevelingConfig,
}

impl LevelingEngine {
    pub fn new() -> Self {
        Self {
            config: LevelingConfig::default(),
        }
    }

    /// # Errors
    /// Returns a validation error if the threshold is zero.
    pub fn with_config(config: LevelingConfig) -> Result<Self, ValidationError> {
        if config.xp_threshold == 0 {
            return Err(ValidationError::InvalidValue {
                field: "leveling.xp_threshold".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &LevelingConfig {
        &self.config
    }

    /// Apply exactly one completion to `progress`.
    ///
    /// Overflow past the threshold is carried into the next level rather
    /// than discarded; the linked attribute is incremented whether or not a
    /// level-up happens.
    pub fn award_completion(
        &self,
        progress: &mut UserProgress,
        attribute: Option<Attribute>,
    ) -> AwardOutcome {
        let threshold = if progress.xp_to_next_level == 0 {
            self.config.xp_threshold
        } else {
            progress.xp_to_next_level
        };
        let gained = self.config.xp_per_completion;

        let mut xp = progress.current_xp.saturating_add(gained);
        let mut levels_gained = 0;
        while xp >= threshold {
            xp -= threshold;
            levels_gained += 1;
        }

        progress.level = progress.level.saturating_add(levels_gained);
        progress.current_xp = xp;
        progress.xp_to_next_level = threshold;

        if let Some(attribute) = attribute {
            progress.attributes.increment(attribute);
        }

        if levels_gained > 0 {
            tracing::info!(level = progress.level, "level up");
        }

        AwardOutcome {
            leveled_up: levels_gained > 0,
            new_level: progress.level,
            current_xp: progress.current_xp,
            xp_gained: gained,
            levels_gained,
        }
    }

    /// Fresh progression: level 1, no XP, every attribute at its floor.
    pub fn reset(&self) -> UserProgress {
        UserProgress {
            xp_to_next_level: self.config.xp_threshold,
            ..UserProgress::default()
        }
    }
}

impl Default for LevelingEngine {
    fn default() -> Self {
        Self::new()
    }
}
