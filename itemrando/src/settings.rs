use itemrando_game::{Capacity, TrickLevel};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RandomizerSettings {
    pub seed: usize,
    pub max_attempts: usize,
    pub max_retries_per_attempt: usize,
    pub trick_settings: Vec<TrickSetting>,
    pub starting_items: Vec<StartingItem>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrickSetting {
    pub name: String,
    pub level: TrickLevel,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StartingItem {
    pub name: String,
    pub count: Capacity,
}

impl Default for RandomizerSettings {
    fn default() -> Self {
        RandomizerSettings {
            seed: 0,
            max_attempts: 100,
            max_retries_per_attempt: 50,
            trick_settings: vec![],
            starting_items: vec![],
        }
    }
}
