use crate::game::GameSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Host-controlled lobby configuration, broadcast to every guest on change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LobbySettings {
    /// When true, new joiners wait in a pending queue until the host
    /// approves or denies them.
    #[serde(default)]
    pub requires_request: bool,

    /// Opaque per-game settings, keyed by game id. The core never interprets
    /// the values; they are handed to the selected game adapter verbatim.
    #[serde(default)]
    pub game_settings: HashMap<String, GameSettings>,
}

impl LobbySettings {
    pub fn for_game(&self, game_id: &str) -> Option<&GameSettings> {
        self.game_settings.get(game_id)
    }
}
