mod lobby_code;
mod player;
mod settings;
mod token;

pub use lobby_code::{extract_code, normalize_code, CodeError, LobbyCode, CODE_ALPHABET, CODE_LEN};
pub use player::{Player, PlayerError, PlayerId, Roster, RosterError};
pub use settings::LobbySettings;
pub use token::SessionToken;
