use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Code alphabet: uppercase letters and digits minus the visually ambiguous
/// `I O 0 1`. 32 symbols, so one random byte modulo 32 is exactly uniform.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a lobby code in symbols.
pub const CODE_LEN: usize = 6;

/// Errors produced when parsing lobby codes.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CodeError {
    #[error("lobby code must be exactly {CODE_LEN} characters, got {0}")]
    WrongLength(usize),

    #[error("lobby code contains invalid character {0:?}")]
    InvalidChar(char),
}

/// A human-shareable 6-character lobby identifier, always stored canonical
/// (uppercase, trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LobbyCode(String);

impl LobbyCode {
    /// Generate a fresh random code.
    pub fn generate() -> Self {
        let entropy = Uuid::new_v4();
        let code: String = entropy.as_bytes()[..CODE_LEN]
            .iter()
            .map(|b| CODE_ALPHABET[(b % 32) as usize] as char)
            .collect();
        Self(code)
    }

    /// Normalize and validate user input into a code.
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let normalized = normalize_code(input);
        let len = normalized.chars().count();
        if len != CODE_LEN {
            return Err(CodeError::WrongLength(len));
        }
        for c in normalized.chars() {
            if !c.is_ascii() || !CODE_ALPHABET.contains(&(c as u8)) {
                return Err(CodeError::InvalidChar(c));
            }
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a shareable join link for this code.
    pub fn join_url(&self, base: &str) -> String {
        format!("{}?code={}", base, self.0)
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LobbyCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        LobbyCode::parse(&value)
    }
}

impl From<LobbyCode> for String {
    fn from(code: LobbyCode) -> Self {
        code.0
    }
}

/// Uppercase and trim user input. Idempotent.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_uppercase()
}

/// Pull a lobby code out of a pasted URL or free-form text.
///
/// Preference order: a `code` query parameter, then a format-matching last
/// path segment, then the last six alphanumerics of the cleaned input.
pub fn extract_code(input: &str) -> Option<LobbyCode> {
    let cleaned = normalize_code(input);
    if cleaned.is_empty() {
        return None;
    }

    if let Some(code) = query_param_code(&cleaned) {
        return Some(code);
    }

    if let Some(code) = last_path_segment_code(&cleaned) {
        return Some(code);
    }

    let alnum: String = cleaned.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if alnum.len() < CODE_LEN {
        return None;
    }
    LobbyCode::parse(&alnum[alnum.len() - CODE_LEN..]).ok()
}

fn query_param_code(cleaned: &str) -> Option<LobbyCode> {
    let (_, query) = cleaned.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("CODE=") {
            return LobbyCode::parse(value).ok();
        }
    }
    None
}

fn last_path_segment_code(cleaned: &str) -> Option<LobbyCode> {
    let path = cleaned.split(['?', '#']).next()?;
    let segment = path.split('/').rev().find(|s| !s.is_empty())?;
    LobbyCode::parse(segment).ok()
}
