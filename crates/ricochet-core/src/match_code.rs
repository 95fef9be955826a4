use rand::Rng;
use serde::{Deserialize, Serialize};

/// Characters used in match codes. Ambiguous glyphs (0/O, 1/I) are excluded.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a match code of the form `XXXX-XXXX`.
pub fn generate_match_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut code = String::with_capacity(9);
    for i in 0..8 {
        if i == 4 {
            code.push('-');
        }
        let idx = rng.random_range(0..CODE_ALPHABET.len());
        code.push(CODE_ALPHABET[idx] as char);
    }
    code
}

/// Validate the `XXXX-XXXX` match code shape without allocating.
pub fn is_valid_match_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    if bytes.len() != 9 || bytes[4] != b'-' {
        return false;
    }
    bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 4 || CODE_ALPHABET.contains(b))
}

/// Lifecycle phase of a match as seen by the lobby layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPhase {
    Waiting,
    InGame,
    Finished,
}
