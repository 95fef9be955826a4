pub mod match_code;
pub mod net;
pub mod player;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::player::{Player, PlayerId, Side};

    /// Create the two players of a test match.
    pub fn make_players() -> (Player, Player) {
        (
            Player {
                id: 1 as PlayerId,
                display_name: "Left".to_string(),
                side: Side::Left,
            },
            Player {
                id: 2 as PlayerId,
                display_name: "Right".to_string(),
                side: Side::Right,
            },
        )
    }
}
