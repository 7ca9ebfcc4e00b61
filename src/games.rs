use anyhow::Result;

pub mod randolitics;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

// A game state for elimination games with n players. Players drop out over
// many rounds until at most one of them is left standing.
pub trait GameState {
    // Number of players not yet eliminated
    fn active_count(&self) -> usize;

    // Tell if the game is over. A game that starts with a single player is
    // over before the first round.
    fn is_game_over(&self) -> bool {
        self.active_count() <= 1
    }
}
