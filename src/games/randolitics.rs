use super::{GameState, Validate};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use anyhow::{anyhow, Result};
use rand::Rng;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum Affiliation {
    Progressive, Conservative, Centrist,
}

const AFFILIATIONS: [Affiliation; 3] = [Affiliation::Progressive, Affiliation::Conservative, Affiliation::Centrist];

// Roster used when nobody is named on the command line
const DEFAULT_ROSTER: [(&str, Affiliation); 6] = [
    ("Alba", Affiliation::Conservative),
    ("Bruno", Affiliation::Progressive),
    ("Cyra", Affiliation::Progressive),
    ("Dario", Affiliation::Progressive),
    ("Elke", Affiliation::Progressive),
    ("Fenn", Affiliation::Centrist),
];

impl Affiliation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Progressive => "Progressive",
            Self::Conservative => "Conservative",
            Self::Centrist => "Centrist",
        }
    }

    // The canned message announced when someone of this affiliation takes the
    // role by winning a guessing round
    pub fn decree(&self) -> &'static str {
        match self {
            Self::Progressive => "tax the yachts",
            Self::Conservative => "cut the red tape",
            Self::Centrist => "form a committee",
        }
    }
}

impl fmt::Display for Affiliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

impl FromStr for Affiliation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        AFFILIATIONS
            .into_iter()
            .find(|a| a.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown affiliation '{}', expected one of: progressive, conservative, centrist", s))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Participant {
    pub name: String,
    pub affiliation: Affiliation,
    pub is_figurehead: bool,
    pub penalty_score: u32,
    pub is_eliminated: bool,
}

impl Participant {
    pub fn new(name: impl Into<String>, affiliation: Affiliation) -> Self {
        Self {
            name: name.into(),
            affiliation,
            is_figurehead: false,
            penalty_score: 0,
            is_eliminated: false,
        }
    }
}

// Parse `NAME:AFFILIATION`, as given to `--player`
impl FromStr for Participant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, affiliation) = s
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("Expected NAME:AFFILIATION, got '{}'", s))?;

        Ok(Participant::new(name.trim(), affiliation.parse()?))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct State {
    pub participants: Vec<Participant>,
    pub rounds: usize,
    // Index into `participants` of whoever holds the role
    pub figurehead: Option<usize>,
    pub last_outcome_tag: String,
}

impl State {
    pub fn new(participants: Vec<Participant>) -> Self {
        Self {
            participants,
            rounds: 0,
            figurehead: None,
            last_outcome_tag: String::new(),
        }
    }

    pub fn with_default_roster() -> Self {
        Self::new(DEFAULT_ROSTER.iter().map(|&(name, a)| Participant::new(name, a)).collect())
    }

    // Active participants in roster order, with their indices
    pub fn active(&self) -> impl Iterator<Item = (usize, &Participant)> {
        self.participants.iter().enumerate().filter(|(_i, p)| !p.is_eliminated)
    }

    pub fn figurehead(&self) -> Option<&Participant> {
        self.figurehead.map(|i| &self.participants[i])
    }
}

impl GameState for State {
    fn active_count(&self) -> usize {
        self.active().count()
    }
}

impl Validate for State {
    fn validate(&self) -> Result<()> {
        if self.participants.is_empty() {
            return Err(anyhow!("Roster is empty, at least one participant is needed"));
        }

        let mut seen = HashSet::new();
        for p in &self.participants {
            if p.name.trim().is_empty() {
                return Err(anyhow!("Participant names can't be blank"));
            }
            if !seen.insert(p.name.as_str()) {
                return Err(anyhow!("Participant name '{}' appears more than once", p.name));
            }
        }

        Ok(())
    }
}

/// How penalties are handed out in a correctness round.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, clap::ValueEnum)]
pub enum PenaltyRule {
    /// Every contender pays the distance between their guess and the target
    Always,
    /// Only contenders outside the figurehead's affiliation pay
    OpposedOnly,
}

/// The two rule sets the game is played with.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, clap::ValueEnum)]
pub enum Variant {
    /// Everyone is penalized and unresolved rounds are replayed
    Classic,
    /// Only the opposition is penalized and unresolved rounds just pass
    Partisan,
}

impl Variant {
    pub fn config(self) -> Config {
        let (penalty_rule, retry_on_ambiguous_round) = match self {
            Self::Classic => (PenaltyRule::Always, true),
            Self::Partisan => (PenaltyRule::OpposedOnly, false),
        };

        Config {
            guess_range_max: 9,
            elimination_threshold: 100,
            round_delay_ms: 1500,
            penalty_rule,
            retry_on_ambiguous_round,
            round_limit: None,
            variant: self,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Classic => "Randolitical Guessing Game",
            Self::Partisan => "Partisan Randolitical Guessing Game",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Config {
    pub guess_range_max: u32,
    pub elimination_threshold: u32,
    pub round_delay_ms: u64,
    pub penalty_rule: PenaltyRule,
    pub retry_on_ambiguous_round: bool,
    // Give up after this many guessing rounds. Needed since a roster where
    // nobody can be penalized any more never finishes.
    pub round_limit: Option<usize>,
    pub variant: Variant,
}

impl Default for Config {
    fn default() -> Self {
        Variant::Partisan.config()
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<()> {
        if self.guess_range_max == 0 {
            return Err(anyhow!("Guess range must allow more than one number, got 0..={}", self.guess_range_max));
        }
        if self.round_limit == Some(0) {
            return Err(anyhow!("Round limit has to be positive"));
        }

        Ok(())
    }
}

/// Source of the numbers drawn by the figurehead and the guessers.
pub trait Draw {
    /// Uniform integer in `0..=max`
    fn draw(&mut self, max: u32) -> u32;
}

pub struct RngDraw<R>(pub R);

impl<R: Rng> Draw for RngDraw<R> {
    fn draw(&mut self, max: u32) -> u32 {
        self.0.random_range(0..=max)
    }
}

/// Wall-clock pacing between rounds. Has no say in the outcome.
pub trait Pace {
    fn pause(&mut self, delay: Duration);
}

pub struct Sleep;

impl Pace for Sleep {
    fn pause(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

pub struct NoPause;

impl Pace for NoPause {
    fn pause(&mut self, _delay: Duration) {}
}

#[derive(Clone, Debug, Serialize)]
pub enum Event {
    RoundStarted { round: usize, target: u32 },
    Guessed { name: String, guess: u32 },
    Hit { name: String },
    Ambiguous { hits: usize },
    FigureheadAssigned { name: String, decree: String },
    CorrectnessStarted { figurehead: String, target: u32 },
    Penalized { name: String, difference: u32, score: u32 },
    Eliminated { name: String },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundStarted { round, target } => write!(f, "--- Round {} --- initial number: {}", round, target),
            Self::Guessed { name, guess } => write!(f, "{} guessed: {}", name, guess),
            Self::Hit { name } => write!(f, "{} guessed correctly!", name),
            Self::Ambiguous { hits: 0 } => write!(f, "No winners this round"),
            Self::Ambiguous { .. } => write!(f, "Multiple winners this round, it won't count"),
            Self::FigureheadAssigned { name, decree } => write!(f, "{} is now the figurehead! Decree: {}", name, decree),
            Self::CorrectnessStarted { figurehead, target } => write!(f, "--- Correctness check --- {} picked {}", figurehead, target),
            Self::Penalized { name, difference, score } => write!(f, "{} is off by {}, score now {}", name, difference, score),
            Self::Eliminated { name } => write!(f, "XXXX {} has been banned! XXXX", name),
        }
    }
}

pub struct Engine<D: Draw, P: Pace> {
    pub state: State,
    pub config: Config,
    draw: D,
    pace: P,
    events: Vec<Event>,
}

impl<D: Draw, P: Pace> Engine<D, P> {
    pub fn new(state: State, config: Config, draw: D, pace: P) -> Result<Self> {
        state.validate()?;
        config.validate()?;

        Ok(Self {
            state,
            config,
            draw,
            pace,
            events: Vec::new(),
        })
    }

    fn record(&mut self, event: Event) {
        match event {
            Event::Guessed { .. } | Event::Penalized { .. } => log::debug!("{}", event),
            _ => log::info!("{}", event),
        }
        self.events.push(event);
    }

    // Drain everything that happened since the last call
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // Guessing round. Everyone active guesses the target and a single correct
    // guesser takes the role. Returns the new figurehead, if any. With retries
    // enabled, unresolved rounds are replayed until somebody wins one.
    pub fn play_round(&mut self) -> Option<usize> {
        let max = self.config.guess_range_max;

        loop {
            self.state.rounds += 1;
            let target = self.draw.draw(max);
            self.record(Event::RoundStarted { round: self.state.rounds, target });

            let mut hits: Vec<usize> = Vec::new();
            for idx in 0..self.state.participants.len() {
                if self.state.participants[idx].is_eliminated {
                    continue;
                }

                let guess = self.draw.draw(max);
                let name = self.state.participants[idx].name.clone();
                self.record(Event::Guessed { name: name.clone(), guess });

                if guess == target {
                    self.record(Event::Hit { name });
                    hits.push(idx);
                }
            }

            if let [winner] = hits[..] {
                self.state.last_outcome_tag = self.state.participants[winner].affiliation.decree().to_string();
                self.assign_figurehead(winner);
                return Some(winner);
            }

            self.record(Event::Ambiguous { hits: hits.len() });

            if !self.config.retry_on_ambiguous_round || self.out_of_rounds() {
                return None;
            }
        }
    }

    // Hand the role to the given participant. The caller makes sure they are
    // still active.
    pub fn assign_figurehead(&mut self, idx: usize) {
        for p in self.state.participants.iter_mut() {
            p.is_figurehead = false;
        }
        self.state.participants[idx].is_figurehead = true;
        self.state.figurehead = Some(idx);

        self.record(Event::FigureheadAssigned {
            name: self.state.participants[idx].name.clone(),
            decree: self.state.last_outcome_tag.clone(),
        });
    }

    // The figurehead picks a number and everyone else is scored on how far off
    // they are. The first exact guess in roster order takes over the role.
    // Returns the new figurehead, if the role changed hands.
    //
    // Role and affiliation are looked up per participant, so after a handover
    // the outgoing figurehead guesses if they come later in the roster, and
    // exemptions follow the new figurehead for the rest of the pass.
    pub fn apply_correctness_round(&mut self) -> Option<usize> {
        let anchor = self.state.figurehead?;
        let max = self.config.guess_range_max;
        let threshold = self.config.elimination_threshold;

        let target = self.draw.draw(max);
        self.record(Event::CorrectnessStarted {
            figurehead: self.state.participants[anchor].name.clone(),
            target,
        });

        let mut successor: Option<usize> = None;
        for idx in 0..self.state.participants.len() {
            let current = &self.state.participants[idx];
            if current.is_eliminated || current.is_figurehead {
                continue;
            }

            let guess = self.draw.draw(max);
            let name = self.state.participants[idx].name.clone();
            self.record(Event::Guessed { name: name.clone(), guess });

            let difference = guess.abs_diff(target);
            let penalized = match (self.config.penalty_rule, self.state.figurehead()) {
                (PenaltyRule::Always, _) => true,
                (PenaltyRule::OpposedOnly, Some(fh)) => self.state.participants[idx].affiliation != fh.affiliation,
                (PenaltyRule::OpposedOnly, None) => true,
            };

            if penalized {
                let player = &mut self.state.participants[idx];
                player.penalty_score = player.penalty_score.saturating_add(difference);
                let score = player.penalty_score;
                self.record(Event::Penalized { name: name.clone(), difference, score });
            }

            if self.state.participants[idx].penalty_score > threshold {
                self.state.participants[idx].is_eliminated = true;
                self.record(Event::Eliminated { name });
            }

            if successor.is_none() && guess == target {
                self.assign_figurehead(idx);
                successor = Some(idx);
            }
        }

        successor
    }

    // One full round: guessing, then scoring against the figurehead
    pub fn step(&mut self) {
        self.play_round();
        self.apply_correctness_round();
    }

    // Play until at most one participant is left. `on_round` sees the state
    // and the events of every completed round.
    pub fn play_game(&mut self, mut on_round: impl FnMut(&State, &[Event])) -> Option<&Participant> {
        while !self.is_finished() {
            self.step();
            on_round(&self.state, &self.events);
            self.events.clear();
            self.pace.pause(Duration::from_millis(self.config.round_delay_ms));
        }

        if !self.state.is_game_over() {
            log::warn!("Stopping after {} rounds with {} participants still active", self.state.rounds, self.state.active_count());
        }

        self.winner()
    }

    // Game over, or out of rounds
    pub fn is_finished(&self) -> bool {
        self.state.is_game_over() || self.out_of_rounds()
    }

    fn out_of_rounds(&self) -> bool {
        self.config.round_limit.is_some_and(|limit| self.state.rounds >= limit)
    }

    pub fn winner(&self) -> Option<&Participant> {
        if self.state.active_count() == 1 {
            self.state.active().next().map(|(_i, p)| p)
        } else {
            None
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

// Render the current standings as a plain text table
pub fn status_table(state: &State, variant: Variant) -> String {
    let headers = ["Name", "Affiliation", "Figurehead", "Score", "Banned"];
    let rows: Vec<[String; 5]> = state.participants
        .iter()
        .map(|p| [
            p.name.clone(),
            p.affiliation.to_string(),
            yes_no(p.is_figurehead).to_string(),
            p.penalty_score.to_string(),
            yes_no(p.is_eliminated).to_string(),
        ])
        .collect();

    let mut widths = headers.map(|h| h.len());
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(&format!("{} | Round: {}", variant.title(), state.rounds));
    if let Some(fh) = state.figurehead() {
        out.push_str(&format!(" | Figurehead: {} ({})", fh.name, state.last_outcome_tag));
    }
    out.push('\n');

    let render = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<w$}", c, w = widths[i]))
            .collect();
        format!("| {} |\n", padded.join(" | "))
    };

    out.push_str(&render(headers.to_vec()));
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&format!("|-{}-|\n", rule.join("-|-")));
    for row in &rows {
        out.push_str(&render(row.iter().map(|c| c.as_str()).collect()));
    }

    out
}
