use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use rand::{rngs::StdRng, SeedableRng};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use games::randolitics::{self, Config, Engine, NoPause, Participant, PenaltyRule, RngDraw, Sleep, State, Variant};
use games::{GameState, Validate};
use tui::WatchApp;

mod games;
mod tui;

// Simulated games never pace, but a stuck one still has to end
const SIMULATION_ROUND_LIMIT: usize = 10_000;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a single game, printing the standings after every round
    Play {
        #[command(flatten)]
        game: GameArgs,
    },
    /// Play many games in parallel and report how often each participant wins
    Simulate {
        #[arg(short)]
        log_file: PathBuf,
        #[arg(short = 'n', long, default_value_t = 100)]
        n_games: usize,
        #[command(flatten)]
        game: GameArgs,
    },
    /// Step through a game round by round in the terminal
    Watch {
        #[command(flatten)]
        game: GameArgs,
    },
}

#[derive(clap::Args, Clone)]
struct GameArgs {
    /// Rule set the other options start from
    #[arg(long, value_enum, default_value_t = Variant::Partisan)]
    variant: Variant,
    /// Participant as NAME:AFFILIATION, repeat for every participant
    #[arg(long = "player")]
    players: Vec<Participant>,
    /// Largest number that can be drawn, draws are from 0 up to this
    #[arg(long)]
    range_max: Option<u32>,
    /// Penalty score above which a participant is banned
    #[arg(long)]
    threshold: Option<u32>,
    /// Pause between rounds
    #[arg(long)]
    delay_ms: Option<u64>,
    #[arg(long, value_enum)]
    rule: Option<PenaltyRule>,
    /// Replay guessing rounds that have no single winner
    #[arg(long)]
    retry: Option<bool>,
    #[arg(long)]
    round_limit: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
}

impl GameArgs {
    fn config(&self) -> Config {
        let base = self.variant.config();

        Config {
            guess_range_max: self.range_max.unwrap_or(base.guess_range_max),
            elimination_threshold: self.threshold.unwrap_or(base.elimination_threshold),
            round_delay_ms: self.delay_ms.unwrap_or(base.round_delay_ms),
            penalty_rule: self.rule.unwrap_or(base.penalty_rule),
            retry_on_ambiguous_round: self.retry.unwrap_or(base.retry_on_ambiguous_round),
            round_limit: self.round_limit.or(base.round_limit),
            variant: self.variant,
        }
    }

    fn state(&self) -> State {
        if self.players.is_empty() {
            State::with_default_roster()
        } else {
            State::new(self.players.clone())
        }
    }

    fn rng(&self, offset: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(offset)),
            None => StdRng::from_os_rng(),
        }
    }
}

// One round in the game log, the state is serialized json and not a nested
// object so rows stay flat
#[derive(Debug, Clone, serde::Serialize)]
struct PlayLogRound {
    game_id: usize,
    round_id: usize,
    figurehead: Option<String>,
    outcome_tag: String,
    active: usize,
    events: Vec<String>,
    state: String,
}

type PlayLog = Vec<PlayLogRound>;

fn write_play_log(play_log: &PlayLog, file: &PathBuf) -> Result<()> {
    let handle = File::create(file).with_context(|| format!("Failed to create play log {}", file.display()))?;
    let mut writer = BufWriter::new(handle);
    for item in play_log {
        jsonl::write(&mut writer, item).map_err(|err| anyhow!("Failed to write play log: {:?}", err))?;
    }

    Ok(())
}

fn report(game_log: &[Option<String>], roster: &[Participant]) {
    let mut win_counts: HashMap<&str, usize> = HashMap::from_iter(roster.iter().map(|p| (p.name.as_str(), 0)));
    let total_games = game_log.len();
    let mut no_winner = 0;

    for winner in game_log {
        match winner.as_deref().and_then(|name| win_counts.get_mut(name)) {
            Some(count) => *count += 1,
            None => no_winner += 1,
        }
    }

    for p in roster {
        let wins = win_counts[p.name.as_str()];
        println!("Win Count for {} ({}): {}/{}, ratio: {}", p.name, p.affiliation, wins, total_games, (wins as f64 / total_games as f64));
    }
    println!("No winner: {}/{}", no_winner, total_games);
}

fn play(game: &GameArgs) -> Result<()> {
    let config = game.config();
    let variant = config.variant;
    let mut engine = Engine::new(game.state(), config, RngDraw(game.rng(0)), Sleep)?;

    println!("Game started!");
    println!("{}", randolitics::status_table(&engine.state, variant));

    let winner = engine.play_game(|state, _events| {
        println!("{}", randolitics::status_table(state, variant));
    });

    match winner {
        Some(p) => println!("The winner is {}", p.name),
        None => println!("No winner"),
    }

    Ok(())
}

fn simulate(game: &GameArgs, log_file: &PathBuf, n_games: usize) -> Result<()> {
    if n_games == 0 {
        bail!("Number of games has to be positive");
    }

    let mut config = game.config();
    config.round_limit = config.round_limit.or(Some(SIMULATION_ROUND_LIMIT));
    let roster = game.state();
    roster.validate()?;
    config.validate()?;

    log::info!("Running {} simulations for {} participants", n_games, roster.participants.len());

    let play_log: Arc<Mutex<PlayLog>> = Arc::new(Mutex::new(Vec::new()));

    let game_log: Vec<Option<String>> = (0..n_games).into_par_iter().map(|game_idx| -> Result<Option<String>> {
        let draw = RngDraw(game.rng(game_idx as u64));
        let mut engine = Engine::new(roster.clone(), config.clone(), draw, NoPause)?;

        let mut rounds: Vec<(State, Vec<String>)> = Vec::new();
        let winner = engine
            .play_game(|state, events| {
                rounds.push((state.clone(), events.iter().map(|e| e.to_string()).collect()));
            })
            .map(|p| p.name.clone());

        let mut entries = Vec::with_capacity(rounds.len());
        for (state, events) in rounds {
            entries.push(PlayLogRound {
                game_id: game_idx,
                round_id: state.rounds,
                figurehead: state.figurehead().map(|p| p.name.clone()),
                outcome_tag: state.last_outcome_tag.clone(),
                active: state.active_count(),
                events,
                state: serde_json::to_string(&state)?,
            });
        }

        play_log
            .lock()
            .map_err(|_| anyhow!("Play log lock poisoned"))?
            .extend(entries);

        match &winner {
            Some(name) => log::info!("Game {}: winner is {} after {} rounds", game_idx, name, engine.state.rounds),
            None => log::info!("Game {}: no winner after {} rounds", game_idx, engine.state.rounds),
        }

        Ok(winner)
    }).collect::<Result<_>>()?;

    report(&game_log, &roster.participants);

    let mut play_log = play_log.lock().map_err(|_| anyhow!("Play log lock poisoned"))?.to_vec();
    play_log.sort_by_key(|r| (r.game_id, r.round_id));
    write_play_log(&play_log, log_file)
}

fn run_watch(game: &GameArgs) -> Result<()> {
    color_eyre::install().map_err(|err| anyhow!("{}", err))?;

    let config = game.config();
    let variant = config.variant;
    let mut engine = Engine::new(game.state(), config, RngDraw(game.rng(0)), NoPause)?;
    let mut app = WatchApp::new(variant, engine.state.clone());

    let mut terminal = ratatui::init();
    let result = watch_loop(&mut terminal, &mut engine, &mut app);
    ratatui::restore();

    result
}

fn watch_loop(terminal: &mut ratatui::DefaultTerminal, engine: &mut Engine<RngDraw<StdRng>, NoPause>, app: &mut WatchApp) -> Result<()> {
    loop {
        terminal.draw(|frame| {
            frame.render_widget(app.clone(), frame.area());
        })?;

        if let Event::Key(key_event) = event::read()? {
            if key_event.kind != KeyEventKind::Press {
                continue;
            }

            match key_event.code {
                KeyCode::Char('q') => break,
                KeyCode::Char(' ') => {
                    if engine.is_finished() {
                        continue;
                    }

                    engine.step();
                    let mut lines: Vec<String> = engine.take_events().iter().map(|e| e.to_string()).collect();
                    if engine.is_finished() {
                        lines.push(match engine.winner() {
                            Some(p) => format!("The winner is {}", p.name),
                            None => "No winner".to_string(),
                        });
                    }
                    app.update(&engine.state, lines, engine.is_finished());
                },
                _ => {}
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.commands {
        Commands::Play { game } => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
            play(&game)
        },
        Commands::Simulate { log_file, n_games, game } => {
            env_logger::init();
            simulate(&game, &log_file, n_games)
        },
        Commands::Watch { game } => {
            env_logger::init();
            run_watch(&game)
        },
    }
}
