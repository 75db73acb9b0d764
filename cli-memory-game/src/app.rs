use anyhow::Result;
use colored::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use chessflip::{
    ChessFlipError, FlipEffect, GameInstance, GameOutcome, InMemoryLedger, PlayerClient,
    Resolution,
};

use crate::config::{AppConfig, ReplConfig};
use crate::repl::{GameStatus, ReplCommand, ReplInterface};
use crate::session::Session;

const BOARD_COLUMNS: usize = 4;

pub struct GameApp {
    config: AppConfig,
    session: Session<InMemoryLedger>,
    username: Option<String>,
    command_receiver: mpsc::UnboundedReceiver<ReplCommand>,
    status_sender: mpsc::UnboundedSender<GameStatus>,
}

impl GameApp {
    pub fn new(config: AppConfig) -> Result<Self> {
        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let (status_sender, status_receiver) = mpsc::unbounded_channel();

        let ledger = Arc::new(InMemoryLedger::from_config(&config.chessflip));
        let session = Session::new(PlayerClient::new(ledger, config.chessflip.clone()));

        // rustyline blocks, so the REPL gets its own thread
        let mut repl = ReplInterface::new(command_sender, status_receiver, ReplConfig::default())?;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = repl.run() {
                eprintln!("REPL error: {}", e);
            }
        });

        Ok(Self {
            config,
            session,
            username: None,
            command_receiver,
            status_sender,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let game = &self.config.chessflip.game;
        println!(
            "Board: {} pairs | Lives: {} | Rewards: {} win / {} loss",
            game.pair_count, game.max_lives, game.win_points, game.loss_points
        );

        while let Some(command) = self.command_receiver.recv().await {
            debug!(?command, "Handling command");
            self.handle(command).await;

            if self.status_sender.send(self.status()).is_err() {
                break;
            }
        }

        Ok(())
    }

    async fn handle(&mut self, command: ReplCommand) {
        match command {
            ReplCommand::Register { username } => self.register(username).await,
            ReplCommand::Profile => self.show_profile().await,
            ReplCommand::Start => self.start().await,
            ReplCommand::Flip { card_id } => self.flip(card_id).await,
            ReplCommand::Board => match self.session.game() {
                Some(game) => render_board(&game.machine.snapshot()),
                None => println!("{}", "No game in progress. Type 'start' to play.".yellow()),
            },
            ReplCommand::Forfeit => self.forfeit().await,
            ReplCommand::Settle => self.settle().await,
            ReplCommand::Retry => self.retry().await,
            ReplCommand::Abandon => match self.session.abandon() {
                Ok(game_id) => println!("{}", format!("Game {} abandoned.", game_id).yellow()),
                Err(e) => eprintln!("{}", format!("❌ {}", e).red()),
            },
            ReplCommand::Status => {
                for record in self.session.client().coordinator().unsettled() {
                    println!(
                        "Game {}: {} ({} points), next step: {}",
                        record.game_id,
                        record.outcome,
                        record.reward_points,
                        record
                            .phase
                            .next_step()
                            .map_or("none".to_string(), |s| s.to_string())
                    );
                }
            }
            ReplCommand::Help => print_help(),
            ReplCommand::Quit => {}
        }
    }

    async fn register(&mut self, username: String) {
        match self.session.register(&username).await {
            Ok(profile_id) => {
                println!("{} {} ({})", "✅ Registered".green(), username.bold(), profile_id);
                self.username = Some(username);
            }
            Err(e) => eprintln!("{}", format!("❌ Registration failed: {}", e).red()),
        }
    }

    async fn start(&mut self) {
        let cost = self.config.chessflip.ledger.game_cost;
        match self.session.start().await {
            Ok(game) => {
                println!(
                    "{} (paid {} MIST)",
                    format!("🎲 New game {}", game.game_id).bright_blue(),
                    cost
                );
                render_board(&game.machine.snapshot());
            }
            Err(e) => eprintln!("{}", format!("❌ Could not start game: {}", e).red()),
        }
    }

    async fn flip(&mut self, card_id: usize) {
        let Some(game) = self.session.game() else {
            println!("{}", "No game in progress. Type 'start' to play.".yellow());
            return;
        };

        let mut updates = game.machine.subscribe();
        match game.machine.flip_card(card_id) {
            FlipEffect::Ignored => {
                println!("{}", format!("Card {} can't be flipped right now.", card_id).yellow());
                return;
            }
            FlipEffect::Selected => {
                render_board(&game.machine.snapshot());
                return;
            }
            FlipEffect::Resolving(resolution) => {
                render_board(&game.machine.snapshot());
                match resolution {
                    Resolution::Match => println!("{}", "Match!".green().bold()),
                    Resolution::Mismatch => println!("{}", "No match.".red()),
                }
            }
        }

        if let Err(e) = updates.wait_for(|state| !state.is_locked()).await {
            warn!(error = %e, "Game update channel closed");
            return;
        }
        render_board(&game.machine.snapshot());

        if let Some(outcome) = game.machine.outcome() {
            print_summary(&outcome);
            if self.config.auto_settle {
                self.settle().await;
            }
        }
    }

    async fn forfeit(&mut self) {
        match self.session.forfeit() {
            Ok(outcome) => print_summary(&outcome),
            Err(e) => {
                println!("{}", e.to_string().yellow());
                return;
            }
        }
        if self.config.auto_settle {
            self.settle().await;
        }
    }

    async fn settle(&mut self) {
        match self.session.settle().await {
            Ok(record) => println!(
                "{}",
                format!("💰 Settled: {} points credited", record.reward_points).green()
            ),
            Err(e) => {
                eprintln!("{}", format!("❌ Settlement failed: {}", e).red());
                let resumable = e
                    .downcast_ref::<ChessFlipError>()
                    .is_some_and(|e| e.is_retryable() || e.failed_step().is_some());
                if resumable {
                    println!("{}", "Progress is saved. Type 'retry' to continue.".dimmed());
                }
            }
        }
    }

    async fn retry(&mut self) {
        match self.session.retry().await {
            Ok(records) => {
                for record in records {
                    println!(
                        "{}",
                        format!(
                            "💰 Game {} settled: {} points credited",
                            record.game_id, record.reward_points
                        )
                        .green()
                    );
                }
            }
            Err(e) => eprintln!("{}", format!("❌ Retry failed: {}", e).red()),
        }
    }

    async fn show_profile(&self) {
        match self.session.client().profile().await {
            Ok(Some(profile)) => {
                println!("{}", profile.username.bold());
                println!("  Points:   {}", profile.total_points.to_string().yellow());
                println!("  Games:    {}", profile.total_games);
                println!("  Record:   {}", profile.record());
                println!("  Win rate: {:.1}%", profile.win_rate());
            }
            Ok(None) => println!("{}", "Profile not found on the ledger.".yellow()),
            Err(e) => eprintln!("{}", format!("❌ {}", e).red()),
        }
    }

    fn status(&self) -> GameStatus {
        let snapshot = self.session.game().map(|g| g.machine.snapshot());
        let current_status = match &snapshot {
            None if self.session.client().profile_id().is_none() => "Not registered".to_string(),
            None => "Idle".to_string(),
            Some(state) => format!("{:?}", state.phase()),
        };

        GameStatus {
            current_status,
            username: self.username.clone(),
            lives: snapshot.as_ref().map(|s| (s.lives_remaining(), s.max_lives())),
            matched: snapshot.as_ref().map(|s| (s.matched_pairs(), s.pair_count())),
            unsettled: self.session.client().coordinator().unsettled().len(),
        }
    }
}

fn render_board(state: &GameInstance) {
    println!();
    for row in state.cards().chunks(BOARD_COLUMNS) {
        let line: Vec<String> = row
            .iter()
            .map(|card| {
                if card.is_matched {
                    format!(" {} ", card.symbol.symbol()).green().to_string()
                } else if state.is_face_up(card.id) {
                    format!(" {} ", card.symbol.symbol()).yellow().bold().to_string()
                } else {
                    format!("[{:>2}]", card.id).dimmed().to_string()
                }
            })
            .collect();
        println!("  {}", line.join("  "));
    }

    let hearts = "♥".repeat(state.lives_remaining() as usize);
    let lost = "♡".repeat((state.max_lives() - state.lives_remaining()) as usize);
    println!("  Lives: {}{}", hearts.red(), lost.dimmed());
    println!();
}

fn print_summary(outcome: &GameOutcome) {
    if outcome.is_win() {
        println!("{}", "🏆 You won!".green().bold());
    } else if outcome.forfeited {
        println!("{}", "🏳 Game forfeited.".yellow().bold());
    } else {
        println!("{}", "💀 Out of lives.".red().bold());
    }
    println!(
        "  Pairs: {}/{} | Lives used: {} | Reward: {} points",
        outcome.matched_pairs, outcome.pair_count, outcome.lives_used, outcome.reward_points
    );
    println!("{}", "Type 'settle' to record the result and claim points.".dimmed());
}

fn print_help() {
    println!("Available commands:");
    println!("  register <name> - Create a player profile");
    println!("  start           - Pay the game cost and deal a new board");
    println!("  flip <id>       - Turn over a card");
    println!("  board           - Show the board");
    println!("  forfeit         - Give up the current game");
    println!("  settle          - Submit the result and claim points");
    println!("  retry           - Resume settlements that failed");
    println!("  abandon         - Drop the current game and its settlement");
    println!("  status          - List unsettled games");
    println!("  profile         - Show points and record");
    println!("  help            - Show this help");
    println!("  quit            - Exit the application");
}
