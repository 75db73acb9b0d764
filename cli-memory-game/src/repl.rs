use anyhow::Result;
use colored::*;
use rustyline::{Config, DefaultEditor, Result as RustylineResult};
use tokio::sync::mpsc;

use crate::config::ReplConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    // Player
    Register { username: String },
    Profile,

    // Game
    Start,
    Flip { card_id: usize },
    Board,
    Forfeit,

    // Settlement
    Settle,
    Retry,
    Abandon,

    // System
    Status,
    Help,
    Quit,
}

/// Session summary sent back after every command
#[derive(Debug, Clone, Default)]
pub struct GameStatus {
    pub current_status: String,
    pub username: Option<String>,
    pub lives: Option<(u8, u8)>,
    pub matched: Option<(usize, usize)>,
    pub unsettled: usize,
}

pub struct ReplInterface {
    editor: DefaultEditor,
    command_sender: mpsc::UnboundedSender<ReplCommand>,
    status_receiver: mpsc::UnboundedReceiver<GameStatus>,
    config: ReplConfig,
    current_status: Option<GameStatus>,
}

impl ReplInterface {
    pub fn new(
        command_sender: mpsc::UnboundedSender<ReplCommand>,
        status_receiver: mpsc::UnboundedReceiver<GameStatus>,
        config: ReplConfig,
    ) -> Result<Self> {
        let editor_config = Config::builder()
            .max_history_size(config.max_history)?
            .build();
        let mut editor = DefaultEditor::with_config(editor_config)?;

        if let Some(history_file) = &config.history_file {
            let _ = editor.load_history(history_file);
        }

        Ok(Self {
            editor,
            command_sender,
            status_receiver,
            config,
            current_status: None,
        })
    }

    /// Blocking read loop. Run it off the async worker threads.
    pub fn run(&mut self) -> Result<()> {
        self.display_welcome();

        loop {
            self.display_prompt();

            let input = match self.read_input() {
                Ok(input) => input,
                Err(_) => {
                    println!("\nGoodbye!");
                    break;
                }
            };

            if input.trim().is_empty() {
                continue;
            }
            let _ = self.editor.add_history_entry(input.as_str());

            match parse_command(&input) {
                Ok(ReplCommand::Quit) => {
                    println!("Goodbye!");
                    break;
                }
                Ok(command) => {
                    if let Err(e) = self.command_sender.send(command) {
                        eprintln!("{}", format!("Error sending command: {}", e).red());
                        break;
                    }
                    // Wait for the command to finish so output stays in order.
                    match self.status_receiver.blocking_recv() {
                        Some(status) => self.current_status = Some(status),
                        None => break,
                    }
                }
                Err(e) => {
                    eprintln!("{}", format!("Error: {}", e).red());
                }
            }
        }

        if let Some(history_file) = &self.config.history_file {
            let _ = self.editor.save_history(history_file);
        }

        Ok(())
    }

    fn display_welcome(&self) {
        println!("{}", "Welcome to ChessFlip!".bright_blue().bold());
        println!("{}", "Find the matching chess pieces before your lives run out".cyan());
        println!("{}", "Type 'help' for available commands".dimmed());
        println!();
    }

    fn display_prompt(&self) {
        let Some(status) = &self.current_status else {
            return;
        };

        let mut line = format!("Status: {}", status.current_status);
        if let Some(username) = &status.username {
            line.push_str(&format!(" | Player: {}", username));
        }
        if let (Some((lives, max)), Some((matched, pairs))) = (status.lives, status.matched) {
            line.push_str(&format!(" | Lives: {}/{} | Pairs: {}/{}", lives, max, matched, pairs));
        }
        if status.unsettled > 0 {
            line.push_str(&format!(" | Unsettled: {}", status.unsettled));
        }
        println!("{}", line.dimmed());
    }

    fn read_input(&mut self) -> RustylineResult<String> {
        self.editor.readline(&self.config.prompt)
    }
}

pub fn parse_command(input: &str) -> Result<ReplCommand> {
    let parts: Vec<&str> = input.split_whitespace().collect();

    match parts.as_slice() {
        ["register", username] => Ok(ReplCommand::Register {
            username: username.to_string(),
        }),
        ["profile"] | ["stats"] => Ok(ReplCommand::Profile),
        ["start"] | ["new"] => Ok(ReplCommand::Start),
        ["flip", card_id] => Ok(ReplCommand::Flip {
            card_id: card_id.parse()?,
        }),
        ["board"] => Ok(ReplCommand::Board),
        ["forfeit"] => Ok(ReplCommand::Forfeit),
        ["settle"] => Ok(ReplCommand::Settle),
        ["retry"] => Ok(ReplCommand::Retry),
        ["abandon"] => Ok(ReplCommand::Abandon),
        ["status"] => Ok(ReplCommand::Status),
        ["help"] => Ok(ReplCommand::Help),
        ["quit"] | ["exit"] => Ok(ReplCommand::Quit),
        [] => Err(anyhow::anyhow!("Empty command")),
        _ => Err(anyhow::anyhow!(
            "Unknown command: '{}'. Type 'help' for available commands.",
            input.trim()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("register magnus").unwrap(),
            ReplCommand::Register { username: "magnus".to_string() }
        );
        assert_eq!(parse_command("  flip 7 ").unwrap(), ReplCommand::Flip { card_id: 7 });
        assert_eq!(parse_command("new").unwrap(), ReplCommand::Start);
        assert_eq!(parse_command("exit").unwrap(), ReplCommand::Quit);
        assert_eq!(parse_command("abandon").unwrap(), ReplCommand::Abandon);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("").is_err());
        assert!(parse_command("flip").is_err());
        assert!(parse_command("flip seven").is_err());
        assert!(parse_command("castle").is_err());
    }
}
