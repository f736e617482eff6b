//! Commands typed by the local player

pub const HELP: &str = "commands: <column> to play, r to refresh, h for help, q to quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play(usize),
    Refresh,
    Help,
    Quit,
}

/// Parses one line of terminal input
///
/// Columns are zero-based, matching the ruler printed under the board.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "" | "r" | "refresh" => Ok(Command::Refresh),
        "h" | "help" | "?" => Ok(Command::Help),
        "q" | "quit" | "exit" => Ok(Command::Quit),
        other => other
            .parse::<usize>()
            .map(Command::Play)
            .map_err(|_| format!("unknown command '{}' ({})", line, HELP)),
    }
}
