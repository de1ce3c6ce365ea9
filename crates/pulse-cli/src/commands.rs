//! Stdin command parsing. Each line stands in for one host event.

use pulse_presence::InteractionKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Interaction(InteractionKind),
    /// Pointer movement. Accepted so scripts can send it, never forwarded.
    PointerMove,
    Visibility(bool),
    Status(String),
    State,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "commands: click | key | scroll | touch | move | hide | show | status <id> | state | help | quit";

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let cmd = words.next()?;
    let command = match cmd.to_ascii_lowercase().as_str() {
        "click" => Command::Interaction(InteractionKind::PointerDown),
        "key" => Command::Interaction(InteractionKind::KeyDown),
        "scroll" => Command::Interaction(InteractionKind::Scroll),
        "touch" => Command::Interaction(InteractionKind::Touch),
        "move" => Command::PointerMove,
        "hide" => Command::Visibility(false),
        "show" => Command::Visibility(true),
        "status" => match words.next() {
            Some(id) => Command::Status(id.to_string()),
            None => Command::Unknown(line.trim().to_string()),
        },
        "state" => Command::State,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.trim().to_string()),
    };
    Some(command)
}
