use clap::Parser;

/// Pulse: presence synchronization for one local session.
#[derive(Parser, Debug)]
#[command(name = "pulse", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<String>,

    /// Log directive override (e.g. "pulse=debug").
    #[arg(long)]
    pub log_level: Option<String>,

    /// Use the in-process store regardless of config.
    #[arg(long)]
    pub memory: bool,

    /// User this session publishes status for.
    #[arg(long)]
    pub user_id: String,

    /// Additional users to observe. Repeatable.
    #[arg(long = "watch", value_name = "ID")]
    pub watch: Vec<String>,
}

pub fn parse() -> Args {
    Args::parse()
}
