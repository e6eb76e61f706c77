use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};

use lyricsync::{
    cli::{self, PlayerCommand},
    config, error,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in with Spotify
    Auth,

    /// Forget the stored session
    Logout,

    /// Show the current playback
    Status,

    /// Look up timed lyrics for a track
    Lyrics(LyricsOptions),

    /// Follow playback and print the current lyric line
    Watch,

    /// Resume playback
    Play,

    /// Pause playback
    Pause,

    /// Pause when playing, play otherwise
    Toggle,

    /// Skip to the next track
    Next,

    /// Skip to the previous track
    Previous,

    /// Jump to a position in the current track
    Seek(SeekOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct LyricsOptions {
    /// Artist name
    #[clap(long)]
    pub artist: String,

    /// Track title
    #[clap(long)]
    pub title: String,

    /// Track duration in milliseconds, improves matching
    #[clap(long)]
    pub duration_ms: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct SeekOptions {
    /// Target position in milliseconds
    pub position_ms: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();

    if let Command::Completions(opt) = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    let settings = match config::Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => error!("Invalid configuration: {}", e),
    };

    match cli.command {
        Command::Auth => cli::auth(&settings).await,
        Command::Logout => cli::logout(&settings).await,
        Command::Status => cli::status(&settings).await,
        Command::Lyrics(opt) => {
            cli::lyrics(&settings, &opt.artist, &opt.title, opt.duration_ms).await
        }
        Command::Watch => cli::watch(&settings).await,
        Command::Play => cli::control(&settings, PlayerCommand::Play).await,
        Command::Pause => cli::control(&settings, PlayerCommand::Pause).await,
        Command::Toggle => cli::control(&settings, PlayerCommand::Toggle).await,
        Command::Next => cli::control(&settings, PlayerCommand::Next).await,
        Command::Previous => cli::control(&settings, PlayerCommand::Previous).await,
        Command::Seek(opt) => cli::control(&settings, PlayerCommand::Seek(opt.position_ms)).await,
        Command::Completions(_) => {}
    }
}
