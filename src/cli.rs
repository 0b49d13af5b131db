use clap::ValueHint;

use std::path::PathBuf;

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Path to the config file.
    ///
    /// By default, radiocast looks for a file named `radiocast.toml` in the following directories
    /// (in order):
    ///
    /// - `./` (the current directory)
    /// - `/etc`
    #[arg(
        short,
        long = "config",
        global = true,
        env = "RADIOCAST_CONFIG",
        value_hint(ValueHint::FilePath)
    )]
    pub config_path: Option<PathBuf>,

    /// Directory where recordings are stored.
    #[arg(
        long,
        global = true,
        env = "RECORDINGS_DIR",
        value_hint(ValueHint::DirPath)
    )]
    pub recordings_dir: Option<PathBuf>,

    /// RSS feed server address to bind to.
    #[arg(long, global = true, env = "RADIOCAST_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Secret that feed requests must carry in the `secret` query parameter.
    #[arg(long, global = true, env = "SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Record the program scheduled for the current minute, if any.
    ///
    /// Meant to be run once per minute by an external timer.
    Record(RecordArgs),

    /// Serve per-program podcast feeds and the recorded files.
    Serve,

    /// Rename legacy `YYYYMMDD HHMM hash.m4a` recordings to `YYYYMMDD-HHMM-hash.m4a`.
    RenameLegacy {
        /// Directory to process (defaults to the current directory).
        #[arg(value_hint(ValueHint::DirPath))]
        dir: Option<PathBuf>,
    },

    /// Set the modification time of recordings to 06:00 of the date in their name.
    Retime {
        /// Directory to process (defaults to the current directory).
        #[arg(value_hint(ValueHint::DirPath))]
        dir: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct RecordArgs {
    /// Record for this many minutes instead of consulting the schedule.
    pub duration_minutes: Option<String>,

    /// Stream to record in manual mode.
    #[arg(long, env = "STREAM_URL")]
    pub stream_url: Option<String>,
}

impl Args {
    pub fn parse() -> Self {
        clap::Parser::parse()
    }
}
