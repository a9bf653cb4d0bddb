use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI arguments and command structure
#[derive(Parser)]
#[clap(
    version,
    about = "Notes storage and API gateway for the nextblog front end"
)]
pub struct Cli {
    /// Path to the notes directory, overrides NOTES_DIR
    #[clap(long, value_parser)]
    pub notes_dir: Option<PathBuf>,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_and_subcommand() {
        let cli = Cli::parse_from([
            "nextblog",
            "--notes-dir",
            "/tmp/n",
            "-v",
            "serve",
            "-b",
            "0.0.0.0:80",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.notes_dir, Some(PathBuf::from("/tmp/n")));
        assert!(matches!(cli.command, Commands::Serve { bind: Some(ref b) } if b == "0.0.0.0:80"));
    }

    #[test]
    fn stats_takes_json_flag() {
        let cli = Cli::parse_from(["nextblog", "stats", "--json"]);
        assert!(matches!(cli.command, Commands::Stats { json: true }));
    }
}
