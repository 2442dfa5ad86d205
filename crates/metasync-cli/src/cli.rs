//! CLI argument definitions for metasync.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `comps` | Team compositions |
//! | `items` | Item catalog |
//! | `augments` | Augments |
//! | `sync` | Force a refresh of every domain |
//! | `status` | Cache availability |
//! | `clear` | Drop cached entries |
//! | `validate` | Re-run validation on a cached entry |
//! | `backups` | List or restore backups of a cached entry |
//! | `history` | Recent sync log |
//! | `sources` | Configured providers |
//! | `watch` | Refresh periodically until Ctrl-C |
//!
//! # Examples
//!
//! ```bash
//! metasync comps --source metatft --pretty
//! metasync items --patch 14.1 --refresh
//! metasync --offline sync
//! metasync clear --patch 14.1
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use metasync_core::{ProviderId, Source};

#[derive(Debug, Parser)]
#[command(
    name = "metasync",
    author,
    version,
    about = "TFT metagame data sync",
    long_about = "Fetches team compositions, items and augments from community \
statistics providers, normalizes them into one model, validates them and \
caches them per patch in a local DuckDB file.\n\
\n\
Provider keys are read from METASYNC_METATFT_API_KEY and \
METASYNC_TACTICSTOOLS_API_KEY."
)]
pub struct Cli {
    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Serve bundled sample documents instead of calling providers.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Keep the cache in memory for this run only.
    #[arg(long, global = true, default_value_t = false)]
    pub ephemeral: bool,

    /// Data directory; overrides METASYNC_HOME.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace). Logs go to stderr.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Team compositions.
    Comps(FetchArgs),
    /// Item catalog.
    Items(FetchArgs),
    /// Augments.
    Augments(FetchArgs),
    /// Force a refresh of every domain.
    Sync,
    /// Cache availability.
    Status(PatchArgs),
    /// Drop cached entries (all, or one patch).
    Clear(PatchArgs),
    /// Re-run validation on a cached entry.
    Validate(EntryArgs),
    /// List or restore backups of a cached entry.
    Backups(BackupsArgs),
    /// Recent sync log entries.
    History(HistoryArgs),
    /// Configured providers.
    Sources,
    /// Refresh periodically until Ctrl-C.
    Watch(WatchArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceSelector {
    Metatft,
    Tacticstools,
    /// Merge every provider by id.
    Combined,
}

impl From<SourceSelector> for Source {
    fn from(value: SourceSelector) -> Self {
        match value {
            SourceSelector::Metatft => Source::Provider(ProviderId::MetaTft),
            SourceSelector::Tacticstools => Source::Provider(ProviderId::TacticsTools),
            SourceSelector::Combined => Source::Combined,
        }
    }
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Defaults to METASYNC_DEFAULT_SOURCE, then `combined`.
    #[arg(long, value_enum)]
    pub source: Option<SourceSelector>,

    /// Game patch such as `14.1`; defaults to the latest.
    #[arg(long)]
    pub patch: Option<String>,

    /// Skip the cache freshness check.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,
}

#[derive(Debug, Args)]
pub struct PatchArgs {
    #[arg(long)]
    pub patch: Option<String>,
}

#[derive(Debug, Args)]
pub struct EntryArgs {
    /// `comps`, `items` or `augments`.
    pub domain: String,

    #[arg(long, value_enum)]
    pub source: Option<SourceSelector>,

    #[arg(long)]
    pub patch: Option<String>,
}

#[derive(Debug, Args)]
pub struct BackupsArgs {
    #[command(flatten)]
    pub entry: EntryArgs,

    /// Promote the newest backup to the live entry.
    #[arg(long, default_value_t = false)]
    pub restore: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[arg(long, default_value_t = 3_600)]
    pub interval_secs: u64,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_fetch_flags_and_globals() {
        let cli = Cli::try_parse_from([
            "metasync", "comps", "--source", "tacticstools", "--patch", "14.1", "--refresh",
            "--offline", "-vv",
        ])
        .expect("parse");

        assert!(cli.offline);
        assert_eq!(cli.verbose, 2);
        let Command::Comps(args) = cli.command else {
            panic!("expected comps");
        };
        assert_eq!(args.source, Some(SourceSelector::Tacticstools));
        assert_eq!(args.patch.as_deref(), Some("14.1"));
        assert!(args.refresh);
    }

    #[test]
    fn backups_flatten_entry_args() {
        let cli = Cli::try_parse_from(["metasync", "backups", "items", "--restore"])
            .expect("parse");
        let Command::Backups(args) = cli.command else {
            panic!("expected backups");
        };
        assert_eq!(args.entry.domain, "items");
        assert!(args.restore);
    }
}
