use clap::{Args, Parser, Subcommand};

use murmur_core::VERSION;

use crate::config::SecretBackend;
use crate::constants::env;

/// Murmur - a local voice journal with PIN-protected tags
#[derive(Parser)]
#[command(name = "murmur")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the journal database
    #[arg(short, long, global = true, env = env::JOURNAL)]
    pub journal: Option<String>,

    #[command(subcommand)]
    pub command: Commands,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new journal and write the config file
    Init(InitArgs),

    /// Manage tags and their PINs
    #[command(subcommand)]
    Tag(TagCommand),

    /// Record a new entry
    Add(AddArgs),

    /// Attach enhanced text or analysis to an existing entry
    Enrich(EnrichArgs),

    /// Show one entry
    Show(ShowArgs),

    /// List entries
    List(ListArgs),

    /// Seal deferred plaintext whose keys are now available
    Sweep(SweepArgs),

    /// Summarize the protection state of the journal
    Status(StatusArgs),

    /// Verify database and encryption invariants
    Check,
}

/// Arguments for the `init` command
#[derive(Args)]
pub struct InitArgs {
    /// Path where the journal will be created
    #[arg(value_name = "PATH")]
    pub path: Option<String>,

    /// Where keys are persisted
    #[arg(long, value_name = "BACKEND", default_value = "keychain")]
    pub backend: SecretBackend,

    /// Keyfile directory (keyfile backend only)
    #[arg(long, value_name = "DIR")]
    pub keyfile_dir: Option<String>,

    /// Config path override
    #[arg(long)]
    pub config_path: Option<String>,
}

#[derive(Subcommand)]
pub enum TagCommand {
    /// Create a tag
    Create {
        /// Tag name
        name: String,
    },

    /// List tags
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Protect a tag with a PIN and seal its entries under the tag key
    Protect {
        /// Tag name
        name: String,
    },

    /// Remove PIN protection, moving entries back under the root key
    Unprotect {
        /// Tag name
        name: String,
    },

    /// Forget a tag's PIN without unlocking it (sealed entries become unreadable)
    Forget {
        /// Tag name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Tags to unlock for the duration of one command
#[derive(Args, Default)]
pub struct UnlockArgs {
    /// Unlock a PIN-protected tag for this command
    #[arg(long = "unlock", value_name = "TAG")]
    pub tags: Vec<String>,
}

/// Arguments for the `add` command
#[derive(Args)]
pub struct AddArgs {
    /// Transcript text (reads stdin when omitted)
    #[arg(long)]
    pub transcript: Option<String>,

    /// Add tags to the entry
    #[arg(short, long, value_name = "TAG")]
    pub tag: Vec<String>,

    /// Store untagged content without the root key
    #[arg(long)]
    pub no_base_encryption: bool,

    /// Attach an audio file
    #[arg(long, value_name = "PATH")]
    pub audio: Option<String>,

    #[command(flatten)]
    pub unlock: UnlockArgs,
}

/// Arguments for the `enrich` command
#[derive(Args)]
pub struct EnrichArgs {
    /// Entry ID or unique prefix
    pub id: String,

    /// Enhanced transcript text
    #[arg(long)]
    pub enhanced: Option<String>,

    /// Analysis text
    #[arg(long)]
    pub analysis: Option<String>,

    #[command(flatten)]
    pub unlock: UnlockArgs,
}

/// Arguments for the `show` command
#[derive(Args)]
pub struct ShowArgs {
    /// Entry ID or unique prefix
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub unlock: UnlockArgs,
}

/// Arguments for the `list` command
#[derive(Args)]
pub struct ListArgs {
    /// Filter by tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Only entries holding deferred plaintext
    #[arg(long)]
    pub deferred: bool,

    /// Maximum number of entries
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `sweep` command
#[derive(Args)]
pub struct SweepArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub unlock: UnlockArgs,
}

/// Arguments for the `status` command
#[derive(Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repeated_unlock_flags() {
        let cli = Cli::try_parse_from([
            "murmur", "show", "abc", "--unlock", "Private", "--unlock", "Work",
        ])
        .unwrap();
        match cli.command {
            Commands::Show(args) => assert_eq!(args.unlock.tags, vec!["Private", "Work"]),
            _ => panic!("expected show"),
        }
    }

    #[test]
    fn test_init_backend_value() {
        let cli = Cli::try_parse_from(["murmur", "init", "--backend", "keyfile"]).unwrap();
        match cli.command {
            Commands::Init(args) => assert_eq!(args.backend, SecretBackend::Keyfile),
            _ => panic!("expected init"),
        }
    }
}
