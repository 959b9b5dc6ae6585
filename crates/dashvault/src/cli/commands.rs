//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Show command arguments.
#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Output the raw record as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Write to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// Exported JSON file to import ("-" reads stdin)
    pub file: PathBuf,
}

/// Clear command arguments.
#[derive(Debug, Args)]
pub struct ClearCommand {
    /// Confirm deletion of the user's record
    #[arg(short, long)]
    pub yes: bool,
}

/// Flight tracker commands.
#[derive(Debug, Subcommand)]
pub enum FlightsCommand {
    /// Record observed flight ids; only unseen ids are counted
    Track {
        /// Flight identifiers
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

/// Medication tracker commands.
#[derive(Debug, Subcommand)]
pub enum MedsCommand {
    /// List medications with stock levels
    List,

    /// Add a medication with a full supply
    Add {
        /// Medication name
        #[arg(short, long)]
        name: String,

        /// Pills per dose
        #[arg(short, long, default_value = "1")]
        dose: u32,

        /// Pills in a full supply
        #[arg(short, long)]
        total: u32,
    },

    /// Mark today's dose taken, or undo it if already taken
    Take {
        /// Medication id
        id: String,
    },

    /// Set pill counts after a refill or recount
    Edit {
        /// Medication id
        id: String,

        /// Pills left
        #[arg(long)]
        current: u32,

        /// Pills in a full supply
        #[arg(long)]
        total: u32,
    },

    /// Remove a medication
    Remove {
        /// Medication id
        id: String,
    },

    /// Clear today's doses if the date has changed
    NewDay,
}

/// Dashboard card commands.
#[derive(Debug, Subcommand)]
pub enum CardsCommand {
    /// List cards in layout order
    List,

    /// List the available card prefabs
    Prefabs,

    /// Add a card from a prefab
    AddPrefab {
        /// Prefab content tag (see `cards prefabs`)
        prefab: String,

        /// Position to insert at (appends when omitted)
        #[arg(long)]
        at: Option<usize>,
    },

    /// Duplicate a card
    Duplicate {
        /// Card id
        id: String,
    },

    /// Move a card
    Move {
        /// Card id
        id: String,

        /// New position (moves to the end when omitted)
        #[arg(long)]
        to: Option<usize>,
    },

    /// Rename a card
    Rename {
        /// Card id
        id: String,

        /// New title
        title: String,
    },

    /// Remove a card
    Remove {
        /// Card id
        id: String,
    },

    /// Restore the default layout
    Reset,
}

/// Arguments for the theme command.
#[derive(Debug, Args)]
pub struct ThemeCommand {
    /// New theme; omit to show the current one
    #[arg(value_parser = ["light", "dark", "toggle"])]
    pub value: Option<String>,
}

/// Account commands.
#[derive(Debug, Subcommand)]
pub enum AccountCommand {
    /// Register a new account and sign in
    Signup {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password
        #[arg(short, long)]
        password: String,
    },

    /// Sign in to an existing account
    Login {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password
        #[arg(short, long)]
        password: String,
    },

    /// Sign out
    Logout,

    /// Issue a password reset token
    Forgot {
        /// Email address of the account
        #[arg(short, long)]
        email: String,
    },

    /// Set a new password with a reset token
    Reset {
        /// Token printed by `account forgot`
        #[arg(short, long)]
        token: String,

        /// New password
        #[arg(short, long)]
        password: String,
    },

    /// Show the signed-in account
    Whoami,

    /// List registered accounts
    List,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
