//! Command-line interface for dashvault.
//!
//! This module provides the CLI structure for the `dashvault` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AccountCommand, CardsCommand, ClearCommand, ConfigCommand, ExportCommand, FlightsCommand,
    ImportCommand, MedsCommand, ShowCommand, StatusCommand, ThemeCommand,
};

use crate::logging::Verbosity;

/// dashvault - Per-user dashboard data
///
/// Inspect and edit the records a personal dashboard keeps for each user:
/// tracked flights, medications, card layout, saved businesses and more.
#[derive(Debug, Parser)]
#[command(name = "dashvault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Act on this user id instead of the signed-in account
    #[arg(short, long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List users with stored records
    Users,

    /// Show a user's record
    Show(ShowCommand),

    /// Export a user's record as JSON
    Export(ExportCommand),

    /// Replace a user's record with an exported one
    Import(ImportCommand),

    /// Delete a user's record
    Clear(ClearCommand),

    /// Move pre-account data into a user's record
    Migrate,

    /// Flight tracker data
    #[command(subcommand)]
    Flights(FlightsCommand),

    /// Medication tracker data
    #[command(subcommand)]
    Meds(MedsCommand),

    /// Dashboard card layout
    #[command(subcommand)]
    Cards(CardsCommand),

    /// Show or change the dashboard theme
    Theme(ThemeCommand),

    /// Local accounts
    #[command(subcommand)]
    Account(AccountCommand),

    /// Show storage status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
