//! Command-line interface definitions for the `hcloud-driver` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `hcloud-driver` binary.
#[derive(Debug, Parser)]
#[command(
    name = "hcloud-driver",
    about = "Provision and manage Docker hosts on Hetzner Cloud",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Directory holding one sub-directory of state per machine.
    #[arg(
        long,
        global = true,
        env = "HCLOUD_DRIVER_STORE_PATH",
        default_value = ".hcloud-driver",
        value_name = "PATH"
    )]
    pub(crate) store_path: String,
    /// Operation to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Machine operations.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Generate a key, request a server and wait for its address.
    Create(CreateCommand),
    /// Delete the server, its registered key and local state.
    Remove(MachineArgs),
    /// Print the server's run-state.
    State(MachineArgs),
    /// Power the server on.
    Start(MachineArgs),
    /// Power the server off.
    Stop(MachineArgs),
    /// Reboot the server.
    Restart(MachineArgs),
    /// Forcibly power the server off.
    Kill(MachineArgs),
    /// Print the server's public IPv4 address.
    Ip(MachineArgs),
    /// Print the Docker endpoint URL.
    Url(MachineArgs),
    /// Print SSH connection details.
    Ssh(MachineArgs),
    /// List the options accepted when creating a machine.
    Flags,
}

/// Identifies the machine an operation targets.
#[derive(Debug, Args)]
pub(crate) struct MachineArgs {
    /// Machine name; also names its state directory.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
}

/// Arguments for the `hcloud-driver create` subcommand.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Machine to create.
    #[command(flatten)]
    pub(crate) machine: MachineArgs,
    /// Override the configured server type (for example `cx21`).
    #[arg(long, value_name = "TYPE")]
    pub(crate) server_type: Option<String>,
    /// Override the configured image (for example `ubuntu-22.04`).
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Override the configured location (for example `fsn1`).
    #[arg(long, value_name = "LOCATION")]
    pub(crate) location: Option<String>,
}
