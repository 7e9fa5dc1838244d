//! Binary entry point for the `hcloud-driver` CLI.

use std::io::{self, Write};
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hcloud_driver::config::{CREATE_FLAGS, ConfigError, HetznerConfig};
use hcloud_driver::machine::{MachineStore, StoreError, validate_machine_name};
use hcloud_driver::{DriverError, HetznerDriver, MachineDriver};

mod cli;

use cli::{Cli, Command, CreateCommand, MachineArgs};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("machine state error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid machine name: {0}")]
    InvalidName(String),
    #[error("machine {name} already exists; remove it first")]
    MachineExists { name: String },
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let root = Utf8PathBuf::from(cli.store_path);
    match cli.command {
        Command::Create(args) => create(&root, &args).await,
        Command::Remove(args) => remove(&root, &args).await,
        Command::State(args) => {
            let state = open_driver(&root, &args)?.state().await?;
            writeln!(io::stdout(), "{state}")?;
            Ok(())
        }
        Command::Start(args) => Ok(open_driver(&root, &args)?.start().await?),
        Command::Stop(args) => Ok(open_driver(&root, &args)?.stop().await?),
        Command::Restart(args) => Ok(open_driver(&root, &args)?.restart().await?),
        Command::Kill(args) => Ok(open_driver(&root, &args)?.kill().await?),
        Command::Ip(args) => {
            let ip = load_driver(&root, &args)?.ip()?;
            writeln!(io::stdout(), "{ip}")?;
            Ok(())
        }
        Command::Url(args) => {
            let url = load_driver(&root, &args)?.url()?;
            writeln!(io::stdout(), "{url}")?;
            Ok(())
        }
        Command::Ssh(args) => {
            let driver = load_driver(&root, &args)?;
            let mut stdout = io::stdout();
            writeln!(stdout, "host: {}", driver.ssh_hostname()?)?;
            writeln!(stdout, "user: {}", driver.ssh_username())?;
            if let Some(path) = driver.ssh_key_path() {
                writeln!(stdout, "key: {path}")?;
            }
            Ok(())
        }
        Command::Flags => write_flags(io::stdout()),
    }
}

async fn create(root: &Utf8Path, args: &CreateCommand) -> Result<(), CliError> {
    let name = args.machine.name.as_str();
    validate_machine_name(name).map_err(CliError::InvalidName)?;
    let store = MachineStore::new(root.join(name));
    if store.exists()? {
        return Err(CliError::MachineExists {
            name: name.to_owned(),
        });
    }

    let mut config = HetznerConfig::load_without_cli_args()?;
    apply_overrides(&mut config, args);
    let mut driver = HetznerDriver::new(name, store.root());
    driver.configure(&config)?;
    driver.pre_create_check()?;

    let outcome = driver.create().await;
    store.save(driver.record())?;
    outcome?;

    info!(machine = name, "machine created");
    writeln!(io::stdout(), "{}", driver.url()?)?;
    Ok(())
}

async fn remove(root: &Utf8Path, args: &MachineArgs) -> Result<(), CliError> {
    let store = machine_store(root, args)?;
    let mut driver = open_driver(root, args)?;
    match driver.remove().await {
        Ok(()) => {
            store.remove()?;
            Ok(())
        }
        Err(err) => {
            store.save(driver.record())?;
            Err(err.into())
        }
    }
}

fn apply_overrides(config: &mut HetznerConfig, args: &CreateCommand) {
    if let Some(server_type) = &args.server_type {
        config.server_type.clone_from(server_type);
    }
    if let Some(image) = &args.image {
        config.image.clone_from(image);
    }
    if let Some(location) = &args.location {
        config.location.clone_from(location);
    }
}

fn machine_store(root: &Utf8Path, args: &MachineArgs) -> Result<MachineStore, CliError> {
    validate_machine_name(&args.name).map_err(CliError::InvalidName)?;
    Ok(MachineStore::new(root.join(&args.name)))
}

/// Loads a saved machine for read-only queries that need no credential.
fn load_driver(root: &Utf8Path, args: &MachineArgs) -> Result<HetznerDriver, CliError> {
    let record = machine_store(root, args)?.load()?;
    Ok(HetznerDriver::from_record(record))
}

/// Loads a saved machine and attaches the configured API token.
fn open_driver(root: &Utf8Path, args: &MachineArgs) -> Result<HetznerDriver, CliError> {
    let mut record = machine_store(root, args)?.load()?;
    record.api_token = HetznerConfig::load_without_cli_args()?.api_token;
    Ok(HetznerDriver::from_record(record))
}

fn write_flags(mut target: impl Write) -> Result<(), CliError> {
    for flag in &CREATE_FLAGS {
        let default = flag.default.unwrap_or("(required)");
        writeln!(
            target,
            "--{}\t{}\tdefault: {default}\tenv: {}",
            flag.name, flag.usage, flag.env_var
        )?;
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
