mod cli;
mod config;
mod password;
mod storage;
mod vault;

use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    cli::{Command, ConfigCommand},
    storage::CardStore,
};

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Init { force } => {
            let mut store = storage::store_from_config(&config)?;
            vault::init(&mut store, force, password::read_new)?;
            println!(
                "Created an empty card store at {}",
                storage::store_path(&config)?.display()
            );
        }
        Command::List { json } => {
            let store = open_store(&config)?;
            if json {
                println!("{}", vault::list_json(&store)?);
            } else {
                for line in vault::list_lines(&store) {
                    println!("{line}");
                }
            }
        }
        Command::Add(args) => {
            let mut store = open_store(&config)?;
            let index = vault::add(&mut store, &args)?;
            println!("Added card {index}");
        }
        Command::Show { index, reveal } => {
            let store = open_store(&config)?;
            for line in vault::show_lines(&store, index, reveal)? {
                println!("{line}");
            }
        }
        Command::Delete { index } => {
            let mut store = open_store(&config)?;
            let name = vault::delete(&mut store, index)?;
            println!("Deleted card {index}: {name}");
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info. Logs go to stderr so
    // stdout stays clean for `list --json`.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("cardvault {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

fn open_store(config: &config::Config) -> Result<CardStore> {
    let mut store = storage::store_from_config(config)?;
    vault::open(&mut store, password::read_existing)?;
    Ok(store)
}
