use clap::{Args, Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "cardvault",
    about = "Encrypted local store for payment card details",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a new, empty card store protected by a master password.
    Init {
        /// Replace an existing store. Its cards are lost.
        #[arg(long)]
        force: bool,
    },
    /// List stored cards by index.
    List {
        /// Print machine-readable JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Add a card and save the store.
    Add(AddArgs),
    /// Show one card. Number and CVV are masked unless --reveal is given.
    Show {
        index: usize,
        #[arg(long)]
        reveal: bool,
    },
    /// Delete a card and save the store.
    Delete { index: usize },
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AddArgs {
    /// Card number, digits only.
    #[arg(long)]
    pub number: String,
    #[arg(long)]
    pub cvv: String,
    /// Expiry month, 1-12.
    #[arg(long)]
    pub month: String,
    /// Expiry year, four digits.
    #[arg(long)]
    pub year: String,
    /// Optional label; letters, digits and spaces.
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args)
            .expect("parse should succeed")
            .command
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["cardvault"]).is_err());
    }

    #[test]
    fn parses_init_with_and_without_force() {
        assert_eq!(
            parse(&["cardvault", "init"]),
            Command::Init { force: false }
        );
        assert_eq!(
            parse(&["cardvault", "init", "--force"]),
            Command::Init { force: true }
        );
    }

    #[test]
    fn parses_list_json() {
        assert_eq!(
            parse(&["cardvault", "list", "--json"]),
            Command::List { json: true }
        );
    }

    #[test]
    fn parses_add_with_optional_name() {
        let cmd = parse(&[
            "cardvault", "add", "--number", "4111111111111111", "--cvv", "123", "--month", "12",
            "--year", "2025", "--name", "Travel",
        ]);
        assert_eq!(
            cmd,
            Command::Add(AddArgs {
                number: "4111111111111111".into(),
                cvv: "123".into(),
                month: "12".into(),
                year: "2025".into(),
                name: Some("Travel".into()),
            })
        );
    }

    #[test]
    fn add_requires_card_fields() {
        assert!(Cli::try_parse_from(["cardvault", "add", "--number", "4111111111111111"]).is_err());
    }

    #[test]
    fn parses_show_and_delete_indices() {
        assert_eq!(
            parse(&["cardvault", "show", "2", "--reveal"]),
            Command::Show {
                index: 2,
                reveal: true
            }
        );
        assert_eq!(
            parse(&["cardvault", "delete", "0"]),
            Command::Delete { index: 0 }
        );
        assert!(Cli::try_parse_from(["cardvault", "delete", "-1"]).is_err());
    }

    #[test]
    fn parses_config_init_subcommand() {
        assert_eq!(
            parse(&["cardvault", "config", "init"]),
            Command::Config(ConfigCommand::Init)
        );
    }
}
