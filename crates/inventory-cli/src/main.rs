//! Inventory CLI
//!
//! Drives the inventory services from the command line: manage items,
//! share or export them, and edit the settings.

use anyhow::Result;
use clap::{Parser, Subcommand};
use inventory_service::{default_keystore, AppConfig, InventoryApp};
use std::path::PathBuf;

mod commands;
mod output;

use commands::NewItem;
use output::Output;

#[derive(Parser, Debug)]
#[command(name = "inventory")]
#[command(about = "Encrypted local inventory", long_about = None)]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (defaults to the platform config dir, or INVENTORY_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage items
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ItemCommands {
    /// Add an item
    Add {
        /// Item name
        name: String,
        /// Unit price
        #[arg(short, long)]
        price: f64,
        /// Units in stock
        #[arg(short, long)]
        quantity: i64,
        /// Supplier name (defaults from settings when prefill is on)
        #[arg(long)]
        supplier_name: Option<String>,
        /// Supplier email
        #[arg(long)]
        supplier_email: Option<String>,
        /// Supplier phone
        #[arg(long)]
        supplier_phone: Option<String>,
    },
    /// List all items by name
    #[command(alias = "ls")]
    List,
    /// Show one item
    Show {
        /// Item ID
        id: i64,
    },
    /// Remove one unit from stock
    Sell {
        /// Item ID
        id: i64,
    },
    /// Delete an item
    #[command(alias = "rm")]
    Delete {
        /// Item ID
        id: i64,
    },
    /// Print the share text for an item
    Share {
        /// Item ID
        id: i64,
    },
    /// Write an item to an encrypted file
    Export {
        /// Item ID
        id: i64,
        /// Destination file
        destination: PathBuf,
    },
    /// Read back an exported item file
    Decrypt {
        /// Exported file
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommands {
    /// Show current settings
    Show,
    /// Set one or more settings and save them
    Set {
        /// Assignments such as `supplier_email_key=orders@acme.io` or `share_key=true`
        #[arg(required = true)]
        assignments: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<inventory_service::Error>() {
            Some(service_err) => eprintln!("error: {}", service_err.user_message()),
            None => eprintln!("error: {:#}", err),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    init_tracing(&config.log_filter);
    tracing::debug!(
        command = ?cli.command,
        data_dir = %config.data_dir.display(),
        "Running command"
    );

    let app = InventoryApp::init(config, default_keystore()?)?;
    let output = Output::new(cli.json);

    let result = match cli.command {
        Commands::Item { command } => handle_item_command(command, &app, &output).await,
        Commands::Settings { command } => match command {
            SettingsCommands::Show => commands::show_settings(&app, &output),
            SettingsCommands::Set { assignments } => {
                commands::set_settings(&app, &assignments, &output).await
            }
        },
    };

    app.close();
    result
}

async fn handle_item_command(
    command: ItemCommands,
    app: &InventoryApp,
    output: &Output,
) -> Result<()> {
    match command {
        ItemCommands::Add {
            name,
            price,
            quantity,
            supplier_name,
            supplier_email,
            supplier_phone,
        } => {
            let new = NewItem {
                name,
                price,
                quantity,
                supplier_name,
                supplier_email,
                supplier_phone,
            };
            commands::add_item(app, new, output).await
        }
        ItemCommands::List => commands::list_items(app, output).await,
        ItemCommands::Show { id } => commands::show_item(app, id, output).await,
        ItemCommands::Sell { id } => commands::sell_item(app, id, output).await,
        ItemCommands::Delete { id } => commands::delete_item(app, id, output).await,
        ItemCommands::Share { id } => commands::share_item(app, id, output).await,
        ItemCommands::Export { id, destination } => {
            commands::export_item(app, id, destination, output).await
        }
        ItemCommands::Decrypt { path } => commands::decrypt_export(app, path, output),
    }
}

/// Log to stderr so `--json` output stays parseable
fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_add_with_supplier() {
        let cli = Cli::try_parse_from([
            "inventory",
            "item",
            "add",
            "Hammer",
            "--price",
            "12.5",
            "-q",
            "3",
            "--supplier-email",
            "sales@forge.example",
        ])
        .unwrap();

        match cli.command {
            Commands::Item {
                command:
                    ItemCommands::Add {
                        name,
                        price,
                        quantity,
                        supplier_email,
                        supplier_name,
                        ..
                    },
            } => {
                assert_eq!(name, "Hammer");
                assert_eq!(price, 12.5);
                assert_eq!(quantity, 3);
                assert_eq!(supplier_email.as_deref(), Some("sales@forge.example"));
                assert!(supplier_name.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["inventory", "item", "ls", "--json", "--config", "/tmp/c.json"])
                .unwrap();

        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(matches!(
            cli.command,
            Commands::Item {
                command: ItemCommands::List
            }
        ));
    }

    #[test]
    fn test_settings_set_needs_assignment() {
        assert!(Cli::try_parse_from(["inventory", "settings", "set"]).is_err());

        let cli = Cli::try_parse_from(["inventory", "settings", "set", "share_key=true"]).unwrap();
        match cli.command {
            Commands::Settings {
                command: SettingsCommands::Set { assignments },
            } => assert_eq!(assignments, ["share_key=true"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_export_takes_id_and_destination() {
        let cli = Cli::try_parse_from(["inventory", "item", "export", "7", "out.item"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Item {
                command: ItemCommands::Export { id: 7, .. }
            }
        ));
    }
}
