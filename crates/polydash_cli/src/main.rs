//! Command-line surface over `polydash_core`.
//!
//! # Responsibility
//! - Bootstrap config, logging, catalog and database for one invocation.
//! - Map `key=value` arguments onto the dashboard service and print JSON.
//!
//! # Invariants
//! - Every invocation prints exactly one JSON document on stdout.
//! - Failures print `{"ok":false,...}` and exit with status 1.
//! - Mutating subcommands refuse to run against an in-memory database.

use clap::{Parser, Subcommand};
use log::info;
use polydash_core::{
    core_catalog, core_key, core_version, ping, sync_schema, ConfigError, CoreConfig, CoreError,
    DashboardService, DbError, EntryKinds, ExtensionError, ExtensionFragment, ExtensionRegistry,
    FieldDef, FieldValue, NamespaceModule, Record, RequestInput, TypeKey,
};
use serde_json::{json, Value};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[clap(name = "polydash", version = env!("CARGO_PKG_VERSION"), about = "Dashboard over extensible record types")]
struct Cli {
    /// TOML configuration file.
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database file; overrides `[database] path`.
    #[clap(long, global = true)]
    db: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check core linkage
    Ping,
    /// List record types a widget may summarize
    Targets,
    /// Show all three lanes with computed entry values
    Dashboard,
    /// Create a widget: title=... column=1..3 target=Name+namespace
    AddWidget {
        #[clap(value_parser = parse_key_value)]
        pairs: Vec<(String, String)>,
    },
    /// Create a statistic entry: widget_id=... label=... field=... stats=...
    AddEntry {
        #[clap(value_parser = parse_key_value)]
        pairs: Vec<(String, String)>,
    },
    /// Delete a widget and its entries: base_id=...
    DeleteWidget {
        #[clap(value_parser = parse_key_value)]
        pairs: Vec<(String, String)>,
    },
}

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Core(CoreError),
    Output(serde_json::Error),
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Core(err) => err.code(),
            Self::Output(_) => "output_error",
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Core(err) => write!(f, "{err}"),
            Self::Output(err) => write!(f, "cannot render output: {err}"),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(value: CoreError) -> Self {
        Self::Core(value)
    }
}

impl From<ExtensionError> for CliError {
    fn from(value: ExtensionError) -> Self {
        Self::Core(value.into())
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Core(value.into())
    }
}

/// Contact location fields, installed by listing `locations` in the config.
struct Locations;

impl NamespaceModule for Locations {
    fn namespace(&self) -> &str {
        "locations"
    }

    fn fragments(&self) -> Vec<(TypeKey, ExtensionFragment)> {
        vec![(
            core_key("Contact"),
            ExtensionFragment::new("ContactLocation")
                .with_field(FieldDef::text("village", 60).with_default(""))
                .with_method("display", located_display),
        )]
    }
}

fn located_display(record: &Record) -> FieldValue {
    let name = record.text("name").map(str::trim).unwrap_or_default();
    let name = if name.is_empty() { "Anonymous" } else { name };
    match record.text("village").map(str::trim) {
        Some(village) if !village.is_empty() => FieldValue::Text(format!("{name} ({village})")),
        _ => FieldValue::Text(name.to_string()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!(
                "{}",
                json!({ "ok": false, "code": err.code(), "message": err.to_string() })
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Value, CliError> {
    if let Command::Ping = cli.command {
        return Ok(ping_output());
    }

    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path).map_err(CliError::Config)?,
        None => CoreConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.database.path = Some(db.clone());
    }
    if config.database.path.is_none() && mutates(&cli.command) {
        return Err(CliError::Config(ConfigError::Invalid(format!(
            "`{}` needs --db or `[database] path`; an in-memory database is discarded on exit",
            command_name(&cli.command)
        ))));
    }
    config.init_logging().map_err(CliError::Config)?;

    let mut extensions = config.extension_registry()?;
    extensions.register_module(&Locations)?;
    let catalog = core_catalog(&extensions, [])?;
    let conn = config.open_database()?;
    sync_schema(&conn, &catalog)?;
    let kinds = EntryKinds::default();
    let service = DashboardService::new(&conn, &catalog, &kinds);
    info!(
        "event=cli_command module=cli status=start command={} namespaces={}",
        command_name(&cli.command),
        installed(&extensions)
    );

    let output = match &cli.command {
        Command::Ping => ping_output(),
        Command::Targets => json!({ "ok": true, "targets": to_json(&service.target_types())? }),
        Command::Dashboard => json!({ "ok": true, "dashboard": to_json(&service.dashboard()?)? }),
        Command::AddWidget { pairs } => {
            let widget = service.create_widget(&request(pairs))?;
            json!({ "ok": true, "widget": to_json(&widget)? })
        }
        Command::AddEntry { pairs } => {
            let entry = service.create_entry(&request(pairs))?;
            json!({ "ok": true, "entry": to_json(&entry)? })
        }
        Command::DeleteWidget { pairs } => {
            let deleted = service.delete_widget(&request(pairs))?;
            json!({ "ok": true, "deleted": deleted })
        }
    };
    Ok(output)
}

fn ping_output() -> Value {
    json!({ "ok": true, "ping": ping(), "version": core_version() })
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn request(pairs: &[(String, String)]) -> RequestInput {
    pairs.iter().cloned().collect()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, CliError> {
    serde_json::to_value(value).map_err(CliError::Output)
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Ping => "ping",
        Command::Targets => "targets",
        Command::Dashboard => "dashboard",
        Command::AddWidget { .. } => "add-widget",
        Command::AddEntry { .. } => "add-entry",
        Command::DeleteWidget { .. } => "delete-widget",
    }
}

fn mutates(command: &Command) -> bool {
    matches!(
        command,
        Command::AddWidget { .. } | Command::AddEntry { .. } | Command::DeleteWidget { .. }
    )
}

fn installed(extensions: &ExtensionRegistry) -> String {
    extensions.installed_namespaces().join(",")
}
