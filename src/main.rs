use anyhow::{anyhow, Result};
use clap::{Arg, Command};
use dirauth::events::EventBus;
use dirauth::import::import_directory;
use dirauth::listeners::IdentityBindings;
use dirauth::resolver::LdapResolver;
use dirauth::store::SqlUserStore;
use dirauth::Settings;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("dirauth")
        .version("0.1.0")
        .about("LDAP directory authentication bridge")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("dirauth.yml"),
        )
        .arg(
            Arg::new("generate-config")
                .short('g')
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .conflicts_with("config"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress all output except errors")
                .action(clap::ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .subcommand(
            Command::new("import").about("Import directory users into the local identity store"),
        )
        .get_matches();

    if let Some(config_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(config_path)?;
        return Ok(());
    }

    let config_path = matches.get_one::<String>("config").unwrap();

    if !std::path::Path::new(config_path).exists() {
        return Err(anyhow!(
            "Configuration file {} not found. Run with --generate-config to create a template.",
            config_path
        ));
    }

    let settings = Settings::load_from_file(config_path)?;

    let _guard = setup_logging(&settings, &matches)?;

    match matches.subcommand() {
        Some(("import", _)) => run_import(settings).await,
        _ => {
            eprintln!("No command specified. Run `dirauth import` or `dirauth --generate-config <FILE>`.");
            std::process::exit(2);
        }
    }
}

async fn run_import(settings: Settings) -> Result<()> {
    let model = settings
        .model
        .clone()
        .ok_or_else(|| anyhow!("No model is configured; set `model` in the configuration file"))?;

    let database = settings
        .database
        .clone()
        .ok_or_else(|| anyhow!("No database is configured; the import needs the local identity store"))?;

    info!("Importing directory users from {}", settings.connection.url);

    let resolver = LdapResolver::new(settings.connection.clone());
    let store = SqlUserStore::connect(&database.backend, &database.url).await?;

    let bus = EventBus::new();
    dirauth::bootstrap::wire_events(&bus, Arc::new(IdentityBindings::new()), &settings)?;

    let summary = import_directory(&resolver, &store, &bus, &model).await?;

    println!(
        "Imported {} directory users into {} ({} created, {} updated)",
        summary.total(),
        model,
        summary.created,
        summary.updated
    );

    Ok(())
}

fn generate_default_config(path: &str) -> Result<()> {
    let settings = Settings::default();
    settings.save_to_file(path)?;

    println!("Generated default configuration file: {}", path);
    println!("Edit this file to point at your directory and identity store.");

    Ok(())
}

fn setup_logging(settings: &Settings, matches: &clap::ArgMatches) -> Result<Option<WorkerGuard>> {
    let log_level = if matches.get_flag("quiet") {
        Level::ERROR
    } else {
        match matches.get_count("verbose") {
            0 => match settings.logging.level.as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            },
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    if let Some(file) = &settings.logging.file {
        let path = std::path::Path::new(file);
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let name = path.file_name().ok_or_else(|| anyhow!("Invalid log file path: {}", file))?;

        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;

        Ok(Some(guard))
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;

        Ok(None)
    }
}
