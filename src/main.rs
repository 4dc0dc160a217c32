use clap::{Parser, Subcommand};
use miette::Result;
use sea_orm::DatabaseConnection;
use tracing_subscriber::{fmt, EnvFilter};

use permsync::bootstrap::{self, SeedOutcome};
use permsync::credentials::Argon2Hasher;
use permsync::settings::Settings;
use permsync::{permissions, role_sync, storage};

#[derive(Parser, Debug)]
#[command(
    name = "permsync",
    version,
    about = "Provision system roles, permissions and the bootstrap organization"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "permsync.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update the system roles
    InitRoles,
    /// Create or update the system permissions and attach them to roles
    InitPermissions,
    /// Create the bootstrap organization and its super admin user
    InitOrganization,
    /// Run the three steps above in order
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await?;

    match cli.command {
        Command::InitRoles => init_roles(&db, &settings).await?,
        Command::InitPermissions => init_permissions(&db, &settings).await?,
        Command::InitOrganization => init_organization(&db).await?,
        Command::Init => {
            init_roles(&db, &settings).await?;
            init_permissions(&db, &settings).await?;
            init_organization(&db).await?;
        }
    }

    Ok(())
}

async fn init_roles(db: &DatabaseConnection, settings: &Settings) -> Result<()> {
    let outcome =
        role_sync::sync_roles_dir(db, &settings.data.dir, &settings.data.roles_file).await?;

    if outcome.is_empty() {
        println!("No system roles are defined");
    } else if outcome.has_changes() {
        println!("The system roles have been initialized");
    } else {
        println!("The system roles are already up to date");
    }
    Ok(())
}

async fn init_permissions(db: &DatabaseConnection, settings: &Settings) -> Result<()> {
    let result =
        permissions::load_dir(db, &settings.data.dir, &settings.data.permissions_file).await?;

    if result.has_changes() {
        println!("The system permissions have been initialized");
    } else {
        println!("The system permissions are already up to date");
    }
    Ok(())
}

async fn init_organization(db: &DatabaseConnection) -> Result<()> {
    let outcome = bootstrap::seed_organization(db, &Argon2Hasher).await?;

    match outcome {
        SeedOutcome::Initialized => {
            println!("The organization system and the super admin user are created")
        }
        SeedOutcome::AlreadyInitialized => {
            println!("The organization system and the super admin user are already created")
        }
    }
    Ok(())
}
