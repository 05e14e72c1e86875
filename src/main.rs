use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

use recruit_authz::config::{load_env, AuthzConfig};
use recruit_authz::events::init_event_bus;
use recruit_authz::models::{NewUser, User, UserSummary};
use recruit_authz::store::SqliteUserStore;
use recruit_authz::{AccessControl, Permission, RoleRegistry};

#[derive(Parser, Debug)]
#[command(author, version, about = "recruiting dashboard authorization admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Print the loaded role registry and its fingerprint
    Roles,
    /// List users with their effective permissions
    Users,
    /// Create the first administrator on an empty database
    Bootstrap {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "global_admin")]
        role: String,
    },
    /// Provision a user on behalf of an administrator
    Provision {
        /// Acting administrator (username or id)
        #[arg(long)]
        actor: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        unit: Option<String>,
    },
    /// Show a user's effective permissions and data scope
    Show {
        #[arg(long)]
        user: String,
    },
    /// Grant (or with --revoke, remove) a delegated permission
    Delegate {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        target: String,
        #[arg(long)]
        permission: Permission,
        #[arg(long)]
        revoke: bool,
    },
    /// Move a user to a different role
    AssignRole {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        target: String,
        #[arg(long)]
        role: String,
    },
    /// Soft-delete a user
    Deactivate {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        target: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = AuthzConfig::from_env()?;
    let registry = Arc::new(config.load_registry()?);

    // Inspecting the registry must not require a database.
    if matches!(cli.command, Commands::Roles) {
        return print_roles(&registry);
    }

    let store = SqliteUserStore::connect(config.database_url()?, config.max_connections)
        .await
        .context("failed to connect to database")?;

    let (event_bus, mut audit_rx) = init_event_bus();
    let ac = AccessControl::new(registry, store, event_bus);

    match cli.command {
        Commands::Roles => print_roles(ac.registry())?,
        Commands::Migrate => {
            ac.store().migrate().await.context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::Users => {
            let users: Vec<UserSummary> = ac.list_users().await?.iter().map(UserSummary::from).collect();
            print_json(&users)?;
        }
        Commands::Bootstrap { username, role } => {
            let user = ac.bootstrap(&username, &role).await?;
            print_json(&UserSummary::from(&user))?;
        }
        Commands::Provision { actor, username, role, position, unit } => {
            let actor = resolve(&ac, &actor).await?;
            let mut request = NewUser::new(username, role);
            request.position = position;
            request.unit = unit;
            let user = ac.provision_user(&actor, request).await?;
            print_json(&UserSummary::from(&user))?;
        }
        Commands::Show { user } => {
            let user = resolve(&ac, &user).await?;
            print_json(&UserSummary::from(&user))?;
        }
        Commands::Delegate { actor, target, permission, revoke } => {
            let actor = resolve(&ac, &actor).await?;
            let target = resolve(&ac, &target).await?;
            ac.delegate(&actor, target.id, permission, !revoke).await?;
        }
        Commands::AssignRole { actor, target, role } => {
            let actor = resolve(&ac, &actor).await?;
            let target = resolve(&ac, &target).await?;
            let user = ac.assign_role(&actor, target.id, &role).await?;
            print_json(&UserSummary::from(&user))?;
        }
        Commands::Deactivate { actor, target } => {
            let actor = resolve(&ac, &actor).await?;
            let target = resolve(&ac, &target).await?;
            let user = ac.deactivate_user(&actor, target.id).await?;
            print_json(&UserSummary::from(&user))?;
        }
    }

    // Audit events are printed for the operator; a deployment would forward them instead.
    while let Ok(event) = audit_rx.try_recv() {
        let fingerprint = event.fingerprint();
        print_json(&json!({ "audit": event, "fingerprint": fingerprint }))?;
    }

    Ok(())
}

/// Accept either a user id or a username.
async fn resolve(ac: &AccessControl<SqliteUserStore>, key: &str) -> anyhow::Result<User> {
    if let Ok(id) = Uuid::parse_str(key) {
        return Ok(ac.load_user(id).await?);
    }
    ac.find_user(key)
        .await?
        .with_context(|| format!("no user named {key}"))
}

fn print_roles(registry: &RoleRegistry) -> anyhow::Result<()> {
    print_json(&json!({
        "fingerprint": registry.fingerprint(),
        "registry": registry.to_config(),
    }))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
