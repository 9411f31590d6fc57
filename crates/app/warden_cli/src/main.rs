// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::io::BufRead;

use clap::Parser;
use cli::{Cli, Commands};
use sqlx::postgres::PgPoolOptions;
use warden_core::models::auth::UserProfile;
use warden_core::store::PgStore;

mod admin;
mod cli;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let args = Cli::parse();

    match args.command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        Commands::HashPassword => {
            let password = read_password()?;
            println!("{}", warden_core::auth::password::hash_password(&password)?);
        }
        Commands::CreateAdmin {
            username,
            email,
            full_name,
            password,
            database_url,
        } => {
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            let spec = admin::AdminSpec {
                full_name: full_name.unwrap_or_else(|| username.clone()),
                username,
                email,
                password,
            };
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let user = runtime.block_on(bootstrap_admin(&database_url, spec))?;
            println!("{}", user.id);
        }
    }

    Ok(())
}

async fn bootstrap_admin(database_url: &str, spec: admin::AdminSpec) -> Result<UserProfile> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;
    warden_core::migrate::migrate(&pool).await?;
    admin::create_admin(&PgStore::new(pool), spec).await
}

/// First line of stdin, without the line terminator.
fn read_password() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(Error::Custom("no password given on stdin".into()));
    }
    Ok(password)
}
