use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Warden operator CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the version
    Version,

    /// Read a password from stdin and print its bcrypt hash
    HashPassword,

    /// Create an administrator account holding every management permission
    CreateAdmin {
        /// Login name of the administrator
        #[arg(long)]
        username: String,

        /// Email address of the administrator
        #[arg(long)]
        email: String,

        /// Display name; defaults to the username
        #[arg(long)]
        full_name: Option<String>,

        /// Password; read from stdin when not set
        #[arg(long, env = "WARDEN_ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// PostgreSQL connection URL
        #[arg(
            long,
            env = "DATABASE_URL",
            default_value = "postgres://localhost:5432/warden"
        )]
        database_url: String,
    },
}
