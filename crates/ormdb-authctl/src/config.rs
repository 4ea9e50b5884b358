//! Command-line configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ormdb_auth::{AuthConfig, ConfigError};

/// Default data directory; each database lives in its own subdirectory.
pub const DEFAULT_DATA_PATH: &str = "./data";

/// ORMDB native authentication administration.
#[derive(Parser, Debug)]
#[command(name = "ormdb-authctl")]
#[command(version, about = "ORMDB native authentication administration", long_about = None)]
pub struct Args {
    /// Directory holding one subdirectory per database.
    #[arg(short, long, default_value = DEFAULT_DATA_PATH)]
    pub data_path: PathBuf,

    /// Authentication provider (overrides ORMDB_AUTH_PROVIDER).
    #[arg(long)]
    pub provider: Option<String>,

    /// Delegated login timeout in seconds (overrides ORMDB_AUTH_TIMEOUT_SECS).
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a provider string and show how it routes.
    Check {
        /// Provider value, e.g. NATIVE:credDB:LOCAL.
        provider: String,
    },

    /// Authenticate a principal, creating the database first if asked.
    Login {
        /// Target database; omit for a system-wide operation.
        #[arg(long)]
        database: Option<String>,

        /// Database servicing a system-wide operation.
        #[arg(long, conflicts_with = "database")]
        via: Option<String>,

        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        password: String,

        /// Create the target database if it does not exist.
        #[arg(long, requires = "database")]
        create: bool,
    },

    /// Add a user to a database.
    AddUser {
        #[arg(long)]
        database: String,
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        password: String,
    },

    /// Drop a user from a database.
    DropUser {
        #[arg(long)]
        database: String,
        #[arg(short, long)]
        user: String,
    },

    /// Persist a database's provider property (takes effect at next boot).
    SetProvider {
        #[arg(long)]
        database: String,

        /// Provider value; omit to clear.
        #[arg(long)]
        value: Option<String>,

        /// Database owner who must already hold credentials.
        #[arg(long, default_value = "dbo")]
        owner: String,
    },
}

impl Args {
    /// Merge environment settings with command-line overrides for one
    /// database.
    pub fn auth_config(&self, database: &str, create: bool) -> Result<AuthConfig, ConfigError> {
        let mut config = AuthConfig::from_env(database)?.creating(create);
        if let Some(provider) = &self.provider {
            config = config.with_provider(provider.clone());
        }
        if let Some(secs) = self.timeout {
            config = config.with_delegate_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login() {
        let args = Args::try_parse_from([
            "ormdb-authctl",
            "--provider",
            "NATIVE:credDB",
            "login",
            "--database",
            "credDB",
            "-u",
            "dbo",
            "-p",
            "pw",
            "--create",
        ])
        .unwrap();

        assert_eq!(args.data_path, PathBuf::from(DEFAULT_DATA_PATH));
        match args.command {
            Command::Login { database, create, .. } => {
                assert_eq!(database.as_deref(), Some("credDB"));
                assert!(create);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_create_requires_database() {
        let result = Args::try_parse_from([
            "ormdb-authctl", "login", "-u", "dbo", "-p", "pw", "--create",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_auth_config_overrides() {
        let args = Args::try_parse_from([
            "ormdb-authctl",
            "--provider",
            "NATIVE::LOCAL",
            "--timeout",
            "3",
            "check",
            "NATIVE::LOCAL",
        ])
        .unwrap();

        let config = args.auth_config("db", true).unwrap();
        assert_eq!(config.provider.as_deref(), Some("NATIVE::LOCAL"));
        assert_eq!(config.delegate_timeout, Duration::from_secs(3));
        assert!(config.create);
    }
}
