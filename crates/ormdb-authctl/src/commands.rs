//! Command execution against a data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use ormdb_auth::{
    AdminError, AuthDecision, AuthError, ConfigError, Deployment, NativeAuthService,
    ProviderSpec, SledCredentialStore, StoreError,
};

use crate::config::{Args, Command};

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database {0} does not exist")]
    NoSuchDatabase(String),

    #[error("system-wide login needs --via <database>")]
    MissingVia,

    #[error("authentication failed")]
    NotAuthenticated,
}

/// Every database found under the data directory, booted and registered.
struct Host {
    deployment: Arc<Deployment>,
}

impl Host {
    fn open(args: &Args, create: Option<&str>) -> Result<Self, CliError> {
        std::fs::create_dir_all(&args.data_path)?;
        let deployment = Deployment::new();

        let created = match create {
            Some(name) => {
                let dir = database_dir(&args.data_path, &deployment, name);
                if dir.exists() {
                    None
                } else {
                    std::fs::create_dir_all(&dir)?;
                    info!(database = name, "created database");
                    Some(dir)
                }
            }
            None => None,
        };

        for entry in std::fs::read_dir(&args.data_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_new = created.as_deref() == Some(entry.path().as_path());

            let config = args.auth_config(&name, is_new)?;
            let store = Arc::new(SledCredentialStore::open_path(&entry.path())?);
            let service = NativeAuthService::boot_with_canonicalizer(
                &config,
                store,
                deployment.opener(),
                deployment.canonicalizer(),
            )?;
            debug!(database = %name, provider = %service.spec(), "opened database");
            deployment.register(Arc::new(service));
        }

        Ok(Self { deployment })
    }

    fn service(&self, name: &str) -> Result<Arc<NativeAuthService>, CliError> {
        self.deployment
            .get(name)
            .ok_or_else(|| CliError::NoSuchDatabase(name.to_string()))
    }
}

fn database_dir(root: &Path, deployment: &Deployment, name: &str) -> PathBuf {
    root.join(deployment.canonicalizer().canonicalize(name).as_str())
}

/// Run a command, returning the text to print.
pub async fn run(args: Args) -> Result<String, CliError> {
    match &args.command {
        Command::Check { provider } => {
            let spec = ProviderSpec::parse(provider)?;
            Ok(format!(
                "mode={:?} authority={}",
                spec.mode(),
                spec.authority_database().unwrap_or("-")
            ))
        }

        Command::Login {
            database,
            via,
            user,
            password,
            create,
        } => {
            let create_target = if *create { database.as_deref() } else { None };
            let host = Host::open(&args, create_target)?;

            let decision = match (database.as_deref(), via.as_deref()) {
                (Some(db), _) => {
                    host.service(db)?
                        .authenticate(Some(user.as_str()), password, Some(db))
                        .await
                }
                (None, Some(via)) => {
                    host.service(via)?
                        .authenticate(Some(user.as_str()), password, None)
                        .await
                }
                (None, None) => return Err(CliError::MissingVia),
            };

            match decision {
                AuthDecision::Accepted => Ok("authenticated".to_string()),
                AuthDecision::Rejected => Err(CliError::NotAuthenticated),
                AuthDecision::Fault(e) => Err(e.into()),
            }
        }

        Command::AddUser {
            database,
            user,
            password,
        } => {
            let host = Host::open(&args, None)?;
            host.service(database)?.add_user(user, password)?;
            Ok(format!("added {} to {}", user, database))
        }

        Command::DropUser { database, user } => {
            let host = Host::open(&args, None)?;
            host.service(database)?.drop_user(user)?;
            Ok(format!("dropped {} from {}", user, database))
        }

        Command::SetProvider {
            database,
            value,
            owner,
        } => {
            let host = Host::open(&args, None)?;
            host.service(database)?
                .set_database_provider(value.as_deref(), owner)?;
            Ok(format!(
                "stored provider {} for {}",
                value.as_deref().unwrap_or("<none>"),
                database
            ))
        }
    }
}
