//! Command line and environment binding.
//!
//! # Data Flow
//! ```text
//! argv / env
//!     → Flags (clap, env fallbacks)
//!     → optional --config TOML file (config::loader)
//!     → flags overlaid on file values → validated
//!     → bound into server, auth, client, store, broker and Options
//! ```
//!
//! Registry, runtime and profiler carry no flag-settable options; they are
//! chosen through `options` overrides only.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;

use crate::components::auth::{self, AuthOption};
use crate::components::broker::BrokerOption;
use crate::components::server::ServerOption;
use crate::components::store::StoreOption;
use crate::config::loader::{load_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::rpc::{Client, HttpClient};

/// Application identity used by the flag parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct App {
    pub name: String,
    pub version: String,
}

pub trait Cmd: Send + Sync {
    fn app(&self) -> App;

    fn set_app_name(&self, name: &str);

    /// Parse flags/env and bind them into the collaborators held by `opts`.
    fn init(&self, opts: &mut Options) -> Result<()>;
}

#[derive(Parser, Debug, Default, Clone)]
#[command(about = "Service lifecycle flags", long_about = None)]
pub struct Flags {
    /// Path of a TOML config file
    #[arg(long, env = "SERVICE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of the service
    #[arg(long, env = "SERVICE_SERVER_NAME")]
    pub server_name: Option<String>,

    /// Instance id of this process
    #[arg(long, env = "SERVICE_SERVER_ID")]
    pub server_id: Option<String>,

    #[arg(long, env = "SERVICE_SERVER_VERSION")]
    pub server_version: Option<String>,

    /// Listen address (e.g., "0.0.0.0:8080")
    #[arg(long, env = "SERVICE_SERVER_ADDRESS")]
    pub server_address: Option<String>,

    /// Registration TTL in seconds
    #[arg(long, env = "SERVICE_REGISTER_TTL", value_name = "SECONDS")]
    pub register_ttl: Option<u64>,

    /// Auth provider
    #[arg(long, env = "SERVICE_AUTH_PROVIDER", value_parser = auth::PROVIDERS)]
    pub auth_provider: Option<String>,

    #[arg(long, env = "SERVICE_AUTH_NAMESPACE")]
    pub auth_namespace: Option<String>,

    /// Deadline of outbound calls in seconds
    #[arg(long, env = "SERVICE_CLIENT_TIMEOUT", value_name = "SECONDS")]
    pub client_timeout: Option<u64>,

    #[arg(long, env = "SERVICE_STORE_DATABASE")]
    pub store_database: Option<String>,

    #[arg(long, env = "SERVICE_STORE_TABLE")]
    pub store_table: Option<String>,

    #[arg(long, env = "SERVICE_BROKER_ADDRESS")]
    pub broker_address: Option<String>,
}

impl Flags {
    /// Explicit flags win over config file values.
    pub fn overlay(&self, config: &mut ServiceConfig) {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        set(&mut config.server.name, &self.server_name);
        set(&mut config.server.id, &self.server_id);
        set(&mut config.server.version, &self.server_version);
        set(&mut config.server.address, &self.server_address);
        set(&mut config.server.register_ttl_secs, &self.register_ttl);
        set(&mut config.auth.provider, &self.auth_provider);
        set(&mut config.auth.namespace, &self.auth_namespace);
        set(&mut config.client.timeout_secs, &self.client_timeout);
        set(&mut config.store.database, &self.store_database);
        set(&mut config.store.table, &self.store_table);
        set(&mut config.broker.address, &self.broker_address);
    }
}

/// Bind a validated config into the collaborators held by `opts`.
pub fn apply_config(config: &ServiceConfig, opts: &mut Options) -> Result<()> {
    let mut server = Vec::new();
    if let Some(name) = &config.server.name {
        server.push(ServerOption::Name(name.clone()));
    }
    if let Some(id) = &config.server.id {
        server.push(ServerOption::Id(id.clone()));
    }
    if let Some(version) = &config.server.version {
        server.push(ServerOption::Version(version.clone()));
    }
    if let Some(address) = &config.server.address {
        server.push(ServerOption::Address(address.clone()));
    }
    if let Some(ttl) = config.server.register_ttl_secs {
        server.push(ServerOption::RegisterTtl(Duration::from_secs(ttl)));
    }
    if !server.is_empty() {
        opts.server.get().init(server);
    }

    if let Some(name) = &config.auth.provider {
        if opts.auth.get().name() != name {
            opts.auth.set(auth::provider(name)?);
            tracing::debug!(provider = %name, "Auth provider replaced");
        }
    }

    let mut auth = Vec::new();
    if let Some(namespace) = &config.auth.namespace {
        auth.push(AuthOption::Namespace(namespace.clone()));
    }
    if let Some(endpoints) = &config.auth.public_endpoints {
        auth.push(AuthOption::PublicEndpoints(endpoints.clone()));
    }
    if let Some(secs) = config.auth.token_expiry_secs {
        auth.push(AuthOption::TokenExpiry(Duration::from_secs(secs)));
    }
    if !auth.is_empty() {
        opts.auth.get().init(auth)?;
    }

    if let Some(secs) = config.client.timeout_secs {
        opts.client = Client::new(HttpClient::new(
            opts.registry.clone(),
            Duration::from_secs(secs),
        ));
    }

    let mut store = Vec::new();
    if let Some(database) = &config.store.database {
        store.push(StoreOption::Database(database.clone()));
    }
    if let Some(table) = &config.store.table {
        store.push(StoreOption::Table(table.clone()));
    }
    if !store.is_empty() {
        opts.store.get().init(store)?;
    }

    if let Some(address) = &config.broker.address {
        opts.broker
            .get()
            .init(vec![BrokerOption::Address(address.clone())])?;
    }

    if let Some(signal) = config.signal {
        opts.signal = signal;
    }

    Ok(())
}

/// Clap-backed [`Cmd`] reading the process arguments (or a fixed list).
pub struct FlagCmd {
    args: Option<Vec<OsString>>,
    app: RwLock<App>,
}

impl FlagCmd {
    /// Parse the process's own arguments.
    pub fn new() -> Self {
        Self {
            args: None,
            app: RwLock::new(App::default()),
        }
    }

    /// Parse `args` instead of the process arguments; the first item is the
    /// binary name.
    pub fn from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self {
            args: Some(args.into_iter().map(Into::into).collect()),
            app: RwLock::new(App::default()),
        }
    }

    fn parse(&self) -> Result<Flags> {
        let parsed = match &self.args {
            Some(args) => Flags::try_parse_from(args.iter().cloned()),
            None => Flags::try_parse(),
        };

        match parsed {
            Ok(flags) => Ok(flags),
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                e.exit()
            }
            Err(e) => Err(Error::Flags(e.to_string())),
        }
    }
}

impl Default for FlagCmd {
    fn default() -> Self {
        Self::new()
    }
}

impl Cmd for FlagCmd {
    fn app(&self) -> App {
        self.app
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set_app_name(&self, name: &str) {
        self.app
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .name = name.to_string();
    }

    fn init(&self, opts: &mut Options) -> Result<()> {
        let flags = self.parse()?;

        let mut config = match &flags.config {
            Some(path) => load_config(path)
                .map_err(|e| Error::Flags(format!("{}: {}", path.display(), e)))?,
            None => ServiceConfig::default(),
        };
        flags.overlay(&mut config);

        validate_config(&config)
            .map_err(|errors| Error::Flags(ConfigError::Validation(errors).to_string()))?;
        apply_config(&config, opts).map_err(|e| Error::Flags(e.to_string()))?;

        tracing::debug!(app = %self.app().name, "Flags bound");
        Ok(())
    }
}
