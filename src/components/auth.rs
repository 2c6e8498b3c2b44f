//! Auth provider contract, the allow-all default and an in-memory provider.
//!
//! # Responsibilities
//! - Mint accounts (`generate`) and tokens (`token`)
//! - Resolve a presented access token to its account (`inspect`)
//! - Hold the process's single active client token
//!
//! # Design Decisions
//! - Token material is opaque (uuid v4); nothing here is cryptographic
//! - Refresh tokens are single use and rotate on every refresh

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::rpc::Client;

/// Names accepted by [`provider`].
pub const PROVIDERS: [&str; 2] = ["noop", "memory"];

/// Default lifetime of issued access tokens.
pub const DEFAULT_TOKEN_EXPIRY: Duration = Duration::from_secs(15 * 60);

/// An identity known to the auth provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub secret: String,
    pub roles: BTreeSet<String>,
    pub namespace: String,
    pub metadata: BTreeMap<String, String>,
}

/// Credential material derived from an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub created: SystemTime,
    pub expiry: SystemTime,
}

impl Token {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expiry
    }
}

/// Parameters for [`Auth::generate`].
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub roles: BTreeSet<String>,
    pub namespace: String,
    pub metadata: BTreeMap<String, String>,
    /// Use this secret instead of a random one.
    pub secret: Option<String>,
}

impl GenerateOptions {
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Parameters for [`Auth::token`]: either credentials or a refresh token.
#[derive(Debug, Clone, Default)]
pub struct TokenOptions {
    pub id: Option<String>,
    pub secret: Option<String>,
    pub refresh_token: Option<String>,
    /// Lifetime of the issued token; the provider default when unset.
    pub expiry: Option<Duration>,
}

impl TokenOptions {
    pub fn credentials(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            secret: Some(secret.into()),
            ..Default::default()
        }
    }

    pub fn refresh(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: Some(refresh_token.into()),
            ..Default::default()
        }
    }

    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub namespace: String,
    /// Active client token used for outbound calls.
    pub token: Option<Token>,
    /// Outbound client for providers that call peer services.
    pub client: Option<Client>,
    /// Endpoints reachable without a token.
    pub public_endpoints: Vec<String>,
    pub token_expiry: Duration,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            namespace: "servicekit".to_string(),
            token: None,
            client: None,
            public_endpoints: vec!["Debug.Health".to_string()],
            token_expiry: DEFAULT_TOKEN_EXPIRY,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AuthOption {
    Namespace(String),
    ClientToken(Token),
    WithClient(Client),
    PublicEndpoints(Vec<String>),
    TokenExpiry(Duration),
}

pub trait Auth: Send + Sync {
    fn init(&self, opts: Vec<AuthOption>) -> Result<()>;

    fn options(&self) -> AuthOptions;

    /// Create (or replace) the account `id`.
    fn generate(&self, id: &str, opts: GenerateOptions) -> Result<Account>;

    /// Resolve an access token to its account.
    fn inspect(&self, access_token: &str) -> Result<Account>;

    /// Issue a token from credentials or a refresh token.
    fn token(&self, opts: TokenOptions) -> Result<Token>;

    fn name(&self) -> &'static str;
}

/// Build the provider registered under `name`.
pub fn provider(name: &str) -> Result<Arc<dyn Auth>> {
    match name {
        "noop" => Ok(Arc::new(NoopAuth::new())),
        "memory" => Ok(Arc::new(MemoryAuth::new())),
        other => Err(Error::Auth(format!("unknown auth provider {other:?}"))),
    }
}

fn apply_options(options: &mut AuthOptions, opts: Vec<AuthOption>) -> Result<()> {
    for opt in opts {
        match opt {
            AuthOption::Namespace(ns) if ns.is_empty() => {
                return Err(Error::Auth("namespace must not be empty".into()));
            }
            AuthOption::Namespace(ns) => options.namespace = ns,
            AuthOption::ClientToken(token) => options.token = Some(token),
            AuthOption::WithClient(client) => options.client = Some(client),
            AuthOption::PublicEndpoints(endpoints) => options.public_endpoints = endpoints,
            AuthOption::TokenExpiry(expiry) => options.token_expiry = expiry,
        }
    }
    Ok(())
}

fn mint_token(lifetime: Duration) -> Token {
    let created = SystemTime::now();
    Token {
        access_token: Uuid::new_v4().simple().to_string(),
        refresh_token: Uuid::new_v4().simple().to_string(),
        created,
        expiry: created + lifetime,
    }
}

struct Issued {
    account_id: String,
    expiry: SystemTime,
}

/// Process-local auth provider.
#[derive(Default)]
pub struct MemoryAuth {
    options: RwLock<AuthOptions>,
    accounts: DashMap<String, Account>,
    access: DashMap<String, Issued>,
    refresh: DashMap<String, String>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for `account_id`, dropping access tokens that have
    /// already expired.
    fn issue(&self, account_id: &str, expiry: Option<Duration>) -> Token {
        let token = mint_token(expiry.unwrap_or_else(|| self.options().token_expiry));

        self.access.retain(|_, issued| issued.expiry > token.created);
        self.access.insert(
            token.access_token.clone(),
            Issued {
                account_id: account_id.to_string(),
                expiry: token.expiry,
            },
        );
        self.refresh
            .insert(token.refresh_token.clone(), account_id.to_string());
        token
    }
}

impl Auth for MemoryAuth {
    fn init(&self, opts: Vec<AuthOption>) -> Result<()> {
        let mut options = self
            .options
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        apply_options(&mut options, opts)
    }

    fn options(&self) -> AuthOptions {
        self.options
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn generate(&self, id: &str, opts: GenerateOptions) -> Result<Account> {
        if id.is_empty() {
            return Err(Error::Auth("account id must not be empty".into()));
        }

        let namespace = if opts.namespace.is_empty() {
            self.options().namespace
        } else {
            opts.namespace
        };

        let account = Account {
            id: id.to_string(),
            secret: opts
                .secret
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            roles: opts.roles,
            namespace,
            metadata: opts.metadata,
        };
        self.accounts.insert(account.id.clone(), account.clone());

        tracing::debug!(account = %account.id, namespace = %account.namespace, "Account generated");
        Ok(account)
    }

    fn inspect(&self, access_token: &str) -> Result<Account> {
        if access_token.is_empty() {
            return Err(Error::Auth("missing bearer token".into()));
        }

        let account_id = {
            let issued = self
                .access
                .get(access_token)
                .ok_or_else(|| Error::Auth("invalid token".into()))?;
            if SystemTime::now() >= issued.expiry {
                None
            } else {
                Some(issued.account_id.clone())
            }
        };

        let Some(account_id) = account_id else {
            self.access.remove(access_token);
            return Err(Error::Auth("token expired".into()));
        };

        self.accounts
            .get(&account_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| Error::Auth(format!("account {account_id} no longer exists")))
    }

    fn token(&self, opts: TokenOptions) -> Result<Token> {
        if let Some(refresh_token) = opts.refresh_token {
            let (_, account_id) = self
                .refresh
                .remove(&refresh_token)
                .ok_or_else(|| Error::Auth("invalid refresh token".into()))?;
            return Ok(self.issue(&account_id, opts.expiry));
        }

        let (Some(id), Some(secret)) = (opts.id, opts.secret) else {
            return Err(Error::Auth("credentials or refresh token required".into()));
        };

        let valid = self
            .accounts
            .get(&id)
            .map(|a| a.secret == secret)
            .unwrap_or(false);
        if !valid {
            return Err(Error::Auth("invalid credentials".into()));
        }

        Ok(self.issue(&id, opts.expiry))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Allow-all provider, the default.
///
/// Accounts and tokens are minted but never recorded; `inspect` resolves any
/// token, or none, to an anonymous account in the provider's namespace.
#[derive(Default)]
pub struct NoopAuth {
    options: RwLock<AuthOptions>,
}

impl NoopAuth {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Auth for NoopAuth {
    fn init(&self, opts: Vec<AuthOption>) -> Result<()> {
        let mut options = self
            .options
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        apply_options(&mut options, opts)
    }

    fn options(&self) -> AuthOptions {
        self.options
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn generate(&self, id: &str, opts: GenerateOptions) -> Result<Account> {
        let namespace = if opts.namespace.is_empty() {
            self.options().namespace
        } else {
            opts.namespace
        };

        Ok(Account {
            id: id.to_string(),
            secret: opts
                .secret
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            roles: opts.roles,
            namespace,
            metadata: opts.metadata,
        })
    }

    fn inspect(&self, _access_token: &str) -> Result<Account> {
        Ok(Account {
            id: "anonymous".to_string(),
            namespace: self.options().namespace,
            ..Default::default()
        })
    }

    fn token(&self, opts: TokenOptions) -> Result<Token> {
        Ok(mint_token(
            opts.expiry.unwrap_or_else(|| self.options().token_expiry),
        ))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
