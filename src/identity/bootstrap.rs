//! Minting the service's own account and client token.

use crate::components::auth::{Account, Auth, AuthOption, GenerateOptions, TokenOptions};
use crate::components::server::Server;
use crate::error::Result;

use super::ServiceIdentity;

/// Generate the account `"{name}-{id}"`, issue a token for it and install
/// that token as the auth provider's active client token.
pub fn register_account(server: &dyn Server, auth: &dyn Auth) -> Result<Account> {
    let server_opts = server.options();
    let identity = ServiceIdentity::new(
        server_opts.name,
        server_opts.id,
        auth.options().namespace,
    );
    let role = identity.role();

    let account = auth.generate(
        &identity.account_name(),
        GenerateOptions::default()
            .role(role.as_str())
            .namespace(identity.namespace.clone()),
    )?;

    let token = auth.token(TokenOptions::credentials(&account.id, &account.secret))?;
    auth.init(vec![AuthOption::ClientToken(token)])?;

    tracing::info!(
        role = %role,
        namespace = %account.namespace,
        "Auth [{}] Authenticated as {}",
        auth.name(),
        account.id
    );
    Ok(account)
}
