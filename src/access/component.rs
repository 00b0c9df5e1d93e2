use super::AccessContext;
use crate::error::{Error, Result};
use crate::platform::{AuthorizationInfo, Authorizer, PlatformApi};
use crate::registry::SecretProvider;
use crate::store::{ExpiringCredentialStore, Refreshed, Refresher, SimpleCredentialStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const VERIFY_TICKET_STORE: &str = "verifyTicket";
const ACCESS_TOKEN_STORE: &str = "componentAccessToken";
const PRE_AUTH_CODE_STORE: &str = "preAuthCode";

const COMPONENT_LOGIN_PAGE: &str = "https://mp.weixin.qq.com/cgi-bin/componentloginpage";

/// Which kinds of account the authorization page offers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthType {
    OfficialAccount,
    MiniProgram,
    Both,
}

impl AuthType {
    fn as_param(self) -> &'static str {
        match self {
            AuthType::OfficialAccount => "1",
            AuthType::MiniProgram => "2",
            AuthType::Both => "3",
        }
    }
}

/// Credentials of a platform (component) tenant that acts on behalf of
/// delegated applications.
pub struct ComponentCredentials {
    appid: String,
    api: Arc<dyn PlatformApi>,
    verify_ticket: Arc<SimpleCredentialStore>,
    access_token: Arc<ExpiringCredentialStore>,
    pre_auth_code: ExpiringCredentialStore,
}

impl ComponentCredentials {
    pub fn new(ctx: &AccessContext, appid: impl Into<String>) -> Self {
        let verify_ticket = Arc::new(SimpleCredentialStore::new(
            VERIFY_TICKET_STORE,
            ctx.storage.values.clone(),
        ));

        let access_token = Arc::new(ctx.expiring_store(
            ACCESS_TOKEN_STORE,
            AccessTokenRefresher {
                verify_ticket: verify_ticket.clone(),
                secrets: ctx.secrets.clone(),
                api: ctx.api.clone(),
            },
        ));

        let pre_auth_code = ctx.expiring_store(
            PRE_AUTH_CODE_STORE,
            PreAuthCodeRefresher {
                access_token: access_token.clone(),
                api: ctx.api.clone(),
            },
        );

        Self {
            appid: appid.into(),
            api: ctx.api.clone(),
            verify_ticket,
            access_token,
            pre_auth_code,
        }
    }

    pub fn appid(&self) -> &str {
        &self.appid
    }

    /// Records the ticket the platform pushes every ten minutes.
    pub async fn set_verify_ticket(&self, ticket: &str) -> Result<()> {
        self.verify_ticket.set(&self.appid, ticket).await
    }

    pub async fn verify_ticket(&self) -> Result<Option<String>> {
        self.verify_ticket.get(&self.appid).await
    }

    pub async fn access_token(&self) -> Result<String> {
        self.access_token.get(&self.appid).await
    }

    pub async fn pre_auth_code(&self) -> Result<String> {
        self.pre_auth_code.get(&self.appid).await
    }

    pub fn access_token_store(&self) -> &ExpiringCredentialStore {
        &self.access_token
    }

    pub fn pre_auth_code_store(&self) -> &ExpiringCredentialStore {
        &self.pre_auth_code
    }

    /// Describes a delegated application. Read-through, nothing is cached.
    pub async fn authorizer(&self, authorizer_appid: &str) -> Result<Authorizer> {
        let token = self.access_token().await?;
        self.api
            .authorizer_info(&self.appid, authorizer_appid, &token)
            .await
    }

    /// Exchanges the authorization code delivered with a grant.
    pub async fn query_authorization(&self, authorization_code: &str) -> Result<AuthorizationInfo> {
        let token = self.access_token().await?;
        let info = self
            .api
            .query_auth(&self.appid, authorization_code, &token)
            .await?;

        info!(
            component = %self.appid,
            authorizer = %info.authorizer_appid,
            scopes = info.func_info.len(),
            "Authorization code exchanged"
        );
        Ok(info)
    }

    /// Link to the page where an account owner grants this platform access.
    pub async fn authorization_url(&self, redirect_uri: &str, auth_type: AuthType) -> Result<String> {
        let code = self.pre_auth_code().await?;
        Ok(format!(
            "{}?component_appid={}&pre_auth_code={}&redirect_uri={}&auth_type={}",
            COMPONENT_LOGIN_PAGE,
            urlencoding::encode(&self.appid),
            urlencoding::encode(&code),
            urlencoding::encode(redirect_uri),
            auth_type.as_param(),
        ))
    }
}

struct AccessTokenRefresher {
    verify_ticket: Arc<SimpleCredentialStore>,
    secrets: Arc<dyn SecretProvider>,
    api: Arc<dyn PlatformApi>,
}

#[async_trait]
impl Refresher for AccessTokenRefresher {
    async fn refresh(&self, component_appid: &str, _refresh_token: &str) -> Result<Refreshed> {
        let ticket = self
            .verify_ticket
            .get(component_appid)
            .await?
            .ok_or_else(|| Error::MissingVerifyTicket(component_appid.to_string()))?;
        let secret = self.secrets.secret(component_appid).await?;

        let token = self
            .api
            .component_access_token(component_appid, &secret, &ticket)
            .await?;
        Ok(Refreshed::new(token.token, token.expires_in))
    }
}

struct PreAuthCodeRefresher {
    access_token: Arc<ExpiringCredentialStore>,
    api: Arc<dyn PlatformApi>,
}

#[async_trait]
impl Refresher for PreAuthCodeRefresher {
    async fn refresh(&self, component_appid: &str, _refresh_token: &str) -> Result<Refreshed> {
        let token = self.access_token.get(component_appid).await?;
        let code = self
            .api
            .create_pre_auth_code(component_appid, &token)
            .await?;
        Ok(Refreshed::new(code.pre_auth_code, code.expires_in))
    }
}
