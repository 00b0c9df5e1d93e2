use super::{AccessContext, ComponentCredentials};
use crate::cipher;
use crate::error::{Error, Result};
use crate::platform::{AuthorizationInfo, Authorizer, PlatformApi, UserToken};
use crate::registry::SecretProvider;
use crate::store::{ExpiringCredentialStore, Refreshed, Refresher};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

const DELEGATED_APP_TOKEN_STORE: &str = "openPlatformAppAccessToken";
const DIRECT_APP_TOKEN_STORE: &str = "publicPlatformAppAccessToken";
const APP_TICKET_STORE: &str = "appTicket";
const DELEGATED_USER_TOKEN_STORE: &str = "openPlatformUserAccessToken";
const DIRECT_USER_TOKEN_STORE: &str = "publicPlatformUserAccessToken";

const OAUTH_AUTHORIZE_PAGE: &str = "https://open.weixin.qq.com/connect/oauth2/authorize";

/// What an OAuth redirect asks the end user to grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OAuthScope {
    /// Silent redirect. Only the openid is disclosed.
    Base,
    /// Prompts the user and discloses the profile.
    UserInfo,
}

impl OAuthScope {
    fn as_param(self) -> &'static str {
        match self {
            OAuthScope::Base => "snsapi_base",
            OAuthScope::UserInfo => "snsapi_userinfo",
        }
    }
}

/// Credentials of one application account.
///
/// With a parent component the application is delegated: its tokens are
/// obtained through the component's access token. Without one it uses its
/// own app secret.
pub struct ApplicationCredentials {
    appid: String,
    component: Option<Arc<ComponentCredentials>>,
    api: Arc<dyn PlatformApi>,
    secrets: Arc<dyn SecretProvider>,
    app_access_token: Arc<ExpiringCredentialStore>,
    app_ticket: ExpiringCredentialStore,
    user_access_token: ExpiringCredentialStore,
}

impl ApplicationCredentials {
    pub fn new(
        ctx: &AccessContext,
        appid: impl Into<String>,
        component: Option<Arc<ComponentCredentials>>,
    ) -> Self {
        let appid = appid.into();

        let app_access_token = Arc::new(match &component {
            Some(component) => ctx.expiring_store(
                DELEGATED_APP_TOKEN_STORE,
                DelegatedAppTokenRefresher {
                    component: component.clone(),
                    api: ctx.api.clone(),
                },
            ),
            None => ctx.expiring_store(
                DIRECT_APP_TOKEN_STORE,
                DirectAppTokenRefresher {
                    secrets: ctx.secrets.clone(),
                    api: ctx.api.clone(),
                },
            ),
        });

        let app_ticket = ctx.expiring_store(
            APP_TICKET_STORE,
            AppTicketRefresher {
                app_access_token: app_access_token.clone(),
                api: ctx.api.clone(),
            },
        );

        let user_store = if component.is_some() {
            DELEGATED_USER_TOKEN_STORE
        } else {
            DIRECT_USER_TOKEN_STORE
        };
        let user_access_token = ctx.expiring_store(
            user_store,
            UserTokenRefresher {
                appid: appid.clone(),
                component: component.clone(),
                api: ctx.api.clone(),
            },
        );

        Self {
            appid,
            component,
            api: ctx.api.clone(),
            secrets: ctx.secrets.clone(),
            app_access_token,
            app_ticket,
            user_access_token,
        }
    }

    pub fn appid(&self) -> &str {
        &self.appid
    }

    /// Parent component, when the application is delegated.
    pub fn component(&self) -> Option<&Arc<ComponentCredentials>> {
        self.component.as_ref()
    }

    pub fn is_delegated(&self) -> bool {
        self.component.is_some()
    }

    pub async fn app_access_token(&self) -> Result<String> {
        self.app_access_token.get(&self.appid).await
    }

    pub async fn app_ticket(&self) -> Result<String> {
        self.app_ticket.get(&self.appid).await
    }

    /// Access token of an end user, refreshed from the stored refresh token.
    ///
    /// Fails with [`Error::UserNotAuthorized`] when no grant is on record.
    pub async fn user_access_token(&self, openid: &str) -> Result<String> {
        self.user_access_token
            .get(openid)
            .await
            .map_err(|e| {
                if matches!(e.root_cause(), Error::UserNotAuthorized) {
                    Error::UserNotAuthorized
                } else {
                    e
                }
            })
    }

    pub fn app_access_token_store(&self) -> &ExpiringCredentialStore {
        &self.app_access_token
    }

    pub fn app_ticket_store(&self) -> &ExpiringCredentialStore {
        &self.app_ticket
    }

    pub fn user_access_token_store(&self) -> &ExpiringCredentialStore {
        &self.user_access_token
    }

    /// Describes this application through its parent component.
    pub async fn authorizer(&self) -> Result<Authorizer> {
        match &self.component {
            Some(component) => component.authorizer(&self.appid).await,
            None => Err(Error::ComponentNotConfigured(self.appid.clone())),
        }
    }

    /// Signature for the browser JS SDK config of `url`.
    pub async fn js_api_signature(&self, nonce: &str, url: &str, timestamp: i64) -> Result<String> {
        let ticket = self.app_ticket().await?;
        Ok(cipher::js_api_signature(&ticket, nonce, timestamp, url))
    }

    /// Records the token obtained when a user completed the OAuth redirect.
    pub async fn store_user_token(&self, openid: &str, token: &UserToken) -> Result<()> {
        self.user_access_token
            .set(
                openid,
                &token.access_token,
                Some(token.refresh_token.as_str()),
                token.expires_in,
            )
            .await
    }

    /// In-app OAuth page that sends the user back to `redirect_uri` with a
    /// `code` and the given `state`.
    pub fn oauth_redirect_url(&self, redirect_uri: &str, scope: OAuthScope, state: &str) -> String {
        let mut url = format!(
            "{}?appid={}&redirect_uri={}&response_type=code&scope={}&state={}",
            OAUTH_AUTHORIZE_PAGE,
            urlencoding::encode(&self.appid),
            urlencoding::encode(redirect_uri),
            scope.as_param(),
            urlencoding::encode(state),
        );
        if let Some(component) = &self.component {
            url.push_str("&component_appid=");
            url.push_str(&urlencoding::encode(component.appid()));
        }
        url.push_str("#wechat_redirect");
        url
    }

    /// Exchanges the `code` of an OAuth redirect and records the user's
    /// token under the returned openid.
    pub async fn exchange_user_code(&self, code: &str) -> Result<UserToken> {
        let token = match &self.component {
            Some(component) => {
                let component_token = component.access_token().await?;
                self.api
                    .component_user_token_by_code(
                        &self.appid,
                        code,
                        component.appid(),
                        &component_token,
                    )
                    .await?
            }
            None => {
                let secret = self.secrets.secret(&self.appid).await?;
                self.api.user_token_by_code(&self.appid, &secret, code).await?
            }
        };

        self.store_user_token(&token.openid, &token).await?;
        info!(appid = %self.appid, openid = %token.openid, "User authorized");
        Ok(token)
    }

    /// Seeds the app token from a fresh authorization grant.
    pub async fn store_authorization(&self, info: &AuthorizationInfo) -> Result<()> {
        self.app_access_token
            .set(
                &self.appid,
                &info.token.authorizer_access_token,
                Some(info.token.authorizer_refresh_token.as_str()),
                info.token.expires_in,
            )
            .await?;

        info!(appid = %self.appid, "Authorization stored");
        Ok(())
    }

    /// Drops the app token and ticket, e.g. after the grant was revoked.
    pub async fn revoke(&self) -> Result<()> {
        self.app_access_token.del(&self.appid).await?;
        self.app_ticket.del(&self.appid).await?;
        info!(appid = %self.appid, "Application credentials revoked");
        Ok(())
    }
}

struct DelegatedAppTokenRefresher {
    component: Arc<ComponentCredentials>,
    api: Arc<dyn PlatformApi>,
}

#[async_trait]
impl Refresher for DelegatedAppTokenRefresher {
    async fn refresh(&self, appid: &str, refresh_token: &str) -> Result<Refreshed> {
        let component_appid = self.component.appid();
        let component_token = self.component.access_token().await?;

        let refresh_token = if refresh_token.is_empty() {
            debug!(component = %component_appid, appid = %appid, "Looking up initial refresh token");
            self.api
                .authorizer_info(component_appid, appid, &component_token)
                .await?
                .authorization_info
                .token
                .authorizer_refresh_token
        } else {
            refresh_token.to_string()
        };

        let token = self
            .api
            .refresh_authorizer_token(component_appid, appid, &refresh_token, &component_token)
            .await?;
        Ok(Refreshed::new(token.authorizer_access_token, token.expires_in)
            .with_refresh_token(token.authorizer_refresh_token))
    }
}

struct DirectAppTokenRefresher {
    secrets: Arc<dyn SecretProvider>,
    api: Arc<dyn PlatformApi>,
}

#[async_trait]
impl Refresher for DirectAppTokenRefresher {
    async fn refresh(&self, appid: &str, _refresh_token: &str) -> Result<Refreshed> {
        let secret = self.secrets.secret(appid).await?;
        let token = self.api.app_access_token(appid, &secret).await?;
        Ok(Refreshed::new(token.access_token, token.expires_in))
    }
}

struct AppTicketRefresher {
    app_access_token: Arc<ExpiringCredentialStore>,
    api: Arc<dyn PlatformApi>,
}

#[async_trait]
impl Refresher for AppTicketRefresher {
    async fn refresh(&self, appid: &str, _refresh_token: &str) -> Result<Refreshed> {
        let token = self.app_access_token.get(appid).await?;
        let ticket = self.api.jsapi_ticket(&token).await?;
        Ok(Refreshed::new(ticket.ticket, ticket.expires_in))
    }
}

/// Keyed by openid; `appid` is the owning application.
struct UserTokenRefresher {
    appid: String,
    component: Option<Arc<ComponentCredentials>>,
    api: Arc<dyn PlatformApi>,
}

#[async_trait]
impl Refresher for UserTokenRefresher {
    async fn refresh(&self, _openid: &str, refresh_token: &str) -> Result<Refreshed> {
        if refresh_token.is_empty() {
            return Err(Error::UserNotAuthorized);
        }

        let token = match &self.component {
            Some(component) => {
                let component_token = component.access_token().await?;
                self.api
                    .refresh_component_user_token(
                        &self.appid,
                        refresh_token,
                        component.appid(),
                        &component_token,
                    )
                    .await?
            }
            None => self.api.refresh_user_token(&self.appid, refresh_token).await?,
        };

        Ok(Refreshed::new(token.access_token, token.expires_in)
            .with_refresh_token(token.refresh_token))
    }
}
