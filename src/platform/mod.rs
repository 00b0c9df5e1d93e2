//! Remote platform operations used by the credential graph.
//!
//! Everything here is plain request/response plumbing. The credential
//! caches depend on [`PlatformApi`] only, so tests can substitute a stub.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod http;

pub use http::HttpPlatformApi;

/// Platform-level token, exchanged for the verify ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAccessToken {
    #[serde(rename = "component_access_token")]
    pub token: String,
    pub expires_in: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthCode {
    pub pre_auth_code: String,
    pub expires_in: i64,
}

/// Access and refresh token of a delegated application.
///
/// The describe call returns only the refresh token, so every field defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerToken {
    #[serde(default)]
    pub authorizer_access_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub authorizer_refresh_token: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryId {
    pub id: i64,
}

/// One permission set granted by the delegating application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncScope {
    pub funcscope_category: CategoryId,
}

/// What a delegated application granted, plus its tokens when the
/// platform includes them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationInfo {
    pub authorizer_appid: String,
    #[serde(default)]
    pub func_info: Vec<FuncScope>,
    #[serde(flatten)]
    pub token: AuthorizerToken,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessInfo {
    #[serde(default)]
    pub open_store: i64,
    #[serde(default)]
    pub open_scan: i64,
    #[serde(default)]
    pub open_pay: i64,
    #[serde(default)]
    pub open_card: i64,
    #[serde(default)]
    pub open_shake: i64,
}

/// Public profile of a delegated application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizerInfo {
    pub nick_name: String,
    pub head_img: String,
    pub service_type_info: Option<CategoryId>,
    pub verify_type_info: Option<CategoryId>,
    /// Original id (`gh_...`)
    pub user_name: String,
    pub principal_name: String,
    pub alias: String,
    pub business_info: Option<BusinessInfo>,
    pub qrcode_url: String,
    pub signature: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorizer {
    #[serde(default)]
    pub authorizer_info: AuthorizerInfo,
    pub authorization_info: AuthorizationInfo,
}

/// Application token obtained directly with the app secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket: String,
    pub expires_in: i64,
}

/// End-user OAuth token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserToken {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub openid: String,
    #[serde(default)]
    pub scope: String,
}

/// Remote calls needed to keep the credential graph fresh.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Exchanges the pushed verify ticket for a platform token.
    async fn component_access_token(
        &self,
        component_appid: &str,
        component_secret: &str,
        verify_ticket: &str,
    ) -> Result<ComponentAccessToken>;

    async fn create_pre_auth_code(
        &self,
        component_appid: &str,
        component_token: &str,
    ) -> Result<PreAuthCode>;

    /// Describes a delegated application, including its refresh token.
    async fn authorizer_info(
        &self,
        component_appid: &str,
        authorizer_appid: &str,
        component_token: &str,
    ) -> Result<Authorizer>;

    /// Exchanges the authorization code from a grant for the application's tokens.
    async fn query_auth(
        &self,
        component_appid: &str,
        authorization_code: &str,
        component_token: &str,
    ) -> Result<AuthorizationInfo>;

    async fn refresh_authorizer_token(
        &self,
        component_appid: &str,
        authorizer_appid: &str,
        refresh_token: &str,
        component_token: &str,
    ) -> Result<AuthorizerToken>;

    async fn app_access_token(&self, appid: &str, secret: &str) -> Result<AccessToken>;

    /// JS SDK ticket for the given application token.
    async fn jsapi_ticket(&self, access_token: &str) -> Result<Ticket>;

    /// Exchanges the `code` of an OAuth redirect for a user token.
    async fn user_token_by_code(&self, appid: &str, secret: &str, code: &str) -> Result<UserToken>;

    /// Exchanges an OAuth `code` on behalf of a delegated application.
    async fn component_user_token_by_code(
        &self,
        appid: &str,
        code: &str,
        component_appid: &str,
        component_token: &str,
    ) -> Result<UserToken>;

    async fn refresh_user_token(&self, appid: &str, refresh_token: &str) -> Result<UserToken>;

    /// Refreshes a user token on behalf of a delegated application.
    async fn refresh_component_user_token(
        &self,
        appid: &str,
        refresh_token: &str,
        component_appid: &str,
        component_token: &str,
    ) -> Result<UserToken>;
}
