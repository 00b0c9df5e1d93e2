use super::{
    AccessToken, AuthorizationInfo, Authorizer, AuthorizerToken, ComponentAccessToken,
    PlatformApi, PreAuthCode, Ticket, UserToken,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// [`PlatformApi`] over HTTPS.
#[derive(Clone, Debug)]
pub struct HttpPlatformApi {
    client: Client,
    base_url: String,
}

impl HttpPlatformApi {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.weixin.qq.com";

    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        debug!(path = %path, "GET platform endpoint");
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        decode(&response.bytes().await?)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        component_token: Option<&str>,
        body: &Value,
    ) -> Result<T> {
        debug!(path = %path, "POST platform endpoint");
        let mut request = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(token) = component_token {
            request = request.query(&[("component_access_token", token)]);
        }

        let response = request.json(body).send().await?.error_for_status()?;
        decode(&response.bytes().await?)
    }
}

/// Every endpoint reports failures in-band as `{"errcode": n, "errmsg": ...}`,
/// sometimes with HTTP 200. `errcode: 0` is success.
fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let value: Value = serde_json::from_slice(body)?;

    if let Some(code) = value.get("errcode").and_then(Value::as_i64) {
        if code != 0 {
            let message = value
                .get("errmsg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(Error::Api { code, message });
        }
    }

    Ok(serde_json::from_value(value)?)
}

#[derive(Deserialize)]
struct QueryAuthResponse {
    authorization_info: AuthorizationInfo,
}

#[async_trait]
impl PlatformApi for HttpPlatformApi {
    async fn component_access_token(
        &self,
        component_appid: &str,
        component_secret: &str,
        verify_ticket: &str,
    ) -> Result<ComponentAccessToken> {
        self.post(
            "/cgi-bin/component/api_component_token",
            None,
            &json!({
                "component_appid": component_appid,
                "component_appsecret": component_secret,
                "component_verify_ticket": verify_ticket,
            }),
        )
        .await
    }

    async fn create_pre_auth_code(
        &self,
        component_appid: &str,
        component_token: &str,
    ) -> Result<PreAuthCode> {
        self.post(
            "/cgi-bin/component/api_create_preauthcode",
            Some(component_token),
            &json!({ "component_appid": component_appid }),
        )
        .await
    }

    async fn authorizer_info(
        &self,
        component_appid: &str,
        authorizer_appid: &str,
        component_token: &str,
    ) -> Result<Authorizer> {
        self.post(
            "/cgi-bin/component/api_get_authorizer_info",
            Some(component_token),
            &json!({
                "component_appid": component_appid,
                "authorizer_appid": authorizer_appid,
            }),
        )
        .await
    }

    async fn query_auth(
        &self,
        component_appid: &str,
        authorization_code: &str,
        component_token: &str,
    ) -> Result<AuthorizationInfo> {
        let response: QueryAuthResponse = self
            .post(
                "/cgi-bin/component/api_query_auth",
                Some(component_token),
                &json!({
                    "component_appid": component_appid,
                    "authorization_code": authorization_code,
                }),
            )
            .await?;
        Ok(response.authorization_info)
    }

    async fn refresh_authorizer_token(
        &self,
        component_appid: &str,
        authorizer_appid: &str,
        refresh_token: &str,
        component_token: &str,
    ) -> Result<AuthorizerToken> {
        self.post(
            "/cgi-bin/component/api_authorizer_token",
            Some(component_token),
            &json!({
                "component_appid": component_appid,
                "authorizer_appid": authorizer_appid,
                "authorizer_refresh_token": refresh_token,
            }),
        )
        .await
    }

    async fn app_access_token(&self, appid: &str, secret: &str) -> Result<AccessToken> {
        self.get(
            "/cgi-bin/token",
            &[
                ("grant_type", "client_credential"),
                ("appid", appid),
                ("secret", secret),
            ],
        )
        .await
    }

    async fn jsapi_ticket(&self, access_token: &str) -> Result<Ticket> {
        self.get(
            "/cgi-bin/ticket/getticket",
            &[("type", "jsapi"), ("access_token", access_token)],
        )
        .await
    }

    async fn user_token_by_code(&self, appid: &str, secret: &str, code: &str) -> Result<UserToken> {
        self.get(
            "/sns/oauth2/access_token",
            &[
                ("appid", appid),
                ("secret", secret),
                ("code", code),
                ("grant_type", "authorization_code"),
            ],
        )
        .await
    }

    async fn component_user_token_by_code(
        &self,
        appid: &str,
        code: &str,
        component_appid: &str,
        component_token: &str,
    ) -> Result<UserToken> {
        self.get(
            "/sns/oauth2/component/access_token",
            &[
                ("appid", appid),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("component_appid", component_appid),
                ("component_access_token", component_token),
            ],
        )
        .await
    }

    async fn refresh_user_token(&self, appid: &str, refresh_token: &str) -> Result<UserToken> {
        self.get(
            "/sns/oauth2/refresh_token",
            &[
                ("appid", appid),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn refresh_component_user_token(
        &self,
        appid: &str,
        refresh_token: &str,
        component_appid: &str,
        component_token: &str,
    ) -> Result<UserToken> {
        self.get(
            "/sns/oauth2/component/refresh_token",
            &[
                ("appid", appid),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("component_appid", component_appid),
                ("component_access_token", component_token),
            ],
        )
        .await
    }
}
