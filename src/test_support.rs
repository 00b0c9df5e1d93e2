//! Fixtures shared by the unit tests.

use crate::access::AccessContext;
use crate::clock::ManualClock;
use crate::config::TenantConfig;
use crate::error::{Error, Result};
use crate::platform::{
    AccessToken, AuthorizationInfo, Authorizer, AuthorizerToken, ComponentAccessToken,
    PlatformApi, PreAuthCode, Ticket, UserToken,
};
use crate::registry::TenantDirectory;
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) const ENCODING_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";

/// Platform stub with fixed answers. Records every call as `op(arg,...)`.
#[derive(Default)]
pub(crate) struct StubApi {
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl StubApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, op: &str) -> usize {
        let prefix = format!("{}(", op);
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, op: &str, args: &[&str]) -> Result<()> {
        self.calls.lock().push(format!("{}({})", op, args.join(",")));
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Api {
                code: -1,
                message: "system error".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformApi for StubApi {
    async fn component_access_token(
        &self,
        component_appid: &str,
        component_secret: &str,
        verify_ticket: &str,
    ) -> Result<ComponentAccessToken> {
        self.record(
            "component_access_token",
            &[component_appid, component_secret, verify_ticket],
        )?;
        Ok(ComponentAccessToken {
            token: "PLAT_TOK".to_string(),
            expires_in: 7200,
        })
    }

    async fn create_pre_auth_code(
        &self,
        component_appid: &str,
        component_token: &str,
    ) -> Result<PreAuthCode> {
        self.record("create_pre_auth_code", &[component_appid, component_token])?;
        Ok(PreAuthCode {
            pre_auth_code: "PRE_CODE".to_string(),
            expires_in: 1800,
        })
    }

    async fn authorizer_info(
        &self,
        component_appid: &str,
        authorizer_appid: &str,
        component_token: &str,
    ) -> Result<Authorizer> {
        self.record(
            "authorizer_info",
            &[component_appid, authorizer_appid, component_token],
        )?;
        Ok(Authorizer {
            authorization_info: AuthorizationInfo {
                authorizer_appid: authorizer_appid.to_string(),
                token: AuthorizerToken {
                    authorizer_refresh_token: "R1".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn query_auth(
        &self,
        component_appid: &str,
        authorization_code: &str,
        component_token: &str,
    ) -> Result<AuthorizationInfo> {
        self.record(
            "query_auth",
            &[component_appid, authorization_code, component_token],
        )?;
        Ok(AuthorizationInfo {
            authorizer_appid: "app3".to_string(),
            func_info: Vec::new(),
            token: AuthorizerToken {
                authorizer_access_token: "GRANTED_TOK".to_string(),
                expires_in: 7200,
                authorizer_refresh_token: "GRANTED_R".to_string(),
            },
        })
    }

    async fn refresh_authorizer_token(
        &self,
        component_appid: &str,
        authorizer_appid: &str,
        refresh_token: &str,
        component_token: &str,
    ) -> Result<AuthorizerToken> {
        self.record(
            "refresh_authorizer_token",
            &[component_appid, authorizer_appid, refresh_token, component_token],
        )?;
        Ok(AuthorizerToken {
            authorizer_access_token: "APP_TOK".to_string(),
            expires_in: 7200,
            authorizer_refresh_token: "R2".to_string(),
        })
    }

    async fn app_access_token(&self, appid: &str, secret: &str) -> Result<AccessToken> {
        self.record("app_access_token", &[appid, secret])?;
        Ok(AccessToken {
            access_token: "DIRECT_TOK".to_string(),
            expires_in: 7200,
        })
    }

    async fn jsapi_ticket(&self, access_token: &str) -> Result<Ticket> {
        self.record("jsapi_ticket", &[access_token])?;
        Ok(Ticket {
            ticket: "JS_TICKET".to_string(),
            expires_in: 7200,
        })
    }

    async fn user_token_by_code(&self, appid: &str, secret: &str, code: &str) -> Result<UserToken> {
        self.record("user_token_by_code", &[appid, secret, code])?;
        Ok(UserToken {
            access_token: "CODE_USER_TOK".to_string(),
            expires_in: 7200,
            refresh_token: "CODE_USER_R".to_string(),
            openid: "o-code".to_string(),
            scope: "snsapi_base".to_string(),
        })
    }

    async fn component_user_token_by_code(
        &self,
        appid: &str,
        code: &str,
        component_appid: &str,
        component_token: &str,
    ) -> Result<UserToken> {
        self.record(
            "component_user_token_by_code",
            &[appid, code, component_appid, component_token],
        )?;
        Ok(UserToken {
            access_token: "COMP_CODE_USER_TOK".to_string(),
            expires_in: 7200,
            refresh_token: "COMP_CODE_USER_R".to_string(),
            openid: "o-code".to_string(),
            scope: "snsapi_userinfo".to_string(),
        })
    }

    async fn refresh_user_token(&self, appid: &str, refresh_token: &str) -> Result<UserToken> {
        self.record("refresh_user_token", &[appid, refresh_token])?;
        Ok(UserToken {
            access_token: "USER_TOK".to_string(),
            expires_in: 7200,
            refresh_token: "USER_R2".to_string(),
            ..Default::default()
        })
    }

    async fn refresh_component_user_token(
        &self,
        appid: &str,
        refresh_token: &str,
        component_appid: &str,
        component_token: &str,
    ) -> Result<UserToken> {
        self.record(
            "refresh_component_user_token",
            &[appid, refresh_token, component_appid, component_token],
        )?;
        Ok(UserToken {
            access_token: "COMP_USER_TOK".to_string(),
            expires_in: 7200,
            refresh_token: "USER_R3".to_string(),
            ..Default::default()
        })
    }
}

/// `comp1` (component with key material), `app1` delegated to it, `app2`
/// direct with its own key, `app4` direct in plaintext mode.
pub(crate) fn directory() -> Arc<TenantDirectory> {
    Arc::new(TenantDirectory::from_config(&[
        TenantConfig {
            appid: "comp1".to_string(),
            secret: Some("component-secret".to_string()),
            token: Some("comp-token".to_string()),
            encoding_aes_key: Some(ENCODING_KEY.to_string()),
            component_appid: None,
        },
        TenantConfig {
            appid: "app1".to_string(),
            token: Some("app1-token".to_string()),
            encoding_aes_key: Some(ENCODING_KEY.to_string()),
            component_appid: Some("comp1".to_string()),
            ..Default::default()
        },
        TenantConfig {
            appid: "app2".to_string(),
            secret: Some("app2-secret".to_string()),
            token: Some("app2-token".to_string()),
            encoding_aes_key: Some(ENCODING_KEY.to_string()),
            component_appid: None,
        },
        TenantConfig {
            appid: "app4".to_string(),
            secret: Some("app4-secret".to_string()),
            ..Default::default()
        },
    ]))
}

pub(crate) struct Harness {
    pub api: Arc<StubApi>,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<TenantDirectory>,
    pub ctx: AccessContext,
}

pub(crate) fn harness() -> Harness {
    let api = StubApi::new();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let directory = directory();
    let ctx = AccessContext::new(
        Storage::memory(),
        api.clone(),
        directory.clone(),
        clock.clone(),
    );

    Harness {
        api,
        clock,
        directory,
        ctx,
    }
}
