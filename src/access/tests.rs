use super::*;
use crate::cipher;
use crate::error::Error;
use crate::platform::UserToken;
use crate::test_support::{harness, Harness};
use chrono::Duration;
use std::sync::Arc;

async fn component_with_ticket(h: &Harness) -> Arc<ComponentCredentials> {
    let component = Arc::new(ComponentCredentials::new(&h.ctx, "comp1"));
    component.set_verify_ticket("ticket@@@1").await.unwrap();
    component
}

#[tokio::test]
async fn test_cold_user_token_is_not_authorized() {
    let h = harness();
    let component = component_with_ticket(&h).await;

    let delegated = ApplicationCredentials::new(&h.ctx, "app1", Some(component));
    let direct = ApplicationCredentials::new(&h.ctx, "app2", None);

    assert!(matches!(
        delegated.user_access_token("user1").await,
        Err(Error::UserNotAuthorized)
    ));
    assert!(matches!(
        direct.user_access_token("user1").await,
        Err(Error::UserNotAuthorized)
    ));
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn test_delegated_chain() {
    let h = harness();
    let component = component_with_ticket(&h).await;
    let app = ApplicationCredentials::new(&h.ctx, "app1", Some(component));

    assert_eq!(app.app_access_token().await.unwrap(), "APP_TOK");
    assert_eq!(
        h.api.calls(),
        vec![
            "component_access_token(comp1,component-secret,ticket@@@1)",
            "authorizer_info(comp1,app1,PLAT_TOK)",
            "refresh_authorizer_token(comp1,app1,R1,PLAT_TOK)",
        ]
    );

    // Within the refresh margin: served from cache.
    h.clock.advance(Duration::seconds(3000));
    assert_eq!(app.app_access_token().await.unwrap(), "APP_TOK");
    assert_eq!(h.api.calls().len(), 3);
}

#[tokio::test]
async fn test_delegated_refresh_uses_rotated_token() {
    let h = harness();
    let component = component_with_ticket(&h).await;
    let app = ApplicationCredentials::new(&h.ctx, "app1", Some(component));
    app.app_access_token().await.unwrap();

    // 7200 - 1200: both the component and the app token are due.
    h.clock.advance(Duration::seconds(6000));
    app.app_access_token().await.unwrap();

    assert_eq!(h.api.count("component_access_token"), 2);
    assert_eq!(h.api.count("authorizer_info"), 1);
    assert_eq!(
        h.api.calls().last().map(String::as_str),
        Some("refresh_authorizer_token(comp1,app1,R2,PLAT_TOK)")
    );
}

#[tokio::test]
async fn test_missing_verify_ticket_propagates() {
    let h = harness();
    let component = Arc::new(ComponentCredentials::new(&h.ctx, "comp1"));
    let app = ApplicationCredentials::new(&h.ctx, "app1", Some(component));

    let err = app.app_access_token().await.unwrap_err();
    match &err {
        Error::Refresh { store, source } => {
            assert_eq!(store, "openPlatformAppAccessToken");
            assert!(matches!(**source, Error::Refresh { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root_cause(), Error::MissingVerifyTicket(id) if id == "comp1"));
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn test_direct_app_token_and_ticket() {
    let h = harness();
    let app = ApplicationCredentials::new(&h.ctx, "app2", None);
    assert!(!app.is_delegated());

    assert_eq!(app.app_ticket().await.unwrap(), "JS_TICKET");
    assert_eq!(app.app_access_token().await.unwrap(), "DIRECT_TOK");
    assert_eq!(
        h.api.calls(),
        vec!["app_access_token(app2,app2-secret)", "jsapi_ticket(DIRECT_TOK)"]
    );
}

#[tokio::test]
async fn test_js_api_signature_uses_cached_ticket() {
    let h = harness();
    let app = ApplicationCredentials::new(&h.ctx, "app2", None);

    let signature = app
        .js_api_signature("nonce1", "https://example.com/page", 1700000000)
        .await
        .unwrap();
    assert_eq!(
        signature,
        cipher::js_api_signature("JS_TICKET", "nonce1", 1700000000, "https://example.com/page")
    );

    app.js_api_signature("nonce2", "https://example.com/other", 1700000001)
        .await
        .unwrap();
    assert_eq!(h.api.count("jsapi_ticket"), 1);
}

#[tokio::test]
async fn test_failed_refresh_leaves_siblings_usable() {
    let h = harness();
    let app = ApplicationCredentials::new(&h.ctx, "app2", None);
    app.app_ticket().await.unwrap();

    h.api.set_failing(true);
    assert!(app.app_access_token_store().refresh("app2").await.is_err());
    assert_eq!(app.app_ticket().await.unwrap(), "JS_TICKET");
    assert_eq!(app.app_access_token().await.unwrap(), "DIRECT_TOK");
}

#[tokio::test]
async fn test_direct_user_token_refresh() {
    let h = harness();
    let app = ApplicationCredentials::new(&h.ctx, "app2", None);

    let token = UserToken {
        access_token: "USER_TOK0".to_string(),
        expires_in: 7200,
        refresh_token: "R0".to_string(),
        openid: "user1".to_string(),
        scope: "snsapi_userinfo".to_string(),
    };
    app.store_user_token("user1", &token).await.unwrap();
    assert_eq!(app.user_access_token("user1").await.unwrap(), "USER_TOK0");
    assert!(h.api.calls().is_empty());

    h.clock.advance(Duration::seconds(6000));
    assert_eq!(app.user_access_token("user1").await.unwrap(), "USER_TOK");
    assert_eq!(h.api.calls(), vec!["refresh_user_token(app2,R0)"]);
}

#[tokio::test]
async fn test_delegated_user_token_refresh() {
    let h = harness();
    let component = component_with_ticket(&h).await;
    let app = ApplicationCredentials::new(&h.ctx, "app1", Some(component));

    let token = UserToken {
        access_token: "USER_TOK0".to_string(),
        expires_in: 60,
        refresh_token: "R0".to_string(),
        ..Default::default()
    };
    app.store_user_token("user1", &token).await.unwrap();

    assert_eq!(app.user_access_token("user1").await.unwrap(), "COMP_USER_TOK");
    assert_eq!(
        h.api.calls().last().map(String::as_str),
        Some("refresh_component_user_token(app1,R0,comp1,PLAT_TOK)")
    );
}

#[tokio::test]
async fn test_authorizer_requires_component() {
    let h = harness();
    let app = ApplicationCredentials::new(&h.ctx, "app2", None);

    assert!(matches!(
        app.authorizer().await,
        Err(Error::ComponentNotConfigured(id)) if id == "app2"
    ));
}

#[tokio::test]
async fn test_authorizer_reads_through() {
    let h = harness();
    let component = component_with_ticket(&h).await;
    let app = ApplicationCredentials::new(&h.ctx, "app1", Some(component));

    let authorizer = app.authorizer().await.unwrap();
    assert_eq!(authorizer.authorization_info.authorizer_appid, "app1");
    app.authorizer().await.unwrap();
    assert_eq!(h.api.count("authorizer_info"), 2);
    assert_eq!(h.api.count("component_access_token"), 1);
}

#[tokio::test]
async fn test_authorization_url() {
    let h = harness();
    let component = component_with_ticket(&h).await;

    let url = component
        .authorization_url("https://example.com/cb?x=1", AuthType::Both)
        .await
        .unwrap();
    assert_eq!(
        url,
        "https://mp.weixin.qq.com/cgi-bin/componentloginpage?component_appid=comp1\
         &pre_auth_code=PRE_CODE&redirect_uri=https%3A%2F%2Fexample.com%2Fcb%3Fx%3D1&auth_type=3"
    );

    assert_eq!(component.pre_auth_code().await.unwrap(), "PRE_CODE");
    assert_eq!(h.api.count("create_pre_auth_code"), 1);
}

#[tokio::test]
async fn test_authorization_grant_seeds_app_token() {
    let h = harness();
    let component = component_with_ticket(&h).await;

    let info = component.query_authorization("code1").await.unwrap();
    let app = ApplicationCredentials::new(&h.ctx, &info.authorizer_appid, Some(component));
    app.store_authorization(&info).await.unwrap();

    assert_eq!(app.app_access_token().await.unwrap(), "GRANTED_TOK");

    h.clock.advance(Duration::seconds(6000));
    assert_eq!(app.app_access_token().await.unwrap(), "APP_TOK");
    assert_eq!(
        h.api.calls().last().map(String::as_str),
        Some("refresh_authorizer_token(comp1,app3,GRANTED_R,PLAT_TOK)")
    );
}

#[tokio::test]
async fn test_revoke_forces_fresh_lookup() {
    let h = harness();
    let component = component_with_ticket(&h).await;
    let app = ApplicationCredentials::new(&h.ctx, "app1", Some(component));
    app.app_access_token().await.unwrap();

    app.revoke().await.unwrap();
    app.app_access_token().await.unwrap();

    assert_eq!(h.api.count("authorizer_info"), 2);
}

#[tokio::test]
async fn test_direct_user_code_exchange() {
    let h = harness();
    let app = ApplicationCredentials::new(&h.ctx, "app2", None);

    let token = app.exchange_user_code("CODE").await.unwrap();
    assert_eq!(token.openid, "o-code");
    assert_eq!(h.api.calls(), vec!["user_token_by_code(app2,app2-secret,CODE)"]);

    // Seeded under the openid; the next expiry refreshes with its refresh token.
    assert_eq!(app.user_access_token("o-code").await.unwrap(), "CODE_USER_TOK");
    h.clock.advance(Duration::seconds(6000));
    assert_eq!(app.user_access_token("o-code").await.unwrap(), "USER_TOK");
    assert_eq!(
        h.api.calls().last().map(String::as_str),
        Some("refresh_user_token(app2,CODE_USER_R)")
    );
}

#[tokio::test]
async fn test_delegated_user_code_exchange() {
    let h = harness();
    let component = component_with_ticket(&h).await;
    let app = ApplicationCredentials::new(&h.ctx, "app1", Some(component));

    app.exchange_user_code("CODE").await.unwrap();

    assert_eq!(
        h.api.calls().last().map(String::as_str),
        Some("component_user_token_by_code(app1,CODE,comp1,PLAT_TOK)")
    );
    assert_eq!(app.user_access_token("o-code").await.unwrap(), "COMP_CODE_USER_TOK");
}

#[tokio::test]
async fn test_failed_code_exchange_stores_nothing() {
    let h = harness();
    let app = ApplicationCredentials::new(&h.ctx, "app2", None);
    h.api.set_failing(true);

    assert!(matches!(
        app.exchange_user_code("CODE").await,
        Err(Error::Api { .. })
    ));
    h.api.set_failing(false);
    assert!(matches!(
        app.user_access_token("o-code").await,
        Err(Error::UserNotAuthorized)
    ));
}

#[tokio::test]
async fn test_oauth_redirect_url() {
    let h = harness();
    let direct = ApplicationCredentials::new(&h.ctx, "app2", None);
    assert_eq!(
        direct.oauth_redirect_url("https://example.com/cb?x=1", OAuthScope::Base, "s1"),
        "https://open.weixin.qq.com/connect/oauth2/authorize?appid=app2\
         &redirect_uri=https%3A%2F%2Fexample.com%2Fcb%3Fx%3D1\
         &response_type=code&scope=snsapi_base&state=s1#wechat_redirect"
    );

    let component = Arc::new(ComponentCredentials::new(&h.ctx, "comp1"));
    let delegated = ApplicationCredentials::new(&h.ctx, "app1", Some(component));
    let url = delegated.oauth_redirect_url("https://example.com/cb", OAuthScope::UserInfo, "s2");
    assert!(url.contains("scope=snsapi_userinfo"));
    assert!(url.ends_with("&component_appid=comp1#wechat_redirect"));
    assert!(h.api.calls().is_empty());
}
