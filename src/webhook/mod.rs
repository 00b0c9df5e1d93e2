//! Receiver for the platform's authorization notifications.
//!
//! The platform pushes a fresh verify ticket every few minutes and reports
//! grants and revocations to the same URL. Bodies are encrypted envelopes
//! unless the component is configured for plaintext, in which case the plain
//! URL signature over the message token authenticates the request.

use crate::cipher::verify_url_signature;
use crate::error::Error;
use crate::registry::CredentialRegistry;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const SUCCESS: &str = "success";

/// Shared webhook state
#[derive(Clone)]
pub struct WebhookState {
    pub registry: Arc<CredentialRegistry>,
}

/// Envelope parameters carried on the query string.
#[derive(Debug, Default, Deserialize)]
pub struct NotifyQuery {
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    pub msg_signature: Option<String>,
    /// Plain URL signature over the message token.
    pub signature: Option<String>,
    pub echostr: Option<String>,
}

/// Decrypted notification body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizationNotify {
    #[serde(rename = "AppId")]
    pub app_id: String,
    #[serde(rename = "CreateTime")]
    pub create_time: i64,
    #[serde(rename = "InfoType")]
    pub info_type: String,
    #[serde(rename = "ComponentVerifyTicket")]
    pub component_verify_ticket: String,
    #[serde(rename = "AuthorizerAppid")]
    pub authorizer_appid: String,
    #[serde(rename = "AuthorizationCode")]
    pub authorization_code: String,
    #[serde(rename = "AuthorizationCodeExpiredTime")]
    pub authorization_code_expired_time: i64,
    #[serde(rename = "PreAuthCode")]
    pub pre_auth_code: String,
}

impl AuthorizationNotify {
    pub fn parse(xml: &[u8]) -> Result<Self, Error> {
        let xml = std::str::from_utf8(xml)
            .map_err(|e| Error::Envelope(format!("notification is not UTF-8: {}", e)))?;
        quick_xml::de::from_str(xml).map_err(|e| Error::Envelope(e.to_string()))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the notification router
pub fn create_router(state: WebhookState) -> Router {
    Router::new()
        .route(
            "/api/notify/:component_appid",
            post(receive_notification).get(verify_url),
        )
        .with_state(Arc::new(state))
}

/// GET /api/notify/:component_appid - URL verification handshake
async fn verify_url(
    State(state): State<Arc<WebhookState>>,
    Path(component_appid): Path<String>,
    Query(query): Query<NotifyQuery>,
) -> Result<String, WebhookError> {
    let (Some(signature), Some(timestamp), Some(nonce), Some(echostr)) =
        (query.signature, query.timestamp, query.nonce, query.echostr)
    else {
        return Err(WebhookError::BadRequest(
            "signature, timestamp, nonce and echostr are required".to_string(),
        ));
    };

    let token = message_token(&state.registry, &component_appid).await?;
    check_url_signature(&component_appid, &token, &signature, &timestamp, &nonce)?;

    info!(component = %component_appid, "Notification URL verified");
    Ok(echostr)
}

/// POST /api/notify/:component_appid - Authorization event notification
async fn receive_notification(
    State(state): State<Arc<WebhookState>>,
    Path(component_appid): Path<String>,
    Query(query): Query<NotifyQuery>,
    body: Bytes,
) -> Result<&'static str, WebhookError> {
    let registry = &state.registry;

    let plaintext = match registry.decrypter(&component_appid).await? {
        Some(cipher) => {
            let (Some(signature), Some(timestamp), Some(nonce)) =
                (&query.msg_signature, &query.timestamp, &query.nonce)
            else {
                return Err(WebhookError::BadRequest(
                    "msg_signature, timestamp and nonce are required".to_string(),
                ));
            };
            cipher.decrypt_envelope(signature, timestamp, nonce, &body)?
        }
        None => {
            let token = message_token(registry, &component_appid).await?;
            let (Some(signature), Some(timestamp), Some(nonce)) =
                (&query.signature, &query.timestamp, &query.nonce)
            else {
                return Err(WebhookError::BadRequest(
                    "signature, timestamp and nonce are required".to_string(),
                ));
            };
            check_url_signature(&component_appid, &token, signature, timestamp, nonce)?;
            body.to_vec()
        }
    };

    let notify = AuthorizationNotify::parse(&plaintext)?;
    debug!(
        component = %component_appid,
        info_type = %notify.info_type,
        create_time = notify.create_time,
        "Notification received"
    );

    match notify.info_type.as_str() {
        "component_verify_ticket" => {
            if notify.component_verify_ticket.is_empty() {
                return Err(WebhookError::BadRequest(
                    "ComponentVerifyTicket is empty".to_string(),
                ));
            }
            registry
                .component(&component_appid)
                .set_verify_ticket(&notify.component_verify_ticket)
                .await?;
            info!(component = %component_appid, "Verify ticket updated");
        }
        "authorized" | "updateauthorized" => {
            if notify.authorization_code.is_empty() {
                return Err(WebhookError::BadRequest(
                    "AuthorizationCode is empty".to_string(),
                ));
            }
            let info = registry
                .component(&component_appid)
                .query_authorization(&notify.authorization_code)
                .await?;
            registry.authorize(&component_appid, &info).await?;
            info!(
                component = %component_appid,
                authorizer = %info.authorizer_appid,
                info_type = %notify.info_type,
                "Authorization granted"
            );
        }
        "unauthorized" => {
            if notify.authorizer_appid.is_empty() {
                return Err(WebhookError::BadRequest(
                    "AuthorizerAppid is empty".to_string(),
                ));
            }
            registry
                .revoke(Some(&component_appid), &notify.authorizer_appid)
                .await?;
            info!(
                component = %component_appid,
                authorizer = %notify.authorizer_appid,
                "Authorization revoked"
            );
        }
        other => {
            warn!(component = %component_appid, info_type = %other, "Unknown notification type");
        }
    }

    Ok(SUCCESS)
}

async fn message_token(
    registry: &CredentialRegistry,
    component_appid: &str,
) -> Result<String, WebhookError> {
    registry
        .message_token(component_appid)
        .await?
        .ok_or_else(|| WebhookError::BadRequest("no message token configured".to_string()))
}

fn check_url_signature(
    component_appid: &str,
    token: &str,
    signature: &str,
    timestamp: &str,
    nonce: &str,
) -> Result<(), WebhookError> {
    if verify_url_signature(token, timestamp, nonce, signature) {
        return Ok(());
    }
    warn!(component = %component_appid, "URL signature mismatch");
    Err(WebhookError::Unauthorized)
}

/// Webhook errors
#[derive(Debug)]
enum WebhookError {
    BadRequest(String),
    Unauthorized,
    Internal(String),
}

impl From<Error> for WebhookError {
    fn from(err: Error) -> Self {
        match err {
            Error::SignatureMismatch => WebhookError::Unauthorized,
            Error::Envelope(msg) | Error::Decode(msg) => WebhookError::BadRequest(msg),
            e @ Error::TenantMismatch { .. } => WebhookError::BadRequest(e.to_string()),
            e => {
                error!(error = %e, "Notification handling failed");
                WebhookError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            WebhookError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            WebhookError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "signature mismatch".to_string())
            }
            WebhookError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verify_ticket_notification() {
        let xml = b"<xml><AppId><![CDATA[comp1]]></AppId><CreateTime>1413192605</CreateTime>\
            <InfoType><![CDATA[component_verify_ticket]]></InfoType>\
            <ComponentVerifyTicket><![CDATA[ticket@@@1]]></ComponentVerifyTicket></xml>";

        let notify = AuthorizationNotify::parse(xml).unwrap();
        assert_eq!(notify.app_id, "comp1");
        assert_eq!(notify.create_time, 1413192605);
        assert_eq!(notify.info_type, "component_verify_ticket");
        assert_eq!(notify.component_verify_ticket, "ticket@@@1");
        assert!(notify.authorization_code.is_empty());
    }

    #[test]
    fn test_parse_authorized_notification() {
        let xml = b"<xml><AppId>comp1</AppId><CreateTime>1413192760</CreateTime>\
            <InfoType>authorized</InfoType><AuthorizerAppid>app3</AuthorizerAppid>\
            <AuthorizationCode>code1</AuthorizationCode>\
            <AuthorizationCodeExpiredTime>1413196360</AuthorizationCodeExpiredTime>\
            <PreAuthCode>PRE_CODE</PreAuthCode></xml>";

        let notify = AuthorizationNotify::parse(xml).unwrap();
        assert_eq!(notify.info_type, "authorized");
        assert_eq!(notify.authorizer_appid, "app3");
        assert_eq!(notify.authorization_code, "code1");
        assert_eq!(notify.authorization_code_expired_time, 1413196360);
        assert_eq!(notify.pre_auth_code, "PRE_CODE");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            AuthorizationNotify::parse(b""),
            Err(Error::Envelope(_))
        ));
        assert!(matches!(
            AuthorizationNotify::parse(&[0xff, 0xfe]),
            Err(Error::Envelope(_))
        ));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            WebhookError::from(Error::SignatureMismatch),
            WebhookError::Unauthorized
        ));
        assert!(matches!(
            WebhookError::from(Error::Decode("bad".to_string())),
            WebhookError::BadRequest(_)
        ));
        assert!(matches!(
            WebhookError::from(Error::MissingVerifyTicket("comp1".to_string())),
            WebhookError::Internal(_)
        ));

        let response = WebhookError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
