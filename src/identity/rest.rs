//! REST client for the hosted identity platform.
//!
//! The platform exposes an `accounts:*` RPC surface keyed by an API key in
//! the query string; errors come back as an upper-snake code in
//! `error.message`.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{AccountInfo, IdentityError, IdentityProvider, Session, TokenInfo};
use crate::APP_USER_AGENT;

#[derive(Clone, Debug)]
pub struct RestIdentityProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl RestIdentityProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: Url, api_key: SecretString) -> Result<Self, IdentityError> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, op: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!(
            "{base}/v1/accounts:{op}?key={}",
            self.api_key.expose_secret()
        )
    }

    async fn post(&self, op: &str, payload: Value) -> Result<Value, IdentityError> {
        debug!("identity call: accounts:{}", op);

        let response = self
            .client
            .post(self.endpoint(op))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let json_response: Value = response.json().await?;
            let code = json_response["error"]["message"].as_str().unwrap_or("");
            return Err(map_error_code(code));
        }

        Ok(response.json().await?)
    }
}

fn map_error_code(code: &str) -> IdentityError {
    // Rate-limit codes carry a free-form suffix after " : ".
    let bare = code.split(" :").next().unwrap_or(code).trim();
    match bare {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            IdentityError::InvalidCredentials
        }
        "TOO_MANY_ATTEMPTS_TRY_LATER" => IdentityError::TooManyRequests,
        "USER_DISABLED" => IdentityError::AccountDisabled,
        "EMAIL_EXISTS" => IdentityError::EmailExists,
        "USER_NOT_FOUND" => IdentityError::UserNotFound,
        "INVALID_OOB_CODE" | "EXPIRED_OOB_CODE" => IdentityError::InvalidResetCode,
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" => IdentityError::InvalidToken,
        other => IdentityError::Provider(other.to_string()),
    }
}

fn session_from_value(value: &Value) -> Result<Session, IdentityError> {
    let uid = value["localId"]
        .as_str()
        .ok_or_else(|| IdentityError::Provider("missing localId in response".to_string()))?;
    let id_token = value["idToken"]
        .as_str()
        .ok_or_else(|| IdentityError::Provider("missing idToken in response".to_string()))?;
    let refresh_token = value["refreshToken"]
        .as_str()
        .ok_or_else(|| IdentityError::Provider("missing refreshToken in response".to_string()))?;

    Ok(Session {
        uid: uid.to_string(),
        email: value["email"].as_str().unwrap_or_default().to_string(),
        display_name: value["displayName"].as_str().map(ToString::to_string),
        email_verified: value["emailVerified"].as_bool().unwrap_or(false),
        id_token: id_token.to_string(),
        refresh_token: refresh_token.to_string(),
    })
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let response = self
            .post(
                "signInWithPassword",
                json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;

        session_from_value(&response)
    }

    async fn sign_in_with_idp(&self, oauth_token: &str) -> Result<Session, IdentityError> {
        let response = self
            .post(
                "signInWithIdp",
                json!({
                    "postBody": format!("id_token={oauth_token}&providerId=google.com"),
                    "requestUri": "http://localhost",
                    "returnSecureToken": true,
                }),
            )
            .await?;

        session_from_value(&response)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Session, IdentityError> {
        let response = self
            .post(
                "signUp",
                json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;

        let mut session = session_from_value(&response)?;

        if let Some(name) = display_name {
            self.post(
                "update",
                json!({
                    "idToken": session.id_token,
                    "displayName": name,
                    "returnSecureToken": false,
                }),
            )
            .await?;
            session.display_name = Some(name.to_string());
        }

        Ok(session)
    }

    async fn verify_token(&self, id_token: &str) -> Result<TokenInfo, IdentityError> {
        let response = self.post("lookup", json!({ "idToken": id_token })).await?;

        let user = response["users"]
            .as_array()
            .and_then(|users| users.first())
            .ok_or(IdentityError::InvalidToken)?;

        if user["disabled"].as_bool().unwrap_or(false) {
            return Err(IdentityError::AccountDisabled);
        }

        let uid = user["localId"]
            .as_str()
            .ok_or(IdentityError::InvalidToken)?;

        Ok(TokenInfo {
            uid: uid.to_string(),
            email: user["email"].as_str().map(ToString::to_string),
            email_verified: user["emailVerified"].as_bool().unwrap_or(false),
            display_name: user["displayName"].as_str().map(ToString::to_string),
        })
    }

    async fn revoke(&self, uid: &str) -> Result<(), IdentityError> {
        // Bumping validSince invalidates every refresh token for the account.
        self.post(
            "update",
            json!({
                "localId": uid,
                "validSince": Utc::now().timestamp().to_string(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        self.post(
            "sendOobCode",
            json!({
                "requestType": "PASSWORD_RESET",
                "email": email,
            }),
        )
        .await?;
        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        self.post(
            "resetPassword",
            json!({
                "oobCode": code,
                "newPassword": new_password,
            }),
        )
        .await?;
        Ok(())
    }

    async fn update_account(
        &self,
        uid: &str,
        display_name: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), IdentityError> {
        let mut payload = json!({ "localId": uid });
        if let Some(name) = display_name {
            payload["displayName"] = json!(name);
        }
        if let Some(password) = password {
            payload["password"] = json!(password);
        }

        self.post("update", payload).await?;
        Ok(())
    }

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        self.post("delete", json!({ "localId": uid })).await?;
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<AccountInfo>, IdentityError> {
        let response = match self.post("lookup", json!({ "email": [email] })).await {
            Ok(response) => response,
            Err(IdentityError::UserNotFound) => return Ok(None),
            Err(err) => return Err(err),
        };

        let Some(user) = response["users"].as_array().and_then(|users| users.first()) else {
            return Ok(None);
        };

        let uid = user["localId"]
            .as_str()
            .ok_or_else(|| IdentityError::Provider("missing localId in lookup".to_string()))?;

        Ok(Some(AccountInfo {
            uid: uid.to_string(),
            email: user["email"].as_str().unwrap_or(email).to_string(),
            display_name: user["displayName"].as_str().map(ToString::to_string),
            email_verified: user["emailVerified"].as_bool().unwrap_or(false),
            disabled: user["disabled"].as_bool().unwrap_or(false),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_taxonomy() {
        assert!(matches!(
            map_error_code("INVALID_LOGIN_CREDENTIALS"),
            IdentityError::InvalidCredentials
        ));
        assert!(matches!(
            map_error_code("TOO_MANY_ATTEMPTS_TRY_LATER : Try again later"),
            IdentityError::TooManyRequests
        ));
        assert!(matches!(
            map_error_code("EXPIRED_OOB_CODE"),
            IdentityError::InvalidResetCode
        ));
        assert!(matches!(
            map_error_code("SOMETHING_ELSE"),
            IdentityError::Provider(_)
        ));
    }

    #[test]
    fn session_parsing_requires_tokens() {
        let ok = json!({
            "localId": "u1",
            "email": "a@example.com",
            "idToken": "t",
            "refreshToken": "r",
        });
        let session = session_from_value(&ok).expect("session");
        assert_eq!(session.uid, "u1");
        assert_eq!(session.email, "a@example.com");

        let missing = json!({ "localId": "u1" });
        assert!(session_from_value(&missing).is_err());
    }

    #[test]
    fn endpoint_embeds_api_key() {
        let provider = RestIdentityProvider::new(
            Url::parse("https://identity.example.com/").expect("url"),
            SecretString::from("k123".to_string()),
        )
        .expect("provider");
        assert_eq!(
            provider.endpoint("lookup"),
            "https://identity.example.com/v1/accounts:lookup?key=k123"
        );
    }
}
