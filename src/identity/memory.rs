//! In-memory identity backend.
//!
//! Backs `--identity-url memory:` for local development and drives the
//! integration tests. Tokens are unsigned JWTs minted locally; revocation is
//! modeled with a per-account `valid_since` watermark, so a revoked token
//! still *decodes* (as it would against the real platform) but fails
//! server-side verification.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::token::{self, Claims};
use super::{AccountInfo, IdentityError, IdentityProvider, Session, TokenInfo};

const TOKEN_TTL_SECONDS: i64 = 60 * 60;

#[derive(Clone, Debug)]
struct Account {
    uid: String,
    email: String,
    password: String,
    display_name: Option<String>,
    email_verified: bool,
    disabled: bool,
    valid_since: i64,
}

#[derive(Default)]
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    reset_codes: Mutex<HashMap<String, String>>,
    code_seq: AtomicU64,
}

impl MemoryIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&self, account: &Account) -> Session {
        let now = Utc::now().timestamp();
        let id_token = token::encode_unsigned(&Claims {
            sub: Some(account.uid.clone()),
            email: Some(account.email.clone()),
            iat: Some(now),
            exp: Some(now + TOKEN_TTL_SECONDS),
            iss: Some("anteroom-memory".to_string()),
        });

        Session {
            uid: account.uid.clone(),
            email: account.email.clone(),
            display_name: account.display_name.clone(),
            email_verified: account.email_verified,
            id_token,
            refresh_token: format!("rt-{}", account.uid),
        }
    }

    fn find_by_uid(&self, uid: &str) -> Option<Account> {
        self.accounts
            .lock()
            .expect("accounts lock poisoned")
            .values()
            .find(|account| account.uid == uid)
            .cloned()
    }

    /// The most recently issued reset code, for tests and the dev log.
    #[must_use]
    pub fn last_reset_code(&self) -> Option<String> {
        let codes = self.reset_codes.lock().expect("reset codes lock poisoned");
        let last = self.code_seq.load(Ordering::SeqCst);
        let code = format!("oob-{last}");
        codes.contains_key(&code).then_some(code)
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let accounts = self.accounts.lock().expect("accounts lock poisoned");
        let Some(account) = accounts.get(email) else {
            return Err(IdentityError::InvalidCredentials);
        };
        if account.disabled {
            return Err(IdentityError::AccountDisabled);
        }
        if account.password != password {
            return Err(IdentityError::InvalidCredentials);
        }
        let account = account.clone();
        drop(accounts);

        Ok(self.mint(&account))
    }

    async fn sign_in_with_idp(&self, oauth_token: &str) -> Result<Session, IdentityError> {
        // Dev convention: the "OAuth credential" is the bare email address,
        // auto-provisioning the account on first use like a federated sign-in.
        let email = oauth_token.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(IdentityError::InvalidCredentials);
        }

        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        let account = accounts
            .entry(email.to_string())
            .or_insert_with(|| Account {
                uid: Uuid::new_v4().to_string(),
                email: email.to_string(),
                password: Uuid::new_v4().to_string(),
                display_name: None,
                email_verified: true,
                disabled: false,
                valid_since: 0,
            })
            .clone();
        drop(accounts);

        if account.disabled {
            return Err(IdentityError::AccountDisabled);
        }

        Ok(self.mint(&account))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Session, IdentityError> {
        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        if accounts.contains_key(email) {
            return Err(IdentityError::EmailExists);
        }

        let account = Account {
            uid: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password: password.to_string(),
            display_name: display_name.map(ToString::to_string),
            email_verified: false,
            disabled: false,
            valid_since: 0,
        };
        accounts.insert(email.to_string(), account.clone());
        drop(accounts);

        Ok(self.mint(&account))
    }

    async fn verify_token(&self, id_token: &str) -> Result<TokenInfo, IdentityError> {
        let claims =
            token::decode_unverified(id_token).map_err(|_| IdentityError::InvalidToken)?;
        let now = Utc::now().timestamp();
        if !claims.exp.is_some_and(|exp| exp > now) {
            return Err(IdentityError::InvalidToken);
        }

        let uid = claims.sub.ok_or(IdentityError::InvalidToken)?;
        let account = self.find_by_uid(&uid).ok_or(IdentityError::InvalidToken)?;
        if account.disabled {
            return Err(IdentityError::AccountDisabled);
        }
        // Tokens issued before the revocation watermark are dead.
        if claims.iat.unwrap_or(0) < account.valid_since {
            return Err(IdentityError::InvalidToken);
        }

        Ok(TokenInfo {
            uid: account.uid,
            email: Some(account.email),
            email_verified: account.email_verified,
            display_name: account.display_name,
        })
    }

    async fn revoke(&self, uid: &str) -> Result<(), IdentityError> {
        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        for account in accounts.values_mut() {
            if account.uid == uid {
                account.valid_since = Utc::now().timestamp() + 1;
                return Ok(());
            }
        }
        Err(IdentityError::UserNotFound)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let accounts = self.accounts.lock().expect("accounts lock poisoned");
        if !accounts.contains_key(email) {
            return Err(IdentityError::UserNotFound);
        }
        drop(accounts);

        let seq = self.code_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let code = format!("oob-{seq}");
        self.reset_codes
            .lock()
            .expect("reset codes lock poisoned")
            .insert(code, email.to_string());
        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        // Codes are single-use; a second confirmation fails like an expired one.
        let email = self
            .reset_codes
            .lock()
            .expect("reset codes lock poisoned")
            .remove(code)
            .ok_or(IdentityError::InvalidResetCode)?;

        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        let account = accounts
            .get_mut(&email)
            .ok_or(IdentityError::UserNotFound)?;
        account.password = new_password.to_string();
        Ok(())
    }

    async fn update_account(
        &self,
        uid: &str,
        display_name: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), IdentityError> {
        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        for account in accounts.values_mut() {
            if account.uid == uid {
                if let Some(name) = display_name {
                    account.display_name = Some(name.to_string());
                }
                if let Some(password) = password {
                    account.password = password.to_string();
                }
                return Ok(());
            }
        }
        Err(IdentityError::UserNotFound)
    }

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        let email = accounts
            .values()
            .find(|account| account.uid == uid)
            .map(|account| account.email.clone())
            .ok_or(IdentityError::UserNotFound)?;
        accounts.remove(&email);
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<AccountInfo>, IdentityError> {
        let accounts = self.accounts.lock().expect("accounts lock poisoned");
        Ok(accounts.get(email).map(|account| AccountInfo {
            uid: account.uid.clone(),
            email: account.email.clone(),
            display_name: account.display_name.clone(),
            email_verified: account.email_verified,
            disabled: account.disabled,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let provider = MemoryIdentityProvider::new();
        let created = provider
            .sign_up("alice@example.com", "secret1", Some("Alice"))
            .await
            .expect("sign up");
        let session = provider
            .sign_in("alice@example.com", "secret1")
            .await
            .expect("sign in");
        assert_eq!(session.uid, created.uid);
        assert_eq!(session.display_name.as_deref(), Some("Alice"));

        let err = provider
            .sign_in("alice@example.com", "wrong")
            .await
            .expect_err("wrong password");
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_rejected() {
        let provider = MemoryIdentityProvider::new();
        provider
            .sign_up("alice@example.com", "secret1", None)
            .await
            .expect("first sign up");
        let err = provider
            .sign_up("alice@example.com", "secret2", None)
            .await
            .expect_err("second sign up");
        assert!(matches!(err, IdentityError::EmailExists));
    }

    #[tokio::test]
    async fn revoked_token_fails_verification_but_still_decodes() {
        let provider = MemoryIdentityProvider::new();
        let session = provider
            .sign_up("alice@example.com", "secret1", None)
            .await
            .expect("sign up");

        provider.revoke(&session.uid).await.expect("revoke");

        assert!(provider.verify_token(&session.id_token).await.is_err());
        // The edge gate would still let this token through until exp passes.
        assert!(token::is_unexpired(
            &session.id_token,
            Utc::now().timestamp()
        ));
    }

    #[tokio::test]
    async fn reset_codes_are_single_use() {
        let provider = MemoryIdentityProvider::new();
        provider
            .sign_up("alice@example.com", "secret1", None)
            .await
            .expect("sign up");
        provider
            .send_password_reset("alice@example.com")
            .await
            .expect("send reset");
        let code = provider.last_reset_code().expect("code issued");

        provider
            .confirm_password_reset(&code, "newpass1")
            .await
            .expect("first confirmation");
        let err = provider
            .confirm_password_reset(&code, "newpass2")
            .await
            .expect_err("reused code");
        assert!(matches!(err, IdentityError::InvalidResetCode));

        provider
            .sign_in("alice@example.com", "newpass1")
            .await
            .expect("sign in with new password");
    }

    #[tokio::test]
    async fn idp_sign_in_auto_provisions() {
        let provider = MemoryIdentityProvider::new();
        let first = provider
            .sign_in_with_idp("gina@example.com")
            .await
            .expect("first idp sign in");
        let second = provider
            .sign_in_with_idp("gina@example.com")
            .await
            .expect("second idp sign in");
        assert_eq!(first.uid, second.uid);
        assert!(first.email_verified);
    }
}
