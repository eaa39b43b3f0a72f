use std::fmt;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Bearer token issued by the SmartLink identity provider.
///
/// Opaque to this crate: it is only ever forwarded in the relay's
/// `register` command. `Debug` never prints the secret.
#[derive(Clone)]
pub struct IdToken(SecretString);

impl IdToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// The raw token text, for the wire.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdToken(***)")
    }
}

/// External identity provider.
///
/// Two flows exist: an interactive login seeded with an email hint
/// (optionally forcing a fresh login instead of a cached session), and a
/// direct user/password token exchange.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, email: &str, force_login: bool) -> Result<IdToken, Error>;

    async fn request_tokens(&self, user: &str, password: &SecretString) -> Result<IdToken, Error>;
}

/// An [`Authenticator`] that always hands out the same pre-issued token.
///
/// Useful when the token was obtained out of band (e.g. a refresh flow
/// owned by the application).
#[derive(Debug, Clone)]
pub struct StaticToken(IdToken);

impl StaticToken {
    pub fn new(token: IdToken) -> Self {
        Self(token)
    }
}

#[async_trait]
impl Authenticator for StaticToken {
    async fn authenticate(&self, _email: &str, _force_login: bool) -> Result<IdToken, Error> {
        Ok(self.0.clone())
    }

    async fn request_tokens(&self, _user: &str, _password: &SecretString) -> Result<IdToken, Error> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let token = IdToken::new("eyJhbGciOi.secret");
        assert_eq!(format!("{token:?}"), "IdToken(***)");
        assert_eq!(token.expose(), "eyJhbGciOi.secret");
    }

    #[tokio::test]
    async fn static_token_serves_both_flows() {
        let auth = StaticToken::new(IdToken::new("abc"));
        let a = auth.authenticate("op@example.com", false).await.unwrap();
        let b = auth
            .request_tokens("op", &SecretString::from("pw".to_string()))
            .await
            .unwrap();
        assert_eq!(a.expose(), "abc");
        assert_eq!(b.expose(), "abc");
    }
}
