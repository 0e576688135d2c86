use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, get_current_timestamp,
};
use serde::{Deserialize, Serialize};

use crate::db::OAuthProvider;

/// How long a user has to complete the provider's consent screen.
const STATE_TTL_SECS: u64 = 10 * 60;

/// Claims carried in the OAuth `state` parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateClaims {
    pub sub: String,   // Provider the flow was started for
    pub nonce: String, // Also stored in the session that started the flow
    pub exp: u64,      // Expiration time (Unix timestamp)
    pub iat: u64,      // Issued at (Unix timestamp)
}

/// Signs and checks OAuth `state` parameters
#[derive(Clone)]
pub struct StateTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl StateTokenService {
    pub fn new(secret: &str) -> Self {
        let encoding_key = EncodingKey::from_secret(secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            encoding_key,
            decoding_key,
            validation,
        }
    }

    pub fn create_token(
        &self,
        provider: OAuthProvider,
        nonce: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.create_token_at(provider, nonce, get_current_timestamp())
    }

    fn create_token_at(
        &self,
        provider: OAuthProvider,
        nonce: &str,
        now: u64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = StateClaims {
            sub: provider.as_str().to_owned(),
            nonce: nonce.to_owned(),
            exp: now + STATE_TTL_SECS,
            iat: now,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    /// Validate a state token issued for `provider` and extract its claims
    pub fn validate_token(
        &self,
        token: &str,
        provider: OAuthProvider,
    ) -> Result<StateClaims, jsonwebtoken::errors::Error> {
        let mut validation = self.validation.clone();
        validation.sub = Some(provider.as_str().to_owned());

        let token_data = decode::<StateClaims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}
