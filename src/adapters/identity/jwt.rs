use crate::ports::identity::{Error, IdentityPort, Principal, Role};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by member access tokens
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Member the token was issued to
    pub sub: Uuid,
    /// Issued-at, seconds since the epoch
    pub iat: i64,
    /// Expiration, seconds since the epoch
    pub exp: i64,
    /// Extra roles, absent for plain members
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
}

/// HS256 JWT verifier (and issuer) for member access tokens
#[derive(Clone)]
pub struct JwtIdentity {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentity {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a token for `member_id` carrying `roles`, valid for `ttl`
    pub fn issue(&self, member_id: Uuid, roles: &[Role], ttl: Duration) -> Result<String, Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: member_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            roles: roles.to_vec(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| Error::Adapter(Box::new(err)))
    }
}

#[async_trait::async_trait]
impl IdentityPort for JwtIdentity {
    async fn verify(&self, token: &str) -> Result<Principal, Error> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| Error::InvalidCredential(err.to_string()))?;

        Ok(Principal {
            member_id: data.claims.sub,
            roles: data.claims.roles,
        })
    }
}
