use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    config::Config,
    errors::{AppError, AuthFailure},
    models::user::UserDoc,
};

/// Minimum HS256 shared-secret length. A shorter secret is a deployment
/// mistake, not something to limp along with.
const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,

    pub typ: String, // "access" | "refresh"

    /// Refresh only: hex id of the backing refresh record.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub jti: Option<String>,
    /// Refresh only: 256 bits of randomness so the token hash is
    /// collision-free regardless of the other claims.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nonce: Option<String>,

    /// Access only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub roles: Option<Vec<String>>,
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Stateless mint/verify for both credential kinds. Holds the HS256 keys;
/// never touches the store.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    pub fn new(
        secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, AppError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(AppError::Misconfiguration(format!(
                "JWT_SECRET must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, AppError> {
        Self::new(
            &cfg.jwt_secret,
            Duration::seconds(cfg.access_ttl_seconds),
            Duration::seconds(cfg.refresh_ttl_seconds),
        )
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access(&self, user: &UserDoc) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_hex(),
            iat: now.timestamp() as usize,
            exp: (now + self.access_ttl).timestamp() as usize,
            typ: TokenKind::Access.as_str().into(),
            jti: None,
            nonce: None,
            email: Some(user.email.clone()),
            roles: Some(user.roles.clone()),
        };
        self.encode(&claims)
    }

    pub fn issue_refresh(&self, owner_id_hex: String, record_id_hex: String) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: owner_id_hex,
            iat: now.timestamp() as usize,
            exp: (now + self.refresh_ttl).timestamp() as usize,
            typ: TokenKind::Refresh.as_str().into(),
            jti: Some(record_id_hex),
            nonce: Some(generate_nonce()),
            email: None,
            roles: None,
        };
        self.encode(&claims)
    }

    /// Pure verification: signature, expiry, and that the token is of the
    /// expected kind so access and refresh tokens cannot stand in for each
    /// other.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthFailure> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthFailure::Expired,
                _ => AuthFailure::InvalidSignature,
            }
        })?;

        if data.claims.typ != kind.as_str() {
            return Err(AuthFailure::WrongKind);
        }

        Ok(data.claims)
    }

    fn encode(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("jwt encode: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    fn test_signer() -> TokenSigner {
        TokenSigner::new(
            "0123456789abcdef0123456789abcdef",
            Duration::minutes(15),
            Duration::days(30),
        )
        .unwrap()
    }

    fn test_user() -> UserDoc {
        UserDoc {
            id: ObjectId::new(),
            email: "who@example.com".into(),
            name: "Who".into(),
            password_hash: "x".into(),
            roles: vec!["member".into()],
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn short_secret_is_fatal() {
        let err = TokenSigner::new("short", Duration::minutes(1), Duration::minutes(2));
        assert!(matches!(err, Err(AppError::Misconfiguration(_))));
    }

    #[test]
    fn access_round_trip() {
        let signer = test_signer();
        let user = test_user();
        let token = signer.issue_access(&user).unwrap();

        let claims = signer.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user.id.to_hex());
        assert_eq!(claims.email.as_deref(), Some("who@example.com"));
        assert_eq!(claims.roles.as_deref(), Some(&["member".to_string()][..]));
        assert!(claims.jti.is_none());
    }

    #[test]
    fn refresh_round_trip_carries_record_id_and_nonce() {
        let signer = test_signer();
        let owner = ObjectId::new();
        let record = ObjectId::new();
        let token = signer.issue_refresh(owner.to_hex(), record.to_hex()).unwrap();

        let claims = signer.verify(&token, TokenKind::Refresh).unwrap();
        assert_eq!(claims.jti.as_deref(), Some(record.to_hex().as_str()));
        // 32 random bytes, hex encoded
        assert_eq!(claims.nonce.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn kinds_cannot_be_substituted() {
        let signer = test_signer();
        let user = test_user();
        let access = signer.issue_access(&user).unwrap();
        let refresh = signer
            .issue_refresh(user.id.to_hex(), ObjectId::new().to_hex())
            .unwrap();

        assert_eq!(
            signer.verify(&access, TokenKind::Refresh).unwrap_err(),
            AuthFailure::WrongKind
        );
        assert_eq!(
            signer.verify(&refresh, TokenKind::Access).unwrap_err(),
            AuthFailure::WrongKind
        );
    }

    #[test]
    fn wrong_secret_rejected() {
        let signer = test_signer();
        let other = TokenSigner::new(
            "ffffffffffffffffffffffffffffffff",
            Duration::minutes(15),
            Duration::days(30),
        )
        .unwrap();
        let token = signer.issue_access(&test_user()).unwrap();

        assert_eq!(
            other.verify(&token, TokenKind::Access).unwrap_err(),
            AuthFailure::InvalidSignature
        );
    }

    #[test]
    fn expired_access_rejected() {
        // TTL far enough in the past to clear jsonwebtoken's default leeway.
        let signer = TokenSigner::new(
            "0123456789abcdef0123456789abcdef",
            Duration::seconds(-180),
            Duration::days(30),
        )
        .unwrap();
        let token = signer.issue_access(&test_user()).unwrap();

        let fresh = test_signer();
        assert_eq!(
            fresh.verify(&token, TokenKind::Access).unwrap_err(),
            AuthFailure::Expired
        );
    }

    #[test]
    fn nonces_are_unique() {
        let signer = test_signer();
        let owner = ObjectId::new().to_hex();
        let t1 = signer.issue_refresh(owner.clone(), ObjectId::new().to_hex()).unwrap();
        let t2 = signer.issue_refresh(owner, ObjectId::new().to_hex()).unwrap();
        assert_ne!(sha256_hex(&t1), sha256_hex(&t2));
    }
}
