use anyhow::{anyhow, bail, Context};
use casegate_common::acl::{role_set, RoleSet};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CallerClaims {
    sub: String,
    #[serde(default)]
    roles: Vec<String>,
    iat: i64,
    exp: i64,
}

/// Identity and global roles carried by a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub roles: RoleSet,
}

#[derive(Clone)]
pub struct JwtAccessTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAccessTokenService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("jwt secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue_caller_token<I, S>(&self, user_id: &str, roles: I) -> anyhow::Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issue_caller_token_at(user_id, roles, current_unix_timestamp()?)
    }

    fn issue_caller_token_at<I, S>(
        &self,
        user_id: &str,
        roles: I,
        issued_at: i64,
    ) -> anyhow::Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let claims = CallerClaims {
            sub: user_id.to_owned(),
            roles: roles.into_iter().map(Into::into).collect(),
            iat: issued_at,
            exp: issued_at + ACCESS_TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode access token")
    }

    pub fn validate_caller_token(&self, token: &str) -> anyhow::Result<CallerIdentity> {
        let claims = decode::<CallerClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode access token")?
            .claims;

        let user_id = claims.sub.trim();
        if user_id.is_empty() {
            bail!("access token subject is empty");
        }

        Ok(CallerIdentity { user_id: user_id.to_owned(), roles: role_set(claims.roles) })
    }
}

fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| anyhow!("system clock is before unix epoch: {error}"))?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}
