// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization modes and the token capability shared by all of them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, NetworkErrorKind, RequestError, Result};
use crate::BoxFuture;

/// How requests against an endpoint are authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthType {
    #[serde(rename = "API_KEY")]
    ApiKey,
    #[serde(rename = "AWS_IAM")]
    AwsIam,
    #[serde(rename = "AMAZON_COGNITO_USER_POOLS")]
    CognitoUserPools,
    #[serde(rename = "OPENID_CONNECT")]
    OpenIdConnect,
    #[serde(rename = "AWS_LAMBDA")]
    AwsLambda,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::ApiKey => "API_KEY",
            AuthType::AwsIam => "AWS_IAM",
            AuthType::CognitoUserPools => "AMAZON_COGNITO_USER_POOLS",
            AuthType::OpenIdConnect => "OPENID_CONNECT",
            AuthType::AwsLambda => "AWS_LAMBDA",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "API_KEY" => Ok(AuthType::ApiKey),
            "AWS_IAM" => Ok(AuthType::AwsIam),
            "AMAZON_COGNITO_USER_POOLS" => Ok(AuthType::CognitoUserPools),
            "OPENID_CONNECT" => Ok(AuthType::OpenIdConnect),
            "AWS_LAMBDA" => Ok(AuthType::AwsLambda),
            _ => Err(Error::InvalidInput(format!(
                "invalid auth type: '{s}'\n  hint: valid types are: API_KEY, AWS_IAM, AMAZON_COGNITO_USER_POOLS, OPENID_CONNECT, AWS_LAMBDA"
            ))),
        }
    }
}

/// Failure to obtain credentials.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("token unavailable: {0}")]
    TokenUnavailable(String),

    #[error("token fetch failed: {0}")]
    Network(NetworkErrorKind),
}

impl From<AuthError> for RequestError {
    fn from(err: AuthError) -> Self {
        let cause = match &err {
            AuthError::Network(kind) => Some(*kind),
            AuthError::TokenUnavailable(_) => None,
        };
        RequestError::Authentication {
            message: err.to_string(),
            cause,
        }
    }
}

/// Supplies bearer tokens for user pools, OIDC and Lambda authorization.
pub trait TokenProvider: Send + Sync {
    fn fetch_token(&self) -> BoxFuture<'_, std::result::Result<String, AuthError>>;
}

/// Token provider returning a fixed token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        StaticTokenProvider {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn fetch_token(&self) -> BoxFuture<'_, std::result::Result<String, AuthError>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
