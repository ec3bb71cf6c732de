//! Bearer-token acquisition for ARM.
//!
//! Two credential sources are supported: a pre-issued token in
//! `AZURE_ACCESS_TOKEN`, or an OAuth2 client-credentials grant using
//! `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ArmApiError, ArmStateError, ConfigError, Result};

/// Environment variable holding a pre-issued bearer token.
pub const ENV_ACCESS_TOKEN: &str = "AZURE_ACCESS_TOKEN";
/// Environment variable holding the tenant id.
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
/// Environment variable holding the client (application) id.
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Environment variable holding the client secret.
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";

/// Where the bearer token comes from.
#[derive(Clone)]
pub enum Credential {
    /// A token obtained out of band.
    StaticToken(String),
    /// Service principal with a client secret.
    ClientSecret {
        /// Directory (tenant) id.
        tenant_id: String,
        /// Application id.
        client_id: String,
        /// Client secret.
        client_secret: String,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaticToken(_) => f.write_str("StaticToken(***)"),
            Self::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl Credential {
    /// Reads the credential from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if neither credential source is configured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the credential through a variable lookup function.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(token) = get(ENV_ACCESS_TOKEN) {
            debug!("Using bearer token from {ENV_ACCESS_TOKEN}");
            return Ok(Self::StaticToken(token));
        }

        let require = |name: &str| {
            get(name).ok_or_else(|| {
                ArmStateError::Config(ConfigError::MissingEnvVar {
                    name: name.to_string(),
                })
            })
        };

        Ok(Self::ClientSecret {
            tenant_id: require(ENV_TENANT_ID)?,
            client_id: require(ENV_CLIENT_ID)?,
            client_secret: require(ENV_CLIENT_SECRET)?,
        })
    }

    /// Obtains a bearer token for the given ARM endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint rejects the request.
    pub async fn token(
        &self,
        authority_host: &str,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<String> {
        let (tenant_id, client_id, client_secret) = match self {
            Self::StaticToken(token) => return Ok(token.clone()),
            Self::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => (tenant_id, client_id, client_secret),
        };

        let url = format!(
            "{}/{tenant_id}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/')
        );
        let scope = format!("{}/.default", endpoint.trim_end_matches('/'));
        info!("Requesting ARM token for client {client_id}");

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArmApiError::network(format!("Failed to create HTTP client: {e}")))?;

        let response = client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ArmApiError::network(format!("Token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArmStateError::Arm(ArmApiError::AuthenticationFailed {
                message: format!("Token endpoint returned {status}: {body}"),
            }));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ArmApiError::invalid_response(format!("Failed to parse token response: {e}")))?;

        debug!("Token acquired, expires in {:?}s", token.expires_in);
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_static_token_wins() {
        let credential = Credential::from_lookup(lookup(&[
            (ENV_ACCESS_TOKEN, "tok"),
            (ENV_TENANT_ID, "t"),
        ]))
        .unwrap();
        assert!(matches!(credential, Credential::StaticToken(ref t) if t == "tok"));
        assert_eq!(format!("{credential:?}"), "StaticToken(***)");
    }

    #[test]
    fn test_client_secret_requires_all_vars() {
        let err = Credential::from_lookup(lookup(&[(ENV_TENANT_ID, "t"), (ENV_CLIENT_ID, "c")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ArmStateError::Config(ConfigError::MissingEnvVar { ref name }) if name == ENV_CLIENT_SECRET
        ));
    }

    #[tokio::test]
    async fn test_client_credentials_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let credential = Credential::ClientSecret {
            tenant_id: String::from("tenant-1"),
            client_id: String::from("client-1"),
            client_secret: String::from("secret"),
        };
        let token = credential
            .token(&server.uri(), "https://management.azure.com", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(token, "abc");
    }

    #[tokio::test]
    async fn test_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let credential = Credential::ClientSecret {
            tenant_id: String::from("t"),
            client_id: String::from("c"),
            client_secret: String::from("s"),
        };
        let err = credential
            .token(&server.uri(), "https://management.azure.com", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid_client"));
    }
}
