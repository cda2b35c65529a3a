// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token auth against registry token endpoints.

use super::{ImageRef, RegistryError};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    // Some registries (GitLab among them) use the OAuth field name.
    #[serde(default)]
    access_token: Option<String>,
}

/// Basic credentials presented to the token endpoint.
#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: Option<String>,
}

impl RegistryCredentials {
    /// Assemble from optional username/password parts (CLI flags or env).
    ///
    /// No username means anonymous; a password without a username is
    /// ignored rather than sent on its own.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        username.map(|username| Self { username, password })
    }
}

/// Obtains and caches pull-scoped bearer tokens.
///
/// The v2 flow: probe `/v2/`; a 401 carries a `WWW-Authenticate` header
/// naming the token realm and service; a GET against that realm with
/// `scope=repository:<repo>:pull` yields the token. Private registries
/// need basic credentials on that realm request. Tokens are cached per
/// `(registry, repository)` for the life of the process.
pub struct RegistryAuthenticator {
    client: reqwest::Client,
    credentials: Option<RegistryCredentials>,
    cache: Mutex<HashMap<(String, String), Option<String>>>,
}

impl RegistryAuthenticator {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Present basic credentials when requesting tokens.
    pub fn with_credentials(mut self, credentials: RegistryCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Token for pulling from `image`'s repository.
    ///
    /// `None` means the registry accepted the anonymous probe and no
    /// token is needed.
    pub async fn token_for(&self, image: &ImageRef) -> Result<Option<String>, RegistryError> {
        let key = (image.registry.clone(), image.repository.clone());
        if let Some(cached) = self.cache.lock().get(&key) {
            return Ok(cached.clone());
        }

        let probe_url = format!("https://{}/v2/", image.registry);
        let probe = self
            .client
            .get(&probe_url)
            .send()
            .await
            .map_err(|source| RegistryError::Http {
                context: format!("probing {}", probe_url),
                source,
            })?;

        let token = if probe.status() == reqwest::StatusCode::UNAUTHORIZED {
            let challenge = probe
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| RegistryError::Auth {
                    registry: image.registry.clone(),
                    reason: "401 without a WWW-Authenticate challenge".to_string(),
                })?;
            let (realm, service) = parse_bearer_challenge(challenge).ok_or_else(|| {
                RegistryError::Auth {
                    registry: image.registry.clone(),
                    reason: format!("unparseable challenge: {challenge}"),
                }
            })?;
            Some(self.request_token(image, &realm, service.as_deref()).await?)
        } else {
            None
        };

        self.cache.lock().insert(key, token.clone());
        Ok(token)
    }

    async fn request_token(
        &self,
        image: &ImageRef,
        realm: &str,
        service: Option<&str>,
    ) -> Result<String, RegistryError> {
        let scope = format!("repository:{}:pull", image.repository);
        let mut query: Vec<(&str, &str)> = vec![("scope", &scope)];
        if let Some(service) = service {
            query.push(("service", service));
        }

        let mut request = self.client.get(realm).query(&query);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_deref());
        }
        let response = request
            .send()
            .await
            .map_err(|source| RegistryError::Http {
                context: format!("requesting token from {}", realm),
                source,
            })?;
        if !response.status().is_success() {
            return Err(RegistryError::Auth {
                registry: image.registry.clone(),
                reason: format!("token endpoint returned HTTP {}", response.status()),
            });
        }
        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|source| RegistryError::Http {
                    context: format!("decoding token from {}", realm),
                    source,
                })?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| RegistryError::Auth {
                registry: image.registry.clone(),
                reason: "token endpoint returned neither token nor access_token".to_string(),
            })
    }
}

impl Default for RegistryAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull `realm` and `service` out of a `Bearer realm="...",service="..."`
/// challenge header.
pub(super) fn parse_bearer_challenge(header: &str) -> Option<(String, Option<String>)> {
    let params = header.strip_prefix("Bearer ")?;
    let mut realm = None;
    let mut service = None;
    for part in params.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        let value = value.trim_matches('"').to_string();
        match key.trim() {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            _ => {}
        }
    }
    realm.map(|r| (r, service))
}
