//! Authentication middleware for identity-provider token validation

use axum::{extract::State, http::Request, middleware::Next, response::Response};
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::error;

use crate::{error::ApiError, state::AppState};

/// Claims carried by identity-provider access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The provider's opaque subject id
    pub sub: String,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

/// Authenticated principal attached to the request. The external id is the
/// identity provider's subject, trusted verbatim; the account role lives in
/// the users table, not in the token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub external_id: String,
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Public key for verifying tokens
    pub public_key: String,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    pub fn from_env() -> Result<Self, String> {
        let public_key = env::var("JWT_PUBLIC_KEY")
            .map_err(|_| "JWT_PUBLIC_KEY environment variable not set".to_string())?;

        // If the public key looks like a file path, read from file (try CWD, then project root)
        let public_key = if public_key.starts_with("-----BEGIN") {
            public_key
        } else {
            std::fs::read_to_string(&public_key)
                .or_else(|_| {
                    // Try resolving relative to project root
                    let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
                    path.push(&public_key);
                    std::fs::read_to_string(path)
                })
                .map_err(|e| format!("Failed to read public key file: {}", e))?
                .trim()
                .to_string()
        };

        Ok(JwtConfig { public_key })
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(_state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    // Extract the Authorization header
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(ApiError::Unauthenticated)?;

    // Check if it's a Bearer token
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthenticated)?;

    // Load JWT configuration
    let jwt_config = JwtConfig::from_env().map_err(|e| {
        error!("Failed to load JWT config: {}", e);
        ApiError::InternalServerError
    })?;

    // Create decoding key and validation
    let decoding_key =
        DecodingKey::from_rsa_pem(jwt_config.public_key.as_bytes()).map_err(|e| {
            error!("Failed to create decoding key: {}", e);
            ApiError::InternalServerError
        })?;

    let mut validation = Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.validate_exp = true;

    // Validate the token
    let token_data =
        jsonwebtoken::decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            error!("Failed to validate token: {}", e);
            ApiError::Unauthenticated
        })?;

    // Insert the principal into the request extensions
    req.extensions_mut().insert(AuthUser {
        external_id: token_data.claims.sub,
    });

    // Call the next service
    let response = next.run(req).await;

    Ok(response)
}
