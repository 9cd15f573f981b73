use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

impl Claims {
    pub fn student_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| Error::Unauthorized("Token subject is not a student id".to_string()))
    }
}

fn bearer_claims(headers: &HeaderMap) -> std::result::Result<Claims, &'static str> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("missing_authorization")?;
    let auth_str = auth_header.to_str().map_err(|_| "bad_authorization")?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or("unsupported_scheme")?;

    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| "invalid_token")
}

pub async fn require_bearer_auth(mut req: Request, next: Next) -> Response {
    match bearer_claims(req.headers()) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(code) => (StatusCode::UNAUTHORIZED, Json(json!({ "error": code }))).into_response(),
    }
}

/// Attaches claims when a valid token is present and lets anonymous requests
/// through, so the handler decides how to answer them.
pub async fn optional_bearer_auth(mut req: Request, next: Next) -> Response {
    if let Ok(claims) = bearer_claims(req.headers()) {
        req.extensions_mut().insert(claims);
    }
    next.run(req).await
}
