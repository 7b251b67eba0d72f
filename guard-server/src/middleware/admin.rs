//! Admin key middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::{AppError, AppState};

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// Middleware: Require a matching `X-Admin-Key` header
pub async fn require_admin_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = match &state.admin_key_hash {
        Some(hash) => hash,
        None => {
            tracing::warn!("Admin request rejected: ADMIN_API_KEY is not configured");
            return Err(AppError::Unauthorized);
        }
    };

    let presented = req.headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if hash_key(presented) != *expected {
        tracing::warn!("Admin request rejected: key mismatch");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(req).await)
}

pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}
