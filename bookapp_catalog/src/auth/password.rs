use crate::error::ApiError;

/// Hashes on the blocking pool
pub async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|err| ApiError::Internal(format!("Password hashing task failed: {}", err)))?
        .map_err(|err| ApiError::Internal(format!("Password hashing failed: {}", err)))
}

/// Returns false for a wrong password as well as for a hash that cannot be parsed
pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|err| ApiError::Internal(format!("Password verification task failed: {}", err)))?;

    Ok(verified.unwrap_or_else(|err| {
        tracing::warn!("Stored password hash could not be verified {}", err);
        false
    }))
}
