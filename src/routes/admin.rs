use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;

use crate::{
    api::AppState,
    config::Config,
    error::{AppError, AppResult},
    services::CycleReport,
};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin routes need the configured shared secret; none configured means
/// they are switched off
fn require_admin(config: &Config, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = config.admin_token.as_deref() else {
        return Err(AppError::Unauthorized(
            "admin routes are disabled".to_string(),
        ));
    };
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected) {
        return Err(AppError::Unauthorized(format!(
            "missing or wrong {}",
            ADMIN_TOKEN_HEADER
        )));
    }
    Ok(())
}

/// Runs one expiration sweep and warning pass immediately
pub async fn run_expiration(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<CycleReport>> {
    require_admin(&state.config, &headers)?;
    let report = state.expiration.run_cycle(Utc::now()).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_token(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_TOKEN_HEADER, HeaderValue::from_str(token).unwrap());
        headers
    }

    #[test]
    fn test_admin_disabled_without_configured_token() {
        let config = Config::default();
        assert!(matches!(
            require_admin(&config, &with_token("anything")),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_admin_token_must_match() {
        let config = Config {
            admin_token: Some("s3cret".to_string()),
            ..Config::default()
        };
        assert!(require_admin(&config, &with_token("s3cret")).is_ok());
        assert!(require_admin(&config, &with_token("guess")).is_err());
        assert!(require_admin(&config, &HeaderMap::new()).is_err());
    }
}
