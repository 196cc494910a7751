use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::{USER_ID_HEADER, USER_ROLE_HEADER};

const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

/// CORS for the portal front-ends. `origins` is a comma-separated list; an
/// empty or entirely invalid list falls back to any origin.
pub fn create_cors_layer(origins: &str) -> CorsLayer {
    let origins = parse_allowed_origins(origins);
    // Credentials cannot be combined with a wildcard origin.
    let allow_credentials = !origins.is_empty();
    let allowed_origins = if origins.is_empty() {
        tracing::warn!("CORS: no valid origins configured, allowing any origin");
        AllowOrigin::any()
    } else {
        tracing::info!(count = origins.len(), "CORS: configured allowed origins");
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_ROLE_HEADER),
        ])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(allow_credentials)
        .max_age(std::time::Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}

fn parse_allowed_origins(origins: &str) -> Vec<HeaderValue> {
    origins
        .split(',')
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if trimmed.is_empty() {
                None
            } else {
                match trimmed.parse::<HeaderValue>() {
                    Ok(value) => {
                        tracing::debug!(origin = trimmed, "CORS: allowing origin");
                        Some(value)
                    }
                    Err(e) => {
                        tracing::warn!(origin = trimmed, error = %e, "CORS: invalid origin");
                        None
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ALLOWED_ORIGINS;

    #[test]
    fn test_default_origins_are_valid() {
        for origin in DEFAULT_ALLOWED_ORIGINS.split(',') {
            assert!(
                origin.trim().parse::<HeaderValue>().is_ok(),
                "Default origin '{origin}' should be a valid HeaderValue"
            );
        }
        let _layer = create_cors_layer(DEFAULT_ALLOWED_ORIGINS);
    }

    #[test]
    fn test_invalid_and_blank_origins_are_skipped() {
        assert!(parse_allowed_origins(" , ,").is_empty());
        assert_eq!(
            parse_allowed_origins("https://alumni.example.org, ,bad\norigin").len(),
            1
        );
        let _layer = create_cors_layer(" , ,");
    }
}
