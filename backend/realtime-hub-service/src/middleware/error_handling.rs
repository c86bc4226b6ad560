use crate::error::{AppError, Entity};
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};

/// Map domain errors to HTTP status and the shared error body
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::BadRequest(_) => (kinds::VALIDATION_ERROR, error_codes::INVALID_REQUEST),
        AppError::Unauthorized => (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_INVALID),
        AppError::Forbidden(_) => (kinds::AUTHORIZATION_ERROR, error_codes::ACTION_FORBIDDEN),
        AppError::NotFound(entity) => (
            kinds::NOT_FOUND_ERROR,
            match entity {
                Entity::Conversation => error_codes::CONVERSATION_NOT_FOUND,
                Entity::Participant => error_codes::NOT_CONVERSATION_MEMBER,
                Entity::Message => error_codes::MESSAGE_NOT_FOUND,
                Entity::Room => error_codes::ROOM_NOT_FOUND,
            },
        ),
        AppError::Conflict(_) => (kinds::CONFLICT_ERROR, error_codes::CONVERSATION_CONFLICT),
        AppError::TransientStore(_) => (
            kinds::SERVICE_UNAVAILABLE_ERROR,
            error_codes::SERVICE_UNAVAILABLE,
        ),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal(_) => {
            (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    // Server-side detail stays in the logs
    let message = match err {
        AppError::Internal(_) | AppError::Config(_) | AppError::StartServer(_) => {
            tracing::error!(error = %err, "request failed with internal error");
            "internal server error".to_string()
        }
        AppError::TransientStore(_) => {
            tracing::warn!(error = %err, "store unavailable");
            "store temporarily unavailable, retry later".to_string()
        }
        _ => err.to_string(),
    };

    let response = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &message,
        status.as_u16(),
        error_type,
        code,
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, body) = map_error(err);
    HttpResponse::build(status).json(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_codes_follow_entity() {
        let (status, body) = map_error(&AppError::NotFound(Entity::Room));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, error_codes::ROOM_NOT_FOUND);
        assert_eq!(body.error, "Not Found");
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let (status, body) = map_error(&AppError::Internal("pg row decode".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("pg row decode"));
    }

    #[test]
    fn test_transient_store_is_503() {
        let (status, body) = map_error(&AppError::TransientStore("pool timeout".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.error_type, kinds::SERVICE_UNAVAILABLE_ERROR);
    }
}
