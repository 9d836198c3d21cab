// ABOUTME: Centralized error handling and error types for the gateway
// ABOUTME: Defines all error variants used across storage, permissions, and the MCP transports
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Unified Error Handling System
//!
//! This module provides a centralized error handling system for the gateway server.
//! It defines standard error types, error codes, and HTTP response formatting to ensure
//! consistent error handling across storage, permissions, the action executor, and the
//! MCP transports.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Authentication & Authorization
    /// Authentication is required but not provided
    AuthRequired,
    /// Authentication credentials are invalid
    AuthInvalid,
    /// Authentication token has expired
    AuthExpired,
    /// User lacks permission for the requested operation
    PermissionDenied,

    // Validation
    /// Input validation failed
    InvalidInput,
    /// Required field is missing from request
    MissingRequiredField,
    /// Data format is invalid
    InvalidFormat,

    // Resource Management
    /// Requested resource was not found
    ResourceNotFound,
    /// Resource already exists (conflict)
    ResourceAlreadyExists,

    // Sessions
    /// The server-side session limit has been reached
    SessionLimitReached,
    /// The referenced session does not exist or has expired
    SessionNotFound,

    // External Services
    /// External (upstream) system returned an error
    ExternalServiceError,
    /// Authentication with an external system failed
    ExternalAuthFailed,

    // Configuration
    /// Configuration error occurred
    ConfigError,

    // Internal Errors
    /// Internal server error
    InternalError,
    /// Database operation failed
    DatabaseError,
    /// Serialization/deserialization failed
    SerializationError,
}

impl ErrorCode {
    /// Get the `HTTP` status code for this error
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidInput | Self::MissingRequiredField | Self::InvalidFormat => {
                StatusCode::BAD_REQUEST
            }
            Self::AuthRequired | Self::AuthInvalid | Self::AuthExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::ResourceNotFound | Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::ResourceAlreadyExists => StatusCode::CONFLICT,
            Self::SessionLimitReached => StatusCode::TOO_MANY_REQUESTS,
            Self::ExternalServiceError | Self::ExternalAuthFailed => StatusCode::BAD_GATEWAY,
            Self::InternalError
            | Self::DatabaseError
            | Self::SerializationError
            | Self::ConfigError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::AuthInvalid => "The provided authentication credentials are invalid",
            Self::AuthExpired => "The authentication token has expired",
            Self::PermissionDenied => "You do not have permission to perform this action",
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::InvalidFormat => "The data format is invalid",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ResourceAlreadyExists => "A resource with this identifier already exists",
            Self::SessionLimitReached => "Server session limit reached, try again later",
            Self::SessionNotFound => "The session does not exist or has expired",
            Self::ExternalServiceError => "An upstream system encountered an error",
            Self::ExternalAuthFailed => "Authentication with the upstream system failed",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{self:?}"))
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "AuthRequired" => Ok(Self::AuthRequired),
            "AuthInvalid" => Ok(Self::AuthInvalid),
            "AuthExpired" => Ok(Self::AuthExpired),
            "PermissionDenied" => Ok(Self::PermissionDenied),
            "InvalidInput" => Ok(Self::InvalidInput),
            "MissingRequiredField" => Ok(Self::MissingRequiredField),
            "InvalidFormat" => Ok(Self::InvalidFormat),
            "ResourceNotFound" => Ok(Self::ResourceNotFound),
            "ResourceAlreadyExists" => Ok(Self::ResourceAlreadyExists),
            "SessionLimitReached" => Ok(Self::SessionLimitReached),
            "SessionNotFound" => Ok(Self::SessionNotFound),
            "ExternalServiceError" => Ok(Self::ExternalServiceError),
            "ExternalAuthFailed" => Ok(Self::ExternalAuthFailed),
            "ConfigError" => Ok(Self::ConfigError),
            "InternalError" => Ok(Self::InternalError),
            "DatabaseError" => Ok(Self::DatabaseError),
            "SerializationError" => Ok(Self::SerializationError),
            _ => Err(serde::de::Error::unknown_variant(&s, &[])),
        }
    }
}

/// Simplified error type for the application
#[derive(Debug, Clone, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional request ID for tracing
    pub request_id: Option<String>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: None,
        }
    }

    /// Add a request ID to the error
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Get sanitized message safe for client exposure.
    /// Internal error details are replaced with a generic description.
    #[must_use]
    pub fn sanitized_message(&self) -> String {
        match self.code {
            ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFormat
            | ErrorCode::PermissionDenied
            | ErrorCode::SessionLimitReached
            | ErrorCode::SessionNotFound => self.message.clone(),
            _ => self.code.description().to_owned(),
        }
    }

    /// Get full error details for internal logging.
    /// Never send this to clients — it may contain upstream error bodies.
    #[must_use]
    pub fn internal_details(&self) -> String {
        format!("{:?}: {}", self.code, self.message)
    }

    /// Map this error onto a JSON-RPC error code (see `constants::jsonrpc_errors`)
    #[must_use]
    pub const fn jsonrpc_code(&self) -> i64 {
        match self.code {
            ErrorCode::PermissionDenied => crate::constants::jsonrpc_errors::PERMISSION_DENIED,
            ErrorCode::ExternalServiceError | ErrorCode::ExternalAuthFailed => {
                crate::constants::jsonrpc_errors::UPSTREAM_ERROR
            }
            ErrorCode::AuthRequired
            | ErrorCode::AuthInvalid
            | ErrorCode::AuthExpired
            | ErrorCode::SessionLimitReached
            | ErrorCode::SessionNotFound => crate::constants::jsonrpc_errors::SERVER_ERROR,
            ErrorCode::InvalidInput | ErrorCode::MissingRequiredField | ErrorCode::InvalidFormat => {
                crate::constants::jsonrpc_errors::INVALID_PARAMS
            }
            _ => crate::constants::jsonrpc_errors::INTERNAL_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Simplified HTTP error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message (sanitized for client)
    pub message: String,
    /// Optional request ID for error tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC3339 timestamp when the error occurred
    pub timestamp: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        tracing::warn!("gateway error: {}", error.internal_details());

        Self {
            code: error.code,
            message: error.sanitized_message(),
            request_id: error.request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = ErrorResponse::from(self);
        (status, Json(body)).into_response()
    }
}

/// Convenience constructors for common errors
impl AppError {
    /// Authentication required
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Authentication required")
    }

    /// Invalid authentication
    #[must_use]
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Permission denied
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Resource not found
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource_str = resource.into();
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{resource_str} not found"),
        )
    }

    /// Invalid input
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Session limit reached
    #[must_use]
    pub fn session_limit_reached(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SessionLimitReached, message)
    }

    /// Session not found
    #[must_use]
    pub fn session_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SessionNotFound, message)
    }

    /// Internal server error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// External (upstream) system error
    #[must_use]
    pub fn external_service(system: impl Into<String>, message: impl Into<String>) -> Self {
        let system_str = system.into();
        let message_str = message.into();
        Self::new(
            ErrorCode::ExternalServiceError,
            format!("{system_str}: {message_str}"),
        )
    }

    /// Authentication with an upstream system failed
    #[must_use]
    pub fn external_auth_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalAuthFailed, message)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(ErrorCode::InternalError, error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::new(ErrorCode::InternalError, format!("IO error: {error}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::InvalidInput, format!("JSON error: {error}"))
    }
}

impl From<uuid::Error> for AppError {
    fn from(error: uuid::Error) -> Self {
        Self::new(ErrorCode::InvalidInput, format!("UUID error: {error}"))
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(error: chrono::ParseError) -> Self {
        Self::new(
            ErrorCode::InvalidInput,
            format!("Date parse error: {error}"),
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::not_found("row"),
            other => Self::database(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        Self::new(ErrorCode::ExternalServiceError, error.to_string())
    }
}
