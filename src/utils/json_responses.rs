// ABOUTME: JSON response utilities to eliminate duplication across error and success responses
// ABOUTME: Provides standardized response builders for consistent API responses and error handling
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use serde_json::{json, Value};

/// Create a simple error response with just an error message
#[must_use]
pub fn simple_error(message: &str) -> Value {
    json!({ "error": message })
}

/// Create a simple success response with a message
#[must_use]
pub fn simple_success(message: &str) -> Value {
    json!({ "success": true, "message": message })
}

/// Create a detailed error response with error code and description
#[must_use]
pub fn detailed_error(error_code: &str, description: &str) -> Value {
    json!({
        "success": false,
        "error": error_code,
        "error_description": description
    })
}

/// Create a detailed success response with data
#[must_use]
pub fn detailed_success(message: &str, data: &Value) -> Value {
    json!({
        "success": true,
        "message": message,
        "data": data.clone()
    })
}

/// Create a validation error response with details
#[must_use]
pub fn validation_error(message: &str, details: &Value) -> Value {
    json!({
        "error": "validation_failed",
        "message": message,
        "details": details.clone()
    })
}

/// Create a not found error response
#[must_use]
pub fn not_found_error(resource: &str) -> Value {
    json!({
        "error": "not_found",
        "message": format!("{resource} not found")
    })
}

/// Create an unauthorized error response
#[must_use]
pub fn unauthorized_error(message: &str) -> Value {
    json!({
        "error": "unauthorized",
        "message": message
    })
}

/// Create a service unavailable error response for an upstream system outage
#[must_use]
pub fn service_unavailable_error(system: &str, message: &str) -> Value {
    json!({
        "error": "service_unavailable",
        "system": system,
        "message": message
    })
}

/// Create a credential-missing error for an upstream system
#[must_use]
pub fn credential_missing_error(system: &str) -> Value {
    json!({
        "error": format!("No credential found for system '{system}'"),
        "system": system,
    })
}

/// Create a data serialization error response
#[must_use]
pub fn serialization_error(data_type: &str) -> Value {
    json!({
        "error": format!("Failed to serialize {data_type}")
    })
}

/// Create an invalid format error response
#[must_use]
pub fn invalid_format_error(field: &str, expected_format: &str) -> Value {
    json!({
        "error": format!("Invalid {field} format. Use {expected_format}.")
    })
}

/// Create a generic API error response
#[must_use]
pub fn api_error(message: &str) -> Value {
    json!({ "error": message.to_string() })
}
