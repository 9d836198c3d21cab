// ABOUTME: Configuration management module for centralized server settings and parameters
// ABOUTME: Handles environment-driven configuration for the gateway runtime
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Configuration module for the gateway server
//!
//! Centralizes environment-driven configuration: HTTP bind address, database
//! location, session limits, and pagination safety caps.

/// Environment and server configuration
pub mod environment;

pub use environment::ServerConfig;
