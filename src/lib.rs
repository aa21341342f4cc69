//! txtrail - Transaction lifecycle state store with diff-based audit history
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Records
//! - [`transaction`] - Record, status, and parameter types plus validation
//!
//! ## Lifecycle
//! - [`manager`] - The transaction state manager and its filters
//! - [`history`] - Snapshot, diff, and replay of audit history
//!
//! ## Notifications
//! - [`events`] - Per-transaction and wildcard status channels
//!
//! ## State Management
//! - [`store`] - Pluggable persistence containers
//! - [`ids`] - Transaction id generation
//! - [`network`] - Network scoping
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Records
// ============================================================================
pub mod transaction;

// ============================================================================
// Lifecycle
// ============================================================================
pub mod history;
pub mod manager;

// ============================================================================
// Notifications
// ============================================================================
pub mod events;

// ============================================================================
// State Management
// ============================================================================
pub mod ids;
pub mod network;
pub mod store;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
