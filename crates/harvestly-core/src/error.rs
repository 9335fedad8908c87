// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for harvestly-core.
//!
//! Provides a unified error type with stable error codes that the HTTP
//! layer maps to status codes and JSON bodies.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during scheduling and lifecycle operations.
///
/// Zero availability within the horizon is deliberately *not* an error:
/// the lifecycle manager nulls `next_order_date` and flags the record for
/// review instead.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Schedule was not found.
    ScheduleNotFound {
        /// The schedule id that was not found.
        schedule_id: String,
    },

    /// Schedule assignment was not found.
    AssignmentNotFound {
        /// The assignment id that was not found.
        assignment_id: String,
    },

    /// Subscription was not found.
    SubscriptionNotFound {
        /// The subscription id that was not found.
        subscription_id: String,
    },

    /// Delivery or shipping zone was not found.
    ZoneNotFound {
        /// The zone id that was not found.
        zone_id: String,
    },

    /// Fulfillment location was not found.
    LocationNotFound {
        /// The location id that was not found.
        location_id: String,
    },

    /// A recurrence rule is malformed for its declared frequency.
    InvalidRecurrenceRule {
        /// What is wrong with the rule.
        message: String,
    },

    /// Input validation failed.
    Validation {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// The requested transition is not permitted in the subscription's
    /// current state (e.g., resume on an active subscription, anything on
    /// a cancelled one).
    IllegalTransition {
        /// The subscription id.
        subscription_id: String,
        /// The operation that was attempted.
        operation: String,
        /// The status the subscription was in.
        status: String,
    },

    /// An optimistic-version write lost to a concurrent writer, even after
    /// one internal retry against fresh state.
    ConcurrencyConflict {
        /// The contended subscription id.
        subscription_id: String,
    },

    /// The external order-creation collaborator failed; the subscription
    /// was not advanced.
    OrderCreationFailed {
        /// The subscription id.
        subscription_id: String,
        /// Error details from the collaborator.
        details: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the stable error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ScheduleNotFound { .. } => "SCHEDULE_NOT_FOUND",
            Self::AssignmentNotFound { .. } => "ASSIGNMENT_NOT_FOUND",
            Self::SubscriptionNotFound { .. } => "SUBSCRIPTION_NOT_FOUND",
            Self::ZoneNotFound { .. } => "ZONE_NOT_FOUND",
            Self::LocationNotFound { .. } => "LOCATION_NOT_FOUND",
            Self::InvalidRecurrenceRule { .. } => "VALIDATION_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::OrderCreationFailed { .. } => "ORDER_CREATION_FAILED",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScheduleNotFound { schedule_id } => {
                write!(f, "Schedule '{}' not found", schedule_id)
            }
            Self::AssignmentNotFound { assignment_id } => {
                write!(f, "Schedule assignment '{}' not found", assignment_id)
            }
            Self::SubscriptionNotFound { subscription_id } => {
                write!(f, "Subscription '{}' not found", subscription_id)
            }
            Self::ZoneNotFound { zone_id } => {
                write!(f, "Zone '{}' not found", zone_id)
            }
            Self::LocationNotFound { location_id } => {
                write!(f, "Location '{}' not found", location_id)
            }
            Self::InvalidRecurrenceRule { message } => {
                write!(f, "Invalid recurrence rule: {}", message)
            }
            Self::Validation { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::IllegalTransition {
                subscription_id,
                operation,
                status,
            } => {
                write!(
                    f,
                    "Cannot {} subscription '{}' in status '{}'",
                    operation, subscription_id, status
                )
            }
            Self::ConcurrencyConflict { subscription_id } => {
                write!(
                    f,
                    "Concurrent modification of subscription '{}'",
                    subscription_id
                )
            }
            Self::OrderCreationFailed {
                subscription_id,
                details,
            } => {
                write!(
                    f,
                    "Order creation failed for subscription '{}': {}",
                    subscription_id, details
                )
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
