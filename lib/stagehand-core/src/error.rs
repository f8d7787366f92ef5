//! Error types.

use snafu::Snafu;
pub use stagehand_error::GenericError;

/// Service tree errors.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ServiceError {
    /// A service with the same name is already registered in the collection.
    #[snafu(display("Cannot have two services with the same name '{}'.", name))]
    DuplicateName {
        /// The conflicting name.
        name: String,
    },

    /// The requested service is not a child of the collection.
    #[snafu(display("Service '{}' was not found.", service))]
    NotFound {
        /// Name, or identifier, of the service that was requested.
        service: String,
    },

    /// A tiered service was structurally modified while running.
    #[snafu(display("Tiered service '{}' has been started, {} is not permitted.", service, operation))]
    IllegalMutation {
        /// Name, or identifier, of the tiered service.
        service: String,

        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The service is still registered with another parent.
    #[snafu(display("Service '{}' is already attached to a parent. Detach it first.", service))]
    AlreadyAttached {
        /// Name, or identifier, of the service being registered.
        service: String,
    },

    /// The service is the parent it is being registered with, or one of that parent's ancestors.
    #[snafu(display("Service '{}' cannot be registered beneath itself.", service))]
    WouldCycle {
        /// Name, or identifier, of the service being registered.
        service: String,
    },

    /// A service's behavior failed during a lifecycle operation.
    #[snafu(display("Service '{}' failed to {}: {}", service, operation, source))]
    Failed {
        /// Name, or identifier, of the failed service.
        service: String,

        /// The lifecycle operation that failed.
        operation: &'static str,

        /// The underlying error.
        source: GenericError,
    },
}
