//! Error types for the birthday bot.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl DatabaseError {
    /// Whether this is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Directory gateway errors.
///
/// Not-found and transport failures are deliberately not distinguished by
/// callers; both mean "this email cannot be resolved right now".
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Request(String),

    #[error("Employee not found: {email}")]
    NotFound { email: String },

    #[error("Invalid directory response: {0}")]
    InvalidResponse(String),
}

/// Outbound notification errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Send failed: {0}")]
    Send(String),
}

/// Identity/auth service errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Failed to generate activation token: {0}")]
    Token(String),

    #[error("User already exists: {email}")]
    UserExists { email: String },

    #[error("Activation token is invalid or already used")]
    InvalidToken,

    #[error("Invalid activation link base: {0}")]
    Link(String),

    #[error("Failed to send activation message: {0}")]
    Notify(#[from] NotifyError),

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),
}
