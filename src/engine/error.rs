use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or missing input. Nothing was written.
    Validation(String),
    /// No row matched the (service, provider) pair.
    NotFoundOrUnauthorized(Ulid),
    NotFound(Ulid),
    AlreadyExists(String),
    CapacityExceeded {
        capacity: u32,
    },
    /// A staged row change violated referential integrity.
    Constraint(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// The store could not complete the unit of work.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, EngineError::Constraint(_) | EngineError::WalError(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::NotFoundOrUnauthorized(id) => {
                write!(f, "service {id} not found for this provider")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(name) => write!(f, "already exists: {name}"),
            EngineError::CapacityExceeded { capacity } => {
                write!(f, "slot is full: all {capacity} seats taken")
            }
            EngineError::Constraint(msg) => write!(f, "constraint violation: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
