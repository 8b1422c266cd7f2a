use nmeaplex_frame::InterfaceId;

/// Errors creating a sentence queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A queue must hold at least one sentence.
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    /// The queue storage could not be allocated.
    #[error("could not allocate queue for {0} sentences")]
    Alloc(usize),
}

/// Fatal interface configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required option was not supplied.
    #[error("must specify {option} for {kind} interfaces")]
    MissingOption {
        option: &'static str,
        kind: &'static str,
    },

    /// The `qsize` option is not a positive number.
    #[error("invalid queue size specified: {0}")]
    InvalidQueueSize(String),

    /// An option value could not be parsed.
    #[error("invalid value for {option}: {value}")]
    InvalidValue { option: String, value: String },

    /// The option is not understood by this interface type.
    #[error("unknown interface option {0}")]
    UnknownOption(String),

    /// The direction string is not one of in/out/both.
    #[error("invalid direction: {0}")]
    InvalidDirection(String),
}

/// Errors building or running an interface.
#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    /// Configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The interface queue could not be created.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Splitting a bidirectional interface failed.
    #[error("interface duplication failed for {id}: {source}")]
    Duplicate {
        id: InterfaceId,
        source: std::io::Error,
    },

    /// A worker thread could not be started.
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, InterfaceError>;
