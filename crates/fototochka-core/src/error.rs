use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("unknown topic key '{0}'")]
    UnknownTopic(String),

    #[error("unknown keyboard '{keyboard}' for topic '{topic}'")]
    UnknownKeyboard { topic: String, keyboard: String },

    #[error("duplicate knowledge entry for topic '{0}'")]
    DuplicateTopic(String),

    #[error("knowledge entry '{0}' has empty text")]
    EmptyText(String),

    #[error("knowledge base has no fallback entry '{0}'")]
    MissingFallback(String),

    #[error("knowledge base is missing entries referenced by the matcher: {}", .0.join(", "))]
    Incomplete(Vec<String>),

    #[error("failed to read knowledge file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse knowledge file: {0}")]
    Parse(#[from] toml::de::Error),
}
