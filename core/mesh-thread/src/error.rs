use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThreadError {
    #[error("stream() promotion left neither triggerNodeId nor a prior root set")]
    NoTrigger,

    #[error("template substitution failed: {0}")]
    Template(#[from] mesh_template::TemplateError),

    #[error("template value did not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("post template {0:?} is not registered on this thread")]
    UnknownPostTemplate(String),

    #[error(transparent)]
    Node(#[from] mesh_node::NodeError),

    #[error("node is not licensed at distance 0, nothing to destroy")]
    NotLicensed,

    #[error("store failed with status {status:?}: {reason}")]
    StoreFailed { status: mesh_types::Status, reason: String },

    #[error("storage call was cancelled before a reply arrived")]
    Cancelled,
}
