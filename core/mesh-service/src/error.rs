use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service is already running")]
    Running,

    #[error("service is closed")]
    Closed,

    #[error("service must be initialized before it can start")]
    NotInitialized,

    #[error("both a local database and remote storage connections were configured")]
    DuplicateStorage,

    #[error("no storage connection config produced a live storage client")]
    StorageUnavailable,

    #[error("thread template {0:?} is not registered")]
    UnknownTemplate(String),

    #[error(transparent)]
    Cert(#[from] mesh_certs::CertError),

    #[error("auth cert region/jurisdiction did not match the connection config: {0}")]
    RegionMismatch(String),

    #[error("peer's auth cert was not valid base64 or hex")]
    BadAuthCertEncoding,

    #[error("auth cert was destroyed: its carrier node could not be found or re-stored")]
    CertDestroyed,

    #[error(transparent)]
    Node(#[from] mesh_node::NodeError),
}
