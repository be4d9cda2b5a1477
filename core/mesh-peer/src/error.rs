use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeerError {
    #[error("connection is closed")]
    Closed,

    #[error("request kind is not permitted on this connection")]
    NotAllowed,
}
