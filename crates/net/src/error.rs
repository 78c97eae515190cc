use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("only the authority can do this")]
    NotAuthority,

    #[error("only a client can do this")]
    NotClient,

    #[error("no free entity id in this peer's block")]
    IdSpaceExhausted,

    #[error("entity matches no replicated kind")]
    Unreplicable,

    #[error("no id block assigned yet")]
    NotConnected,

    #[error("no active entity with id {0}")]
    UnknownEntity(u8),
}
