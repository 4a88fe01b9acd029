use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("strategy tree has no allocating node")]
    EmptyStrategy,

    #[error("call cycle detected through slot \"{0}\"")]
    CallCycle(String),

    #[error("unknown call slot \"{0}\"")]
    UnknownCall(String),
}
