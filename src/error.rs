use std::str::Utf8Error;
use std::string::FromUtf8Error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    FromUtf8(#[from] FromUtf8Error),

    // --------------------------------- connection errors -----------------------------------------
    #[error("connect to client failed")]
    Connect,
    #[error("time-out connecting to client (waited: {0} ms)")]
    ConnectTimeout(u64),
    #[error("no permission connecting to client")]
    ConnectPermission,
    #[error("debug session is not active")]
    NoSession,
    #[error("client closed the connection")]
    Disconnected,

    // --------------------------------- wire format errors ----------------------------------------
    #[error("parse error in command")]
    Parse,
    #[error("duplicate arguments in command")]
    DuplicateArgument,
    #[error("message has no length prefix")]
    MissingLengthPrefix,

    // --------------------------------- configuration errors --------------------------------------
    #[error("config file parsing error: {0}")]
    ConfigParsing(#[from] toml::de::Error),
}

impl Error {
    /// Return a hint to the embedder - a failed connect is survivable (the
    /// program just runs without a debugger), a broken active session is not.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Connect => false,
            Error::ConnectTimeout(_) => false,
            Error::ConnectPermission => false,
            Error::NoSession => false,
            Error::Parse => false,
            Error::DuplicateArgument => false,
            Error::ConfigParsing(_) => false,

            Error::IO(_) => true,
            Error::Utf8(_) => true,
            Error::FromUtf8(_) => true,
            Error::Disconnected => true,
            Error::MissingLengthPrefix => true,
        }
    }
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $crate::dbg_warn!("{:#}", e);
                None
            }
        }
    };
    ($res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $crate::dbg_warn!(concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}
