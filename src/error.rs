use crate::Entity;

/// Error type
#[derive(Debug)]
pub enum Error {
    /// An IO error.
    Io(std::io::Error),

    /// Error in storage engine.
    Storage(fjall::Error),

    /// A reading with a non-positive duration, or a negative or non-finite quantity.
    InvalidReading,

    /// A query range that is reversed or degenerate.
    InvalidRange,

    /// A non-positive point count or bar width.
    InvalidParameter,

    /// The collaborator does not know the entity.
    UnknownEntity(Entity),

    /// A reading source or group resolver failed.
    Collaborator(Box<dyn std::error::Error + Send + Sync>),

    /// The query was cancelled before the entity was processed.
    Cancelled,
}

impl From<fjall::Error> for Error {
    fn from(value: fjall::Error) -> Self {
        Self::Storage(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => {
                write!(f, "{e}",)
            }
            Self::Io(e) => {
                write!(f, "{e}",)
            }
            Self::Collaborator(e) => {
                write!(f, "collaborator failure: {e}",)
            }
            Self::UnknownEntity(entity) => {
                write!(f, "UnknownEntity({entity})",)
            }
            Self::InvalidReading => {
                write!(f, "InvalidReading",)
            }
            Self::InvalidRange => {
                write!(f, "InvalidRange",)
            }
            Self::InvalidParameter => {
                write!(f, "InvalidParameter",)
            }
            Self::Cancelled => {
                write!(f, "Cancelled",)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Collaborator(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Result helper type
pub type Result<T> = std::result::Result<T, Error>;
