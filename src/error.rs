use std::{fmt::Display, rc::Rc};


/// Error carried by a stream's terminal `Error` event.
///
/// Errors are multicast to every subscriber of a hot stream, so this type is cheap to clone.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(Rc<str>),

    #[error("{0}")]
    Source(Rc<dyn std::error::Error + 'static>),

    /// The factory of a keyed cache failed while creating the resource for `key`.
    #[error("failed to create resource for key {key}: {source}")]
    Factory { key: String, source: Box<Error> },
}

impl Error {
    pub fn new(e: impl std::error::Error + 'static) -> Self {
        Self::Source(Rc::new(e))
    }
    pub fn msg(message: impl Display) -> Self {
        Self::Message(message.to_string().into())
    }

    pub(crate) fn factory(key: &impl std::fmt::Debug, source: Error) -> Self {
        Self::Factory {
            key: format!("{key:?}"),
            source: Box::new(source),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Message(a), Self::Message(b)) => a == b,
            (Self::Source(a), Self::Source(b)) => {
                Rc::ptr_eq(a, b) || a.to_string() == b.to_string()
            }
            (
                Self::Factory { key, source },
                Self::Factory {
                    key: other_key,
                    source: other_source,
                },
            ) => key == other_key && source == other_source,
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
