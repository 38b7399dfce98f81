use std::{error::Error, fmt::Display, io};

use crate::ingestion_channel::ChannelError;

/// Things that stop a terminal display from running.
#[derive(Debug)]
pub enum DisplayError {
    /// The terminal could not be driven.
    IOError(io::Error),
    /// A session could not be started from the display.
    Channel(ChannelError),
}

impl Display for DisplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayError::IOError(e) => write!(f, "terminal error: {}", e),
            DisplayError::Channel(e) => write!(f, "{}", e),
        }
    }
}

impl Error for DisplayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DisplayError::IOError(e) => Some(e),
            DisplayError::Channel(e) => Some(e),
        }
    }
}

impl From<io::Error> for DisplayError {
    fn from(value: io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<ChannelError> for DisplayError {
    fn from(value: ChannelError) -> Self {
        Self::Channel(value)
    }
}
