//! Recoverable error taxonomy for the surface engine
//!
//! None of these abort input processing. Callers log them at the boundary
//! and carry on; only configuration and port errors at startup are fatal,
//! and those travel as `anyhow::Error` with context.

use thiserror::Error;

/// Errors raised while addressing surface resources
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// No output entry was registered for this address
    #[error("no output registered for channel {channel} control {control}")]
    UnregisteredOutput { channel: u8, control: u8 },

    /// Mode id was never registered with the mode manager
    #[error("unknown mode '{0}'")]
    UnknownMode(String),

    /// View id was never registered with the view manager
    #[error("unknown view '{0}'")]
    UnknownView(String),

    /// Command refers to a driver that is not registered
    #[error("unknown driver '{0}'")]
    UnknownDriver(String),

    /// Control id does not name a known button or continuous control
    #[error("unknown control id '{0}'")]
    UnknownControl(String),

    /// Layout table contradicts itself (duplicate or overlapping addresses)
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_resource() {
        let err = SurfaceError::UnregisteredOutput {
            channel: 3,
            control: 94,
        };
        assert_eq!(err.to_string(), "no output registered for channel 3 control 94");
        assert_eq!(
            SurfaceError::UnknownMode("pan".into()).to_string(),
            "unknown mode 'pan'"
        );
    }
}
