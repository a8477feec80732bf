// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device client error taxonomy.

use thiserror::Error;

/// Errors from device operations.
///
/// `Connect` and `Timeout` are the transient pair: they are expected while
/// a device reboots and are absorbed by the validator retry envelope and
/// the job poller's transient tolerance. The rest surface immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("device refused operation: {0}")]
    Refused(String),

    /// A response arrived but required fields were missing or malformed.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ClientError {
    /// True for errors expected during a reboot window.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Connect(_) | ClientError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        connect = { ClientError::Connect("refused".into()), true },
        timeout = { ClientError::Timeout("300s".into()), true },
        auth = { ClientError::Auth("bad key".into()), false },
        refused = { ClientError::Refused("busy".into()), false },
        protocol = { ClientError::Protocol("missing serial".into()), false },
        not_found = { ClientError::NotFound("job 42".into()), false },
    )]
    fn transient_classification(err: ClientError, transient: bool) {
        assert_eq!(err.is_transient(), transient);
    }
}
