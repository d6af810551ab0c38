//! Error types for the vault engine
//!
//! Only `AllEndpointsUnavailable` and `NoValidQuotes` ever reach the read
//! model. Per-endpoint failures are absorbed by the failover loop.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Transport failure or timeout against a single endpoint
    #[error("endpoint {endpoint} unreachable: {reason}")]
    EndpointUnreachable { endpoint: String, reason: String },

    /// Endpoint answered but the payload could not be decoded
    #[error("malformed response from {endpoint}: {reason}")]
    DecodeError { endpoint: String, reason: String },

    #[error("all {attempts} endpoints unavailable (last error: {last_error})")]
    AllEndpointsUnavailable { attempts: usize, last_error: String },

    /// Vault call succeeded but no pool rate could be read
    #[error("no valid pool quotes in snapshot")]
    NoValidQuotes,

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("settlement step failed: {0}")]
    Settlement(String),
}

impl VaultError {
    /// Errors that the failover loop recovers from by trying the next endpoint
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::EndpointUnreachable { .. } | VaultError::DecodeError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_retries_like_transport_error() {
        let transport = VaultError::EndpointUnreachable {
            endpoint: "https://rpc.sepolia.org".to_string(),
            reason: "connection refused".to_string(),
        };
        let decode = VaultError::DecodeError {
            endpoint: "https://rpc.sepolia.org".to_string(),
            reason: "short buffer".to_string(),
        };

        assert!(transport.is_retryable());
        assert!(decode.is_retryable());
        assert!(!VaultError::NoValidQuotes.is_retryable());
    }

    #[test]
    fn test_exhausted_message_carries_last_error() {
        let err = VaultError::AllEndpointsUnavailable {
            attempts: 4,
            last_error: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "all 4 endpoints unavailable (last error: timeout)"
        );
    }
}
