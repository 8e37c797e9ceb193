// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use super::super::*;

    fn unavailable() -> StoreError {
        StoreError::Unavailable {
            op: "put",
            key: "/skydns/zone/svc/a/primary".to_string(),
            reason: "connection refused".to_string(),
        }
    }

    fn rejected() -> StoreError {
        StoreError::Rejected {
            op: "put",
            key: "/skydns/zone/svc/a/primary".to_string(),
            reason: "permission denied".to_string(),
        }
    }

    #[test]
    fn test_store_error_classification() {
        assert!(unavailable().is_retryable());
        assert!(!rejected().is_retryable());
        assert_eq!(unavailable().error_type(), "store_unavailable");
        assert_eq!(rejected().error_type(), "store_rejected");
    }

    #[test]
    fn test_reconcile_error_classification() {
        assert!(ReconcileError::from(unavailable()).is_retryable());
        assert!(!ReconcileError::from(rejected()).is_retryable());

        let codec = ReconcileError::from(CodecError::DuplicateEndpoint("primary".to_string()));
        assert!(!codec.is_retryable());
        assert_eq!(codec.error_type(), "invalid_spec");
    }

    #[test]
    fn test_error_messages() {
        let msg = unavailable().to_string();
        assert!(msg.contains("unavailable"));
        assert!(msg.contains("/skydns/zone/svc/a/primary"));
        assert!(msg.contains("connection refused"));

        let msg = ConfigError::MissingFile("etcd CA certificate file").to_string();
        assert_eq!(msg, "missing required etcd CA certificate file");
    }
}
