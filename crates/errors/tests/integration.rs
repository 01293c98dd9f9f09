//! Integration tests for error types

#[cfg(test)]
mod tests {
    use macfetch_errors::*;

    #[test]
    fn test_error_conversion() {
        let net_err = NetworkError::Timeout {
            url: "https://example.com".into(),
        };
        let err: Error = net_err.into();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_http_status_is_its_own_kind() {
        let err: Error = NetworkError::http(404, "Not Found").into();
        assert_eq!(err.kind(), ErrorKind::Http);
        assert_eq!(err.http_status(), Some(404));
        assert!(!err.is_transient());

        let err: Error = NetworkError::http(503, "Service Unavailable").into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_artifact_errors_are_never_transient() {
        let errors: Vec<Error> = vec![
            FormatError::BadMagic { found: *b"XXXX" }.into(),
            SigningError::MissingSignature.into(),
            IntegrityError::ChunkMismatch {
                chunk_index: 1,
                offset: 4096,
            }
            .into(),
        ];
        let kinds: Vec<_> = errors.iter().map(Error::kind).collect();
        assert_eq!(
            kinds,
            vec![ErrorKind::Format, ErrorKind::Signature, ErrorKind::Integrity]
        );
        assert!(errors.iter().all(|e| !e.is_transient()));
    }

    #[test]
    fn test_recovery_kinds_and_codes() {
        let expired: Error = RecoveryError::SessionExpired.into();
        assert_eq!(expired.kind(), ErrorKind::SessionExpired);
        assert_eq!(expired.user_code(), Some("recovery.session_expired"));
        assert!(expired.is_retryable());

        let malformed: Error = RecoveryError::MalformedResponse {
            reason: "no AU line".into(),
        }
        .into();
        assert_eq!(malformed.kind(), ErrorKind::Protocol);

        let busy: Error = TaskError::DestinationBusy {
            path: "/tmp/BaseSystem.dmg".into(),
        }
        .into();
        assert_eq!(busy.kind(), ErrorKind::DestinationBusy);
    }

    #[test]
    fn test_io_error_keeps_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::io_with_path(&io, "/tmp/missing.chunklist");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(matches!(
            err,
            Error::Io { kind: std::io::ErrorKind::NotFound, path: Some(_), .. }
        ));
    }
}
