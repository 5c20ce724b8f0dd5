//! # Provisioning Lifecycle Tests
//!
//! The full claim -> bind -> rotate lifecycle across the provisioning
//! service, the crypto layer, and the authenticator:
//!
//! ```text
//! admin ──claim──> SetupToken ──bind──> DeviceBinding ──rotate──> KeyRotation
//!                                           │                         │
//!                                    signed requests          both keys valid
//!                                    authenticate             during grace only
//! ```

#[cfg(test)]
mod tests {
    use bridge_crypto::{current_timestamp_ms, sign_request};
    use bridge_provisioning::{
        store::purge_expired_keys, BindRequest, ClaimRequest, InMemoryDeviceStore,
        InMemoryTokenStore, ProvisioningService, RotateReason, RotateRequest,
    };
    use bridge_security::{
        Authenticator, HEADER_DEVICE_ID, HEADER_SIGNATURE, HEADER_TENANT_ID, HEADER_TIMESTAMP,
    };
    use bridge_types::{BridgeError, TokenFault};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Fixture {
        service: ProvisioningService,
        devices: Arc<InMemoryDeviceStore>,
        authenticator: Authenticator,
    }

    fn fixture() -> Fixture {
        let devices = Arc::new(InMemoryDeviceStore::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        Fixture {
            service: ProvisioningService::new(tokens, devices.clone()),
            authenticator: Authenticator::new(devices.clone()),
            devices,
        }
    }

    fn claim_request(ttl_secs: u64) -> ClaimRequest {
        ClaimRequest {
            tenant_id: "tenant-a".into(),
            farm_id: Some("farm-1".into()),
            ttl_secs: Some(ttl_secs),
            ip_allowlist: None,
            user_agent: Some("bridge-admin/1.0".into()),
        }
    }

    fn bind_request(token: &str) -> BindRequest {
        BindRequest {
            setup_token: token.to_owned(),
            device_id: "dev-1".into(),
            device_type: "sensor".into(),
            capabilities: vec!["temp".into()],
            public_key: None,
        }
    }

    fn signed_headers(key: &str, body: &str) -> HashMap<String, String> {
        let now = current_timestamp_ms();
        let mut headers = HashMap::new();
        headers.insert(HEADER_DEVICE_ID.to_owned(), "dev-1".to_owned());
        headers.insert(HEADER_TENANT_ID.to_owned(), "tenant-a".to_owned());
        headers.insert(HEADER_TIMESTAMP.to_owned(), now.to_string());
        headers.insert(HEADER_SIGNATURE.to_owned(), sign_request(key, body, now));
        headers
    }

    #[tokio::test]
    async fn test_claimed_token_binds_exactly_once() {
        let f = fixture();
        let token = f.service.claim(claim_request(600)).await.unwrap();

        // Token issued with the requested 600 s window.
        let remaining = token.expires_at - Utc::now();
        assert!(remaining.num_seconds() > 590 && remaining.num_seconds() <= 600);

        let binding = f.service.bind(bind_request(&token.token)).await.unwrap();
        assert_eq!(binding.tenant_id, "tenant-a");

        let mut second = bind_request(&token.token);
        second.device_id = "dev-2".into();
        let err = f.service.bind(second).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::TokenInvalid {
                fault: TokenFault::Consumed
            }
        ));
    }

    #[tokio::test]
    async fn test_bound_device_authenticates_with_issued_key() {
        let f = fixture();
        let token = f.service.claim(claim_request(600)).await.unwrap();
        let binding = f.service.bind(bind_request(&token.token)).await.unwrap();

        let body = r#"{"metrics":{"temp_c":20}}"#;
        let headers = signed_headers(binding.device_key.expose(), body);

        let ctx = f
            .authenticator
            .authenticate(&headers, body, None)
            .await
            .unwrap();
        assert_eq!(ctx.device_id, "dev-1");
        assert_eq!(ctx.farm_id.as_deref(), Some("farm-1"));
    }

    #[tokio::test]
    async fn test_rotation_honors_grace_then_rejects_old_key() {
        let f = fixture();
        let token = f.service.claim(claim_request(600)).await.unwrap();
        let binding = f.service.bind(bind_request(&token.token)).await.unwrap();
        let old_key = binding.device_key.expose().to_owned();

        let rotation = f
            .service
            .rotate(RotateRequest {
                device_id: "dev-1".into(),
                current_key: old_key.clone(),
                reason: RotateReason::ScheduledRotation,
            })
            .await
            .unwrap();

        let body = "{}";

        // During grace both keys authenticate.
        let new_key = rotation.new_key.expose().to_owned();
        for key in [&old_key, &new_key] {
            let headers = signed_headers(key, body);
            assert!(
                f.authenticator.authenticate(&headers, body, None).await.is_ok(),
                "key should authenticate during grace"
            );
        }

        // Force the grace window shut: a zero-length grace expires at once.
        let rotation2 = f
            .service
            .rotate_with_grace(
                RotateRequest {
                    device_id: "dev-1".into(),
                    current_key: rotation.new_key.expose().to_owned(),
                    reason: RotateReason::KeyCompromised,
                },
                0,
            )
            .await
            .unwrap();

        let stale_headers = signed_headers(rotation.new_key.expose(), body);
        assert!(f
            .authenticator
            .authenticate(&stale_headers, body, None)
            .await
            .is_err());

        let fresh_headers = signed_headers(rotation2.new_key.expose(), body);
        assert!(f
            .authenticator
            .authenticate(&fresh_headers, body, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_expired_grace_keys_are_purged_from_the_store() {
        let f = fixture();
        let token = f.service.claim(claim_request(600)).await.unwrap();
        let binding = f.service.bind(bind_request(&token.token)).await.unwrap();

        f.service
            .rotate_with_grace(
                RotateRequest {
                    device_id: "dev-1".into(),
                    current_key: binding.device_key.expose().to_owned(),
                    reason: RotateReason::ScheduledRotation,
                },
                0,
            )
            .await
            .unwrap();

        let purged = purge_expired_keys(f.devices.as_ref(), Utc::now())
            .await
            .unwrap();
        assert_eq!(purged, 1);
    }

    #[tokio::test]
    async fn test_rotate_requires_matching_current_key() {
        let f = fixture();
        let token = f.service.claim(claim_request(600)).await.unwrap();
        f.service.bind(bind_request(&token.token)).await.unwrap();

        let err = f
            .service
            .rotate(RotateRequest {
                device_id: "dev-1".into(),
                current_key: "DK_not_the_key".into(),
                reason: RotateReason::KeyCompromised,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::KeyInvalid { .. }));
    }
}
