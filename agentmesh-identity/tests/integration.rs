//! Integration tests for agentmesh-identity.

use agentmesh_identity::{
    SecurityError, SignedRequest, SigningKey, derive_id, ensure_id_matches, hash_json,
    sign_manifest, validate_id, verify_manifest, verify_manifest_signature,
};
use chrono::{Duration, Utc};
use serde_json::json;

fn agent_manifest(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": "Summarizer",
        "version": "1.0.0",
        "description": "Summarizes documents",
        "skills": [{"name": "summarize", "description": "Condense text"}],
        "tags": ["nlp", "text"],
        "endpoint": "http://summarizer.local:8080",
        "protocol": "http",
    })
}

#[test]
fn register_style_flow_verifies() {
    // Arrange
    let key = SigningKey::generate();
    let public_key = key.verifying_key().to_base64();
    let id = derive_id(&public_key);
    let manifest = agent_manifest(&id);

    // Act
    let signature = sign_manifest(&key, &manifest);

    // Assert
    assert!(validate_id(&id, &public_key));
    assert!(verify_manifest_signature(
        &manifest,
        Some(&signature),
        Some(&public_key)
    ));
}

#[test]
fn stolen_id_is_rejected() {
    // Arrange
    let victim = SigningKey::generate().verifying_key().to_base64();
    let attacker = SigningKey::generate().verifying_key().to_base64();

    // Act
    let result = ensure_id_matches(&derive_id(&victim), &attacker);

    // Assert
    assert!(matches!(result, Err(SecurityError::IdMismatch { .. })));
}

#[test]
fn manifest_signed_by_other_key_is_invalid() {
    let owner = SigningKey::generate();
    let forger = SigningKey::generate();
    let public_key = owner.verifying_key().to_base64();
    let manifest = agent_manifest(&derive_id(&public_key));

    let signature = sign_manifest(&forger, &manifest);
    let result = verify_manifest(&manifest, Some(&signature), Some(&public_key));

    assert_eq!(result, Err(SecurityError::InvalidSignature));
}

#[test]
fn replayed_request_is_rejected_despite_valid_signature() {
    // Arrange
    let key = SigningKey::generate();
    let public_key = key.verifying_key().to_base64();
    let now = Utc::now();
    let body_hash = hash_json(&json!({"input": "hello"}));
    let request = SignedRequest::sign_at(
        &key,
        derive_id(&public_key),
        "POST",
        "/invoke",
        body_hash,
        now - Duration::seconds(120),
    );

    // Act
    let result = request.verify_at(&public_key, now);

    // Assert
    assert!(matches!(
        result,
        Err(SecurityError::StaleTimestamp {
            window_secs: 60,
            ..
        })
    ));
    // The same request is fine inside the window.
    assert!(request
        .verify_at(&public_key, now - Duration::seconds(100))
        .is_ok());
}

#[test]
fn signed_request_serializes() {
    let key = SigningKey::generate();
    let request = SignedRequest::sign(&key, "a1", "GET", "/agents", "h");

    let text = serde_json::to_string(&request).unwrap();
    let back: SignedRequest = serde_json::from_str(&text).unwrap();

    assert_eq!(back, request);
}
