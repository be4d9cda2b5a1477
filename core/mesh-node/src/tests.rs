use std::sync::Arc;

use pretty_assertions::assert_eq;

use async_trait::async_trait;
use mesh_certs::{CertChain, CertFamily, DecodedCert};
use mesh_types::{PublicKey, SignatureOffloader, TimeFreeze};

use crate::factory::NodeFactory;
use crate::params::{NodeKind, NodeParams};

struct StubOffloader;

#[async_trait]
impl SignatureOffloader for StubOffloader {
    async fn verify(&self, _message: &[u8], _signature: &[u8], _public_key: &PublicKey) -> bool {
        true
    }

    async fn sign(&self, _message: &[u8], _public_key: &PublicKey) -> Option<Vec<u8>> {
        Some(b"sig".to_vec())
    }

    fn hash(&self, message: &[u8]) -> [u8; 32] {
        *blake3::hash(message).as_bytes()
    }

    fn local_public_keys(&self) -> Vec<PublicKey> {
        vec![]
    }
}

fn owner() -> PublicKey {
    PublicKey::from([1u8; 32])
}

fn signer() -> PublicKey {
    PublicKey::from([2u8; 32])
}

fn factory() -> NodeFactory<TimeFreeze> {
    let clock = TimeFreeze::new();
    clock.freeze(1_000);
    NodeFactory::new(clock, Arc::new(CertChain::new()))
}

#[tokio::test]
async fn defaults_creation_time_and_parent_id() {
    let factory = factory();
    let (props, _sig) = factory
        .build(NodeKind::Data, NodeParams::default(), Some(&owner()), &StubOffloader)
        .await
        .unwrap();

    assert_eq!(props.creation_time, 1_000);
    assert!(props.parent_id.is_zero());
    assert_eq!(props.node_type, b"data");
}

#[tokio::test]
async fn license_defaults_expire_time_to_one_hour_out() {
    let factory = factory();
    let (props, _sig) = factory
        .build(NodeKind::License, NodeParams::default(), Some(&owner()), &StubOffloader)
        .await
        .unwrap();

    assert_eq!(props.expire_time, Some(4_600));
}

#[tokio::test]
async fn owner_defaults_to_signer_when_unset() {
    let factory = factory();
    let (props, _sig) = factory
        .build(NodeKind::Data, NodeParams::default(), Some(&signer()), &StubOffloader)
        .await
        .unwrap();

    assert_eq!(props.owner, signer());
}

#[tokio::test]
async fn fails_without_a_sign_cert_when_signer_differs_from_owner() {
    let factory = factory();
    let params = NodeParams {
        owner: Some(owner()),
        ..Default::default()
    };

    let err = factory
        .build(NodeKind::Data, params, Some(&signer()), &StubOffloader)
        .await
        .unwrap_err();

    assert!(matches!(err, crate::NodeError::NoMatchingSignCert { .. }));
}

#[tokio::test]
async fn succeeds_with_an_attached_sign_cert_covering_the_delegated_signer() {
    let factory = factory();
    factory.add_sign_cert(DecodedCert {
        family: CertFamily::NodeSign,
        image: vec![0x00, 0xa0],
        signed_message: vec![],
        signature: vec![],
        issuer: owner(),
        target_keys: vec![signer()],
        accepted_node_types: vec![b"data".to_vec()],
        lock_constraints: vec![],
        embedded_image: None,
        parent: None,
    });

    let params = NodeParams {
        owner: Some(owner()),
        ..Default::default()
    };

    let (props, _sig) = factory
        .build(NodeKind::Data, params, Some(&signer()), &StubOffloader)
        .await
        .unwrap();

    assert_eq!(props.owner, owner());
}

#[tokio::test]
async fn node_id1_is_the_hash_of_the_packed_body() {
    let factory = factory();
    let params = NodeParams {
        body: b"hello".to_vec(),
        ..Default::default()
    };

    let (props, _sig) = factory
        .build(NodeKind::Data, params, Some(&owner()), &StubOffloader)
        .await
        .unwrap();

    assert_eq!(props.id1.as_bytes(), blake3::hash(b"hello").as_bytes());
}
