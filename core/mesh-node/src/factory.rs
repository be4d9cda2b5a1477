use std::sync::Arc;

use mesh_certs::CertChain;
use mesh_types::{Clock, NodeId1, NodeImage, NodeProps, PublicKey, SignatureOffloader, SystemClock};
use parking_lot::RwLock;

use crate::error::NodeError;
use crate::params::{NodeKind, NodeParams};

/// Builds DataNode/LicenseNode/CarrierNode bodies from parameter structs,
/// applying the shared defaulting and signing rules. Holds the sign certs
/// attached to this identity so it can find one authorizing a delegated
/// signer without the caller threading them through every call.
pub struct NodeFactory<C: Clock = SystemClock> {
    clock: C,
    cert_chain: Arc<CertChain>,
    sign_certs: RwLock<Vec<mesh_certs::DecodedCert>>,
}

impl<C: Clock> NodeFactory<C> {
    pub fn new(clock: C, cert_chain: Arc<CertChain>) -> Self {
        Self {
            clock,
            cert_chain,
            sign_certs: RwLock::new(Vec::new()),
        }
    }

    /// Hot-updates the attached sign certs (mirrors `Service::addSignCert`).
    pub fn add_sign_cert(&self, cert: mesh_certs::DecodedCert) {
        self.sign_certs.write().push(cert);
    }

    /// This factory's notion of "now", for callers that need to stamp a
    /// timestamp outside of `build`'s own defaulting (e.g. a CarrierNode's
    /// fixed 1h expiry, §6.4).
    pub fn now_unix(&self) -> u64 {
        self.clock.now_unix()
    }

    /// Builds and signs a node body.
    ///
    /// Defaults are applied in this order: `creationTime ← now()`,
    /// `parentId ← zero[32]`, license `expireTime ← creationTime + 3600s`,
    /// `owner ← signer` if unset. If `owner != signer`, a sign cert
    /// authorizing the signer for this owner/type must be attached or the
    /// call fails with `NoMatchingSignCert`.
    pub async fn build(
        &self,
        kind: NodeKind,
        params: NodeParams,
        signer: Option<&PublicKey>,
        offloader: &dyn SignatureOffloader,
    ) -> Result<(NodeProps, Vec<u8>), NodeError> {
        let creation_time = params.creation_time.unwrap_or_else(|| self.clock.now_unix());
        let parent_id = params.parent_id.unwrap_or_default();
        let expire_time = params
            .expire_time
            .or_else(|| kind.default_expire_seconds().map(|secs| creation_time + secs));
        let node_type = if params.node_type.is_empty() {
            kind.default_type_tag().to_vec()
        } else {
            params.node_type
        };
        let owner = match (params.owner, signer) {
            (Some(owner), _) => owner,
            (None, Some(signer)) => *signer,
            (None, None) => PublicKey::default(),
        };

        let mut props = NodeProps {
            id1: NodeId1::default(),
            parent_id,
            owner,
            creation_time,
            expire_time,
            flags: params.flags,
            license_min_distance: params.license_min_distance,
            license_max_distance: params.license_max_distance,
            data_config: params.data_config,
            ref_id: params.ref_id,
            node_type,
            image: NodeImage(params.body),
        };

        let signing_key = match signer {
            Some(signer) if *signer != owner => {
                let certs = self.sign_certs.read().clone();
                self.cert_chain
                    .match_node_cert(&props, signer, &certs)
                    .ok_or(NodeError::NoMatchingSignCert { owner, signer: *signer })?;
                *signer
            }
            Some(signer) => *signer,
            None => owner,
        };

        let signature = offloader
            .sign(&props.image.0, &signing_key)
            .await
            .ok_or(NodeError::SigningFailed)?;

        props.id1 = NodeId1(offloader.hash(&props.image.0));
        Ok((props, signature))
    }
}
