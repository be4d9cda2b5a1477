use std::collections::HashMap;
use std::sync::Arc;

use mesh_types::{NodeProps, PublicKey, SignatureOffloader};
use serde_json::Value;
use tracing::debug;

use crate::error::CertError;

/// Which per-family registry a decoded cert belongs to. Mirrors the four
/// registries the source keeps alongside the node registries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CertFamily {
    Auth,
    Chain,
    Friend,
    NodeSign,
}

/// A single `field == value` constraint a cert can carry, e.g.
/// `isLockedOnLicenseConfig`. Validation compares against the target map by
/// field name; a missing target field is not itself a failure (the source
/// only ever fails on a present-but-mismatched value).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockConstraint {
    pub field: String,
    pub expected: Value,
}

/// A cert with its embedded parent (if any) already decoded and its raw
/// image retained for signature verification.
#[derive(Clone, Debug)]
pub struct DecodedCert {
    pub family: CertFamily,
    pub image: Vec<u8>,
    pub signed_message: Vec<u8>,
    pub signature: Vec<u8>,
    pub issuer: PublicKey,
    pub target_keys: Vec<PublicKey>,
    pub accepted_node_types: Vec<Vec<u8>>,
    pub lock_constraints: Vec<LockConstraint>,
    pub embedded_image: Option<Vec<u8>>,
    pub parent: Option<Box<DecodedCert>>,
}

/// Recognizes and parses one cert encoding within a family's registry.
/// Implementations return `None` for images they don't own so `decode` can
/// fall through to the next registered loader.
pub trait CertLoader: Send + Sync {
    fn try_load(&self, image: &[u8]) -> Option<DecodedCert>;
}

/// Recursive decode/verify/validate over the cert stack. Holds no state
/// beyond the registries; callers own the certs it produces.
#[derive(Default)]
pub struct CertChain {
    family_for_interface: HashMap<u16, CertFamily>,
    loaders: HashMap<CertFamily, Vec<Arc<dyn CertLoader>>>,
}

impl CertChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a 2-byte primary interface tag (offset 0 of the image)
    /// with the family that owns it.
    pub fn register_interface(&mut self, interface: u16, family: CertFamily) {
        self.family_for_interface.insert(interface, family);
    }

    pub fn register_loader(&mut self, family: CertFamily, loader: Arc<dyn CertLoader>) {
        self.loaders.entry(family).or_default().push(loader);
    }

    fn primary_interface(image: &[u8]) -> Result<u16, CertError> {
        if image.len() < 2 {
            return Err(CertError::Truncated);
        }
        Ok(u16::from_be_bytes([image[0], image[1]]))
    }

    /// Decodes `image` against the registry for the family its primary
    /// interface tag maps to, then recursively decodes any embedded cert
    /// image as a chain cert. A decode failure of the embedded cert is
    /// swallowed: the parent is returned as-is with `parent` left `None`.
    pub fn decode(&self, image: &[u8]) -> Result<DecodedCert, CertError> {
        let interface = Self::primary_interface(image)?;
        let family = self
            .family_for_interface
            .get(&interface)
            .copied()
            .ok_or(CertError::UnknownInterface(interface))?;
        let loaders = self.loaders.get(&family);
        let loaded = loaders.and_then(|ls| ls.iter().find_map(|l| l.try_load(image)));
        let mut cert = loaded.ok_or(CertError::UnrecognizedImage(family))?;

        if let Some(embedded) = cert.embedded_image.clone() {
            match self.decode_as_chain_cert(&embedded) {
                Ok(parent) => cert.parent = Some(Box::new(parent)),
                Err(err) => debug!(?err, "embedded cert did not decode, keeping raw image"),
            }
        }
        Ok(cert)
    }

    fn decode_as_chain_cert(&self, image: &[u8]) -> Result<DecodedCert, CertError> {
        let loaders = self.loaders.get(&CertFamily::Chain);
        let loaded = loaders.and_then(|ls| ls.iter().find_map(|l| l.try_load(image)));
        let mut cert = loaded.ok_or(CertError::UnrecognizedImage(CertFamily::Chain))?;
        if let Some(embedded) = cert.embedded_image.clone() {
            if let Ok(parent) = self.decode_as_chain_cert(&embedded) {
                cert.parent = Some(Box::new(parent));
            }
        }
        Ok(cert)
    }

    /// Verifies the signature of every cert in the chain, offloading the
    /// crypto to `offloader` so the caller's event loop never blocks on it.
    pub async fn verify(
        &self,
        cert: &DecodedCert,
        offloader: &dyn SignatureOffloader,
    ) -> Result<(), CertError> {
        let ok = offloader
            .verify(&cert.signed_message, &cert.signature, &cert.issuer)
            .await;
        if !ok {
            return Err(CertError::BadSignature);
        }
        if let Some(parent) = &cert.parent {
            Box::pin(self.verify(parent, offloader)).await?;
        }
        Ok(())
    }

    /// Checks every declared lock constraint against `target`. Returns
    /// `(false, reason)` on the first mismatch, `(true, None)` if every
    /// constraint is satisfied (or the cert declares none).
    pub fn validate(&self, cert: &DecodedCert, target: &HashMap<String, Value>) -> (bool, Option<String>) {
        for constraint in &cert.lock_constraints {
            if let Some(actual) = target.get(&constraint.field) {
                if actual != &constraint.expected {
                    return (
                        false,
                        Some(format!(
                            "{} locked to {:?}, target has {:?}",
                            constraint.field, constraint.expected, actual
                        )),
                    );
                }
            }
        }
        (true, None)
    }

    /// Scans `candidates`, accepting the first cert whose target keys
    /// include `signer`, whose accepted node types include `node`'s type,
    /// and which validates structurally against `node` (no signature
    /// check — that's `verify`'s job).
    pub fn match_node_cert<'a>(
        &self,
        node: &NodeProps,
        signer: &PublicKey,
        candidates: &'a [DecodedCert],
    ) -> Option<&'a DecodedCert> {
        candidates.iter().find(|cert| {
            cert.target_keys.contains(signer)
                && cert.accepted_node_types.iter().any(|t| t == &node.node_type)
                && self.validate(cert, &node_target_map(node)).0
        })
    }
}

fn node_target_map(node: &NodeProps) -> HashMap<String, Value> {
    let mut map = HashMap::new();
    map.insert("licenseMinDistance".to_string(), Value::from(node.license_min_distance));
    map.insert("licenseMaxDistance".to_string(), Value::from(node.license_max_distance));
    map.insert("isPublic".to_string(), Value::from(node.flags.is_public));
    map
}
