use std::sync::Arc;

use mesh_certs::DecodedCert;
use mesh_storage::client::RawChannel;
use mesh_storage::StorageClient;
use mesh_types::{FetchResponse, MsgId, PublicKey, RequestEnvelope, SignatureOffloader, Status};
use parking_lot::RwLock;

use crate::client::RequestHandler;
use crate::permissions::ConnectionPermissions;
use crate::relay::relay_non_fetch;

fn denied_fetch_response() -> FetchResponse {
    FetchResponse {
        status: Status::NotAllowed,
        result: Default::default(),
        crdt_result: Default::default(),
        seq: 0,
        end_seq: 0,
        row_count: 0,
        error: String::new(),
    }
}

/// Like `Forwarder` for fetch paths, but re-signs embedded license bytes
/// under the local key before relaying a response, extending them across
/// the friend boundary when the connection's `allowEmbed` permission lets
/// it through. `signCerts` are hot-updatable; a swap only affects fetches
/// issued after it (§4.9).
pub struct Extender<R: RawChannel, O: SignatureOffloader> {
    local: Arc<StorageClient<R>>,
    permissions: ConnectionPermissions,
    offloader: Arc<O>,
    signing_key: PublicKey,
    sign_certs: RwLock<Vec<DecodedCert>>,
}

impl<R: RawChannel + 'static, O: SignatureOffloader + 'static> Extender<R, O> {
    pub fn new(
        local: Arc<StorageClient<R>>,
        permissions: ConnectionPermissions,
        offloader: Arc<O>,
        signing_key: PublicKey,
    ) -> Arc<Self> {
        Arc::new(Self { local, permissions, offloader, signing_key, sign_certs: RwLock::new(Vec::new()) })
    }

    pub fn add_sign_cert(&self, cert: DecodedCert) {
        self.sign_certs.write().push(cert);
    }

    pub fn sign_cert_count(&self) -> usize {
        self.sign_certs.read().len()
    }
}

impl<R: RawChannel + 'static, O: SignatureOffloader + 'static> RequestHandler for Extender<R, O> {
    fn handle(&self, _msg_id: &MsgId, request: RequestEnvelope, reply: Arc<dyn Fn(RequestEnvelope) + Send + Sync>) {
        match request {
            RequestEnvelope::FetchRequest(req) => {
                if !self.permissions.fetch.allows_query(&req.query) {
                    reply(RequestEnvelope::FetchResponse(denied_fetch_response()));
                    return;
                }
                let response = self.local.fetch(req);
                let offloader = self.offloader.clone();
                let signing_key = self.signing_key;
                let allow_embed = self.permissions.allow_embed;
                response.on_reply(move |r: &FetchResponse| {
                    let chunk = r.clone();
                    if !allow_embed || chunk.result.embed.is_empty() {
                        reply(RequestEnvelope::FetchResponse(chunk));
                        return;
                    }
                    let offloader = offloader.clone();
                    let reply = reply.clone();
                    tokio::spawn(async move {
                        let mut chunk = chunk;
                        for embed in chunk.result.embed.iter_mut() {
                            if let Some(signature) = offloader.sign(embed, &signing_key).await {
                                embed.extend_from_slice(&signature);
                            }
                        }
                        reply(RequestEnvelope::FetchResponse(chunk));
                    });
                });
            }
            other => relay_non_fetch(&self.local, &self.permissions, other, reply),
        }
    }
}
