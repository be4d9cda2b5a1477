use std::sync::Arc;

use mesh_storage::client::RawChannel;
use mesh_storage::StorageClient;
use mesh_types::{FetchResponse, MsgId, RequestEnvelope, Status};

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

/// Routes allowed request kinds from a remote peer to local storage,
/// replying `NotAllowed` for anything the connection's permissions forbid
/// (§4.9).
pub struct Forwarder<R: RawChannel> {
    local: Arc<StorageClient<R>>,
    permissions: ConnectionPermissions,
}

impl<R: RawChannel + 'static> Forwarder<R> {
    pub fn new(local: Arc<StorageClient<R>>, permissions: ConnectionPermissions) -> Arc<Self> {
        Arc::new(Self { local, permissions })
    }
}

impl<R: RawChannel + 'static> RequestHandler for Forwarder<R> {
    fn handle(&self, _msg_id: &MsgId, request: RequestEnvelope, reply: Arc<dyn Fn(RequestEnvelope) + Send + Sync>) {
        match request {
            RequestEnvelope::FetchRequest(req) => {
                if !self.permissions.fetch.allows_query(&req.query) {
                    reply(RequestEnvelope::FetchResponse(denied_fetch_response()));
                    return;
                }
                let response = self.local.fetch(req);
                response.on_reply(move |r: &FetchResponse| reply(RequestEnvelope::FetchResponse(r.clone())));
            }
            other => relay_non_fetch(&self.local, &self.permissions, other, reply),
        }
    }
}
