use std::sync::Arc;

use mesh_storage::client::RawChannel;
use mesh_storage::StorageClient;
use mesh_types::{
    ReadBlobResponse, RequestEnvelope, Status, StoreResponse, UnsubscribeResponse, WriteBlobResponse,
};

use crate::permissions::ConnectionPermissions;

pub fn denied_store_response() -> StoreResponse {
    StoreResponse { status: Status::NotAllowed, ..Default::default() }
}

pub fn denied_write_blob_response() -> WriteBlobResponse {
    WriteBlobResponse { status: Status::NotAllowed, current_length: 0, error: String::new() }
}

pub fn denied_read_blob_response() -> ReadBlobResponse {
    ReadBlobResponse { status: Status::NotAllowed, data: vec![], seq: 0, end_seq: 0, blob_length: 0, error: String::new() }
}

/// Relays the non-fetch request kinds, subject to the same store/blob
/// permission checks, for both `Forwarder` and `Extender` (which only
/// differ in how they treat fetch responses).
pub fn relay_non_fetch<R: RawChannel + 'static>(
    local: &Arc<StorageClient<R>>,
    permissions: &ConnectionPermissions,
    request: RequestEnvelope,
    reply: Arc<dyn Fn(RequestEnvelope) + Send + Sync>,
) {
    match request {
        RequestEnvelope::StoreRequest(req) => {
            if !permissions.store.allow_store {
                reply(RequestEnvelope::StoreResponse(denied_store_response()));
                return;
            }
            let response = local.store(req);
            response.on_reply(move |r: &StoreResponse| reply(RequestEnvelope::StoreResponse(r.clone())));
        }
        RequestEnvelope::ReadBlobRequest(req) => {
            if !permissions.fetch.allow_read_blob {
                reply(RequestEnvelope::ReadBlobResponse(denied_read_blob_response()));
                return;
            }
            let response = local.read_blob(req);
            response.on_reply(move |r: &ReadBlobResponse| reply(RequestEnvelope::ReadBlobResponse(r.clone())));
        }
        RequestEnvelope::WriteBlobRequest(req) => {
            if !permissions.store.allow_write_blob {
                reply(RequestEnvelope::WriteBlobResponse(denied_write_blob_response()));
                return;
            }
            let response = local.write_blob(req);
            response.on_reply(move |r: &WriteBlobResponse| reply(RequestEnvelope::WriteBlobResponse(r.clone())));
        }
        RequestEnvelope::UnsubscribeRequest(req) => {
            let response = local.unsubscribe(req);
            response.on_reply(move |r: &UnsubscribeResponse| reply(RequestEnvelope::UnsubscribeResponse(r.clone())));
        }
        _ => {
            reply(RequestEnvelope::StoreResponse(denied_store_response()));
        }
    }
}
