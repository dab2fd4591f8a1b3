//! Dispatch of action-tagged requests onto a [`ClipShelf`].
//!
//! The router lives in the background context. It never lets an error escape: every
//! failure becomes a `success: false` response carrying the error class.

use crate::core::ClipShelf;
use crate::core::blob_storage::TemporaryUrl;
use crate::core::error::{ErrorKind, ShelfError};
use std::collections::HashMap;
use std::time::SystemTime;
use tracing::{debug, error, warn};

mod messages;
pub use messages::{Request, Response, ResponseData};

pub struct RequestRouter {
    shelf: ClipShelf,
    /// Issued temporary URLs by token. Dropping a handle removes its file.
    temporary_urls: HashMap<String, TemporaryUrl>,
}

impl RequestRouter {
    pub fn new(shelf: ClipShelf) -> Self {
        Self {
            shelf,
            temporary_urls: HashMap::new(),
        }
    }

    pub fn shelf(&self) -> &ClipShelf {
        &self.shelf
    }

    pub fn outstanding_temporary_urls(&self) -> usize {
        self.temporary_urls.len()
    }

    /// Parses and handles one JSON request. Unknown actions and malformed payloads are
    /// answered with a `Validation` failure.
    pub fn handle_json(&mut self, raw: &str, now: SystemTime) -> Response {
        match serde_json::from_str::<Request>(raw) {
            Ok(request) => self.handle(request, now),
            Err(e) => {
                warn!(error = %e, "rejected malformed request");
                Response::failure(format!("Invalid request: {e}"), ErrorKind::Validation)
            }
        }
    }

    pub fn handle(&mut self, request: Request, now: SystemTime) -> Response {
        self.prune_expired(now);

        let action = request.action();
        debug!(action, "handling request");
        match self.dispatch(request, now) {
            Ok(response) => response,
            Err(e) => {
                let kind = e.kind();
                match kind {
                    ErrorKind::NotFound | ErrorKind::Validation => {
                        warn!(action, kind = %kind, error = %e, "request rejected")
                    }
                    ErrorKind::StorageUnavailable | ErrorKind::Persistence => {
                        error!(action, kind = %kind, error = %e, "request failed")
                    }
                }
                Response::from(&e)
            }
        }
    }

    fn dispatch(&mut self, request: Request, now: SystemTime) -> Result<Response, ShelfError> {
        let shelf = &self.shelf;
        let response = match request {
            Request::StoreBinary { id, bytes } => {
                let id = shelf.store_binary(id, &bytes, now)?;
                Response::with_data(ResponseData::Id { id: id.into() })
            }
            Request::SaveClip(draft) => {
                let record = shelf.save_clip(draft, now)?;
                Response::with_data(ResponseData::Id {
                    id: record.id.into(),
                })
            }
            Request::ListClips => Response::with_data(ResponseData::Clips(shelf.list_clips()?)),
            Request::GetClip { id } => match shelf.get_clip(&id)? {
                Some(record) => Response::with_data(ResponseData::Clip(record)),
                None => return Err(ShelfError::ClipNotFound(id)),
            },
            Request::UpdateClip { id, updates } => {
                Response::with_data(ResponseData::Clip(shelf.update_clip(&id, updates, now)?))
            }
            Request::DeleteClip { id } => Response::with_data(ResponseData::Deleted {
                existed: shelf.delete_clip(&id)?,
            }),
            Request::ClearClips => Response::with_data(ResponseData::Cleared {
                removed: shelf.clear_clips()?,
            }),
            Request::GetSettings => {
                Response::with_data(ResponseData::Settings(shelf.settings(now)?))
            }
            Request::SaveSettings(patch) => {
                Response::with_data(ResponseData::Settings(shelf.save_settings(&patch, now)?))
            }
            Request::GetStorageUsage => {
                Response::with_data(ResponseData::Usage(shelf.storage_usage()?))
            }
            Request::SearchClips { query } => {
                Response::with_data(ResponseData::Clips(shelf.search(&query)?))
            }
            Request::GetBinary { id } => Response::with_data(ResponseData::Binary {
                bytes: shelf.get_binary(&id)?,
            }),
            Request::CreateTemporaryUrl { id } => {
                let handle = shelf.create_temporary_url(&id, now)?;
                let data = ResponseData::TemporaryUrl {
                    token: handle.token().to_string(),
                    url: handle.url().to_string(),
                    expires_at: handle.expires_at(),
                };
                self.temporary_urls.insert(handle.token().to_string(), handle);
                Response::with_data(data)
            }
            Request::RevokeTemporaryUrl { token } => {
                let handle = self
                    .temporary_urls
                    .remove(&token)
                    .ok_or(ShelfError::TemporaryUrlNotFound(token))?;
                handle.release()?;
                Response::ok()
            }
            Request::ExportData => Response::with_data(ResponseData::Export(shelf.export(now)?)),
            Request::RunMaintenance => {
                Response::with_data(ResponseData::Maintenance(shelf.run_maintenance(now)?))
            }
        };
        Ok(response)
    }

    fn prune_expired(&mut self, now: SystemTime) {
        let before = self.temporary_urls.len();
        self.temporary_urls.retain(|_, handle| !handle.is_expired(now));
        let expired = before - self.temporary_urls.len();
        if expired > 0 {
            debug!(expired, "expired temporary urls dropped");
        }
    }
}
