//! Request handlers for one resolved resource.
//!
//! A `Resource` lives for the duration of a request. It borrows the
//! manager's [`TimedReader`] (keeping the underlying reader alive for as
//! long as a response body is still streaming) and answers the four
//! endpoint families: `info`, `hierarchy`, `read`, and `files`.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task;
use tracing::{debug, error};

use greyhound_core::{
    FilesQuery, HierarchyParams, ParamMap, ReadParams, Reader,
};

use crate::chunker::{Chunker, Payload};
use crate::error::HttpError;
use crate::manager::{Manager, TimedReader};
use crate::query::ReadQuery;
use crate::router::{full_body, BodyError, ResBody};

pub struct Resource {
    manager: Arc<Manager>,
    name: String,
    timed: Arc<TimedReader>,
    reader: Arc<dyn Reader>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource").field("name", &self.name).finish()
    }
}

impl Resource {
    pub(crate) fn new(
        manager: Arc<Manager>,
        name: &str,
        timed: Arc<TimedReader>,
        reader: Arc<dyn Reader>,
    ) -> Resource {
        Resource {
            manager,
            name: name.to_string(),
            timed,
            reader,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reader(&self) -> &Arc<dyn Reader> {
        &self.reader
    }

    pub async fn info(&self) -> Result<Response<ResBody>, HttpError> {
        json_response(&self.reader.info())
    }

    pub async fn hierarchy(&self, params: &ParamMap) -> Result<Response<ResBody>, HttpError> {
        let params = HierarchyParams::parse(params)?;
        let reader = self.reader.clone();
        let value = task::spawn_blocking(move || reader.hierarchy(&params))
            .await
            .map_err(|e| HttpError::Internal(format!("hierarchy task failed: {e}")))??;
        json_response(&value)
    }

    pub async fn files(
        &self,
        params: &ParamMap,
        segment: Option<&str>,
    ) -> Result<Response<ResBody>, HttpError> {
        let value = match FilesQuery::parse(params, segment)? {
            FilesQuery::All => Value::from(self.reader.file_paths()),
            FilesQuery::Search { terms, single } => {
                let mut found = Vec::with_capacity(terms.len());
                for term in &terms {
                    found.push(match self.reader.file_info(term) {
                        Some(info) => serde_json::to_value(info)
                            .map_err(|e| HttpError::Internal(e.to_string()))?,
                        None => Value::Null,
                    });
                }
                if single {
                    found.into_iter().next().unwrap_or(Value::Null)
                } else {
                    Value::Array(found)
                }
            }
            FilesQuery::Bounds { bounds, scale, offset } => serde_json::to_value(
                self.reader.files_in(&bounds, scale.as_ref(), offset.as_ref()),
            )
            .map_err(|e| HttpError::Internal(e.to_string()))?,
        };
        json_response(&value)
    }

    /// Stream point data. The producer runs on a blocking task, stepping
    /// the query into a pooled buffer and handing chunks to the response
    /// body through the [`Chunker`].
    pub async fn read(&self, params: &ParamMap) -> Result<Response<ResBody>, HttpError> {
        let params = ReadParams::parse(params)?;
        let compress = params.compress;

        let (head_tx, head_rx) = oneshot::channel();
        let reader = self.reader.clone();
        let timed = self.timed.clone();
        let pool = self.manager.pool().clone();
        let name = self.name.clone();

        task::spawn_blocking(move || {
            // Keep the cache entry borrowed until the body is fully
            // produced, so the sweeper cannot drop the reader mid-stream.
            let _borrow = timed;

            let mut chunker = Chunker::new(head_tx);
            let source = match reader.query(params) {
                Ok(source) => source,
                Err(e) => return chunker.fail(e.into()),
            };
            let mut query = ReadQuery::new(source, compress);
            let mut buffer = pool.acquire();

            while !query.done() {
                if let Err(e) = query.read(&mut buffer) {
                    error!(name = %name, error = %e, "read query failed");
                    return chunker.fail(e);
                }
                match chunker.write(&mut buffer, query.done()) {
                    Ok(()) => {}
                    Err(HttpError::Disconnected) => {
                        debug!(name = %name, "client disconnected mid-read");
                        return;
                    }
                    Err(e) => return chunker.fail(e),
                }
            }
            debug!(name = %name, points = query.num_points(), "read complete");
        });

        match head_rx.await {
            Ok(Payload::Complete(body)) => {
                let length = body.len();
                Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "binary/octet-stream")
                    .header(CONTENT_LENGTH, length)
                    .body(full_body(body))
                    .map_err(|e| HttpError::Internal(e.to_string()))
            }
            Ok(Payload::Streaming(rx)) => {
                let stream = futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|chunk| {
                        let frame = chunk.map(Frame::data).map_err(BodyError::from);
                        (frame, rx)
                    })
                });
                Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "binary/octet-stream")
                    .body(StreamBody::new(stream).boxed_unsync())
                    .map_err(|e| HttpError::Internal(e.to_string()))
            }
            Ok(Payload::Failed(e)) => Err(e),
            Err(_) => Err(HttpError::Internal(
                "read producer exited before responding".to_string(),
            )),
        }
    }
}

fn json_response(value: &impl serde::Serialize) -> Result<Response<ResBody>, HttpError> {
    let body = serde_json::to_vec(value).map_err(|e| HttpError::Internal(e.to_string()))?;
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .body(full_body(Bytes::from(body)))
        .map_err(|e| HttpError::Internal(e.to_string()))
}
