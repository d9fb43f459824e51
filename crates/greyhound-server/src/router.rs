//! URL routing and error normalisation.
//!
//! The route surface is fixed: the four resource endpoints, `GET` only.
//! Errors become HTTP responses here and nowhere else; handlers below this
//! layer only ever return the taxonomy in [`HttpError`].

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use tracing::debug;

use greyhound_core::ParamMap;

use crate::auth::AuthInput;
use crate::error::HttpError;
use crate::manager::Manager;

/// Body error surfaced to hyper; an `Err` frame aborts the connection
/// without a chunked terminator.
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

pub type ResBody = UnsyncBoxBody<Bytes, BodyError>;

pub fn full_body(bytes: Bytes) -> ResBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

/// A matched endpoint; `name` may span several path segments.
#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Info(String),
    Hierarchy(String),
    Read(String),
    Files(String, Option<&'a str>),
}

impl Route<'_> {
    fn name(&self) -> &str {
        match self {
            Route::Info(name)
            | Route::Hierarchy(name)
            | Route::Read(name)
            | Route::Files(name, _) => name,
        }
    }
}

fn parse_route<'a>(segments: &[&'a str]) -> Option<Route<'a>> {
    let (&first, rest) = segments.split_first()?;
    if first != "resource" {
        return None;
    }

    let (&last, init) = rest.split_last()?;
    match last {
        "info" if !init.is_empty() => Some(Route::Info(init.join("/"))),
        "hierarchy" if !init.is_empty() => Some(Route::Hierarchy(init.join("/"))),
        "read" if !init.is_empty() => Some(Route::Read(init.join("/"))),
        "files" if !init.is_empty() => Some(Route::Files(init.join("/"), None)),
        _ => {
            // The trailing segment of /resource/{name}/files/{id}.
            let (&verb, name) = init.split_last()?;
            if verb == "files" && !name.is_empty() {
                Some(Route::Files(name.join("/"), Some(last)))
            } else {
                None
            }
        }
    }
}

pub struct Router {
    manager: Arc<Manager>,
}

impl Router {
    pub fn new(manager: Arc<Manager>) -> Router {
        Router { manager }
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    /// Serve one request; never fails, errors become status responses.
    pub async fn route(&self, req: Request<Incoming>) -> Response<ResBody> {
        let mut response = match self.dispatch(&req).await {
            Ok(response) => response,
            Err(e) => {
                debug!(path = %req.uri().path(), error = %e, "request failed");
                error_response(&e)
            }
        };
        self.apply_headers(&mut response);
        response
    }

    async fn dispatch(&self, req: &Request<Incoming>) -> Result<Response<ResBody>, HttpError> {
        let not_found = || HttpError::NotFound("not found".to_string());
        if req.method() != Method::GET {
            return Err(not_found());
        }

        let path = req.uri().path();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let route = parse_route(&segments).ok_or_else(not_found)?;

        let query = req.uri().query().unwrap_or("");
        let params = ParamMap::from_query(query);
        let input = AuthInput {
            headers: req.headers().clone(),
            query: raw_pairs(query),
        };

        let resource = self.manager.get(route.name(), &input).await?;
        match route {
            Route::Info(_) => resource.info().await,
            Route::Hierarchy(_) => resource.hierarchy(&params).await,
            Route::Read(_) => resource.read(&params).await,
            Route::Files(_, segment) => resource.files(&params, segment).await,
        }
    }

    fn apply_headers(&self, response: &mut Response<ResBody>) {
        for (key, value) in self.manager.headers() {
            let (Ok(name), Ok(value)) = (
                HeaderName::try_from(key.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) else {
                continue;
            };
            response.headers_mut().entry(name).or_insert(value);
        }
    }
}

/// Decoded key/value pairs of the raw query string, forwarded upstream by
/// the auth layer.
fn raw_pairs(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn error_response(error: &HttpError) -> Response<ResBody> {
    let status = error.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match error {
        HttpError::Disconnected => "Unknown error".to_string(),
        other => other.to_string(),
    };
    let mut response = Response::new(full_body(Bytes::from(message)));
    *response.status_mut() = status;
    response
}
