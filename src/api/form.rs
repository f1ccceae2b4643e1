//! Upload Request Bodies
//!
//! `POST /api/cluster/add` takes a `multipart/form-data` body whose `file`
//! part is the content. Any other content type is treated as the raw file.

use std::convert::Infallible;

use bytes::Bytes;
use futures::stream;

use crate::domain::UploadRequest;
use crate::error::{Error, Result};

/// Name used when neither the query nor the form supplies one.
pub const DEFAULT_UPLOAD_NAME: &str = "upload";

/// Form field carrying the file.
pub const FILE_FIELD: &str = "file";

/// Build an upload from a request body.
///
/// A `name` from the query string overrides the part's filename; the part's
/// own `Content-Type` overrides any mimetype guessed from the name.
pub async fn upload_from_body(
    name: Option<String>,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<UploadRequest> {
    let content_type = content_type.map(str::trim).filter(|c| !c.is_empty());

    match content_type {
        Some(ct) if is_multipart(ct) => {
            let part = file_part(ct, body).await?;
            let mut request = UploadRequest::from_bytes(
                part.filename
                    .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string()),
                part.data,
            );
            if let Some(name) = name {
                request = request.with_name(name);
            }
            if let Some(mimetype) = part.content_type {
                request = request.with_mimetype(mimetype);
            }
            Ok(request)
        }
        other => {
            let mut request = UploadRequest::from_bytes(
                name.unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string()),
                body,
            );
            if let Some(mimetype) = other {
                request = request.with_mimetype(mimetype);
            }
            Ok(request)
        }
    }
}

fn is_multipart(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case("multipart/form-data"))
        .unwrap_or(false)
}

#[derive(Debug)]
struct FilePart {
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

/// The `file` field, or else the first field that carries a filename.
async fn file_part(content_type: &str, body: Bytes) -> Result<FilePart> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| Error::BadRequest(format!("multipart boundary: {}", e)))?;
    let body = stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(body, boundary);

    let mut fallback = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let is_file_field = field.name() == Some(FILE_FIELD);
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.is_empty());
        if !is_file_field && (filename.is_none() || fallback.is_some()) {
            continue;
        }

        let content_type = field.content_type().map(|m| m.to_string());
        let data = field.bytes().await.map_err(multipart_error)?;
        let part = FilePart {
            filename,
            content_type,
            data,
        };
        if is_file_field {
            return Ok(part);
        }
        fallback = Some(part);
    }

    fallback.ok_or_else(|| Error::BadRequest("multipart body has no file part".into()))
}

fn multipart_error(e: multer::Error) -> Error {
    Error::BadRequest(format!("malformed multipart body: {}", e))
}
