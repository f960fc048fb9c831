use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

use crate::CommentId;

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Comment not found {0:?}")]
    CommentNotFound(CommentId),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Email already used {0}")]
    EmailAlreadyUsed(String),

    #[error("Comment content must be 1 to 2000 characters long, got {0}")]
    InvalidContentLength(usize),

    #[error("Invalid page id {0:?}")]
    InvalidPageId(String),

    #[error("Reply must be posted on the page of its parent {0:?}")]
    PageMismatch(String),

    #[error("Pages are numbered from 1, got {0}")]
    InvalidPage(usize),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid character in name {0:?}")]
    InvalidName(String),

    #[error("Invalid email address {0:?}")]
    InvalidEmail(String),

    #[error("Password must be 8 to 256 characters long")]
    InvalidPassword,

    #[error("Malformed request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::EmailAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::InvalidContentLength(_) => StatusCode::BAD_REQUEST,
            Error::InvalidPageId(_) => StatusCode::BAD_REQUEST,
            Error::PageMismatch(_) => StatusCode::BAD_REQUEST,
            Error::InvalidPage(_) => StatusCode::BAD_REQUEST,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
            Error::InvalidEmail(_) => StatusCode::BAD_REQUEST,
            Error::InvalidPassword => StatusCode::BAD_REQUEST,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::Unauthenticated => json!({
                "message": "authentication required",
                "type": "unauthenticated",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::CommentNotFound(id) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "id": id.0,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": "conflict-name",
                "name": n,
            }),
            Error::EmailAlreadyUsed(e) => json!({
                "message": "email already used",
                "type": "conflict-email",
                "email": e,
            }),
            Error::InvalidContentLength(len) => json!({
                "message": "comment content must be 1 to 2000 characters long",
                "type": "invalid-content-length",
                "length": len,
            }),
            Error::InvalidPageId(p) => json!({
                "message": "invalid page id",
                "type": "invalid-page-id",
                "page_id": p,
            }),
            Error::PageMismatch(p) => json!({
                "message": "reply must be posted on the page of its parent",
                "type": "page-mismatch",
                "page_id": p,
            }),
            Error::InvalidPage(p) => json!({
                "message": "pages are numbered from 1",
                "type": "invalid-page",
                "page": p,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidName(n) => json!({
                "message": "there was an invalid character in a user name",
                "type": "invalid-name",
                "name": n,
            }),
            Error::InvalidEmail(e) => json!({
                "message": "invalid email address",
                "type": "invalid-email",
                "email": e,
            }),
            Error::InvalidPassword => json!({
                "message": "password must be 8 to 256 characters long",
                "type": "invalid-password",
            }),
            Error::InvalidRequest(details) => json!({
                "message": "malformed request",
                "type": "invalid-request",
                "details": details,
            }),
        })
        .expect("serializing error")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let str_field = |field: &str| -> anyhow::Result<String> {
            data.get(field)
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error is missing its {field:?} string field"))
        };
        let usize_field = |field: &str| -> anyhow::Result<usize> {
            data.get(field)
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .ok_or_else(|| anyhow!("error is missing its {field:?} integer field"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(str_field("message").unwrap_or_default()),
                "unauthenticated" => Error::Unauthenticated,
                "permission-denied" => Error::PermissionDenied,
                "comment-not-found" => Error::CommentNotFound(CommentId(
                    Uuid::from_str(&str_field("id")?)
                        .context("error is a missing comment without a proper uuid")?,
                )),
                "conflict-name" => Error::NameAlreadyUsed(str_field("name")?),
                "conflict-email" => Error::EmailAlreadyUsed(str_field("email")?),
                "invalid-content-length" => Error::InvalidContentLength(usize_field("length")?),
                "invalid-page-id" => Error::InvalidPageId(str_field("page_id")?),
                "page-mismatch" => Error::PageMismatch(str_field("page_id")?),
                "invalid-page" => Error::InvalidPage(usize_field("page")?),
                "null-byte" => Error::NullByteInString(str_field("string")?),
                "invalid-name" => Error::InvalidName(str_field("name")?),
                "invalid-email" => Error::InvalidEmail(str_field("email")?),
                "invalid-password" => Error::InvalidPassword,
                "invalid-request" => Error::InvalidRequest(str_field("details")?),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
