mod auth;
mod comment;
mod error;
mod feed;
mod reaction;
mod thread;
mod user;

pub use auth::{AuthToken, NewSession};
pub use comment::{Comment, CommentId, EditComment, NewComment, PageId};
pub use error::Error;
pub use feed::FeedMessage;
pub use reaction::{NewReaction, ReactionKind, ReactionOutcome, ReactionResult};
pub use thread::{CommentPage, ListQuery, SortMode};
pub use user::{Identity, NewUser, User, UserId};

use chrono::{SubsecRound, Utc};

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

/// Current time, truncated to the microseconds Postgres keeps so that a
/// returned comment compares equal to the stored one
pub fn now() -> Time {
    Utc::now().trunc_subsecs(6)
}

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

pub const MAX_CONTENT_LEN: usize = 2000;
pub const MAX_PAGE_ID_LEN: usize = 512;

// Postgres does not support null bytes in strings, so reject them at the boundary
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Trims surrounding whitespace and checks the content bounds, returning the
/// text that should be stored
pub fn normalize_content(s: &str) -> Result<String, Error> {
    validate_string(s)?;
    let trimmed = s.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_CONTENT_LEN {
        return Err(Error::InvalidContentLength(len));
    }
    Ok(String::from(trimmed))
}
