use async_trait::async_trait;
use remark_api::{AuthToken, Comment, CommentId, Identity, PageId, SortMode, User, UserId};

use crate::Error;

mod mem;
mod postgres;

pub use mem::MemDb;
pub use postgres::{create_sqlx_pool, PostgresDb, MIGRATOR};

/// Read-modify-write step applied to a single comment. Returning an error
/// aborts the update and leaves the stored comment untouched.
pub type CommentUpdate<'a> = dyn 'a + Send + FnMut(&mut Comment) -> Result<(), Error>;

/// The document store backing the server.
///
/// Every method is atomic with respect to the single user, session or
/// comment it touches, and nothing more: there are no cross-document
/// transactions.
#[async_trait]
pub trait Db: Send + Sync {
    async fn create_user(
        &self,
        id: UserId,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<(), Error>;

    /// Looks a user up by name, or by (lowercased) email if `by_email` is set,
    /// returning its id and password hash
    async fn fetch_credentials(
        &self,
        login: &str,
        by_email: bool,
    ) -> anyhow::Result<Option<(UserId, String)>>;

    async fn fetch_users(&self) -> anyhow::Result<Vec<User>>;

    async fn create_session(&self, user: UserId, device: &str) -> anyhow::Result<AuthToken>;

    async fn recover_session(&self, token: AuthToken) -> Result<Identity, Error>;

    /// Returns false if there was no such session
    async fn logout(&self, token: AuthToken) -> anyhow::Result<bool>;

    async fn insert_comment(&self, comment: &Comment) -> anyhow::Result<()>;

    /// Fetches a comment whether or not it was soft-deleted
    async fn fetch_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>>;

    /// Runs `update` on the latest stored version of the comment and persists
    /// the result, all under the comment's lock. Returns `None` if there is
    /// no such comment.
    async fn update_comment(
        &self,
        id: CommentId,
        update: &mut CommentUpdate<'_>,
    ) -> Result<Option<Comment>, Error>;

    /// Visible top-level comments of `page` in `sort` order, along with the
    /// total number of such comments
    async fn list_top_level(
        &self,
        page: &PageId,
        sort: SortMode,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<(Vec<Comment>, u64)>;

    /// Visible replies to `parent`, oldest first
    async fn list_replies(&self, parent: CommentId) -> anyhow::Result<Vec<Comment>>;

    /// Ids of every reply to `parent`, soft-deleted ones included, oldest first
    async fn list_child_ids(&self, parent: CommentId) -> anyhow::Result<Vec<CommentId>>;
}
