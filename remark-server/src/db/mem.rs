use std::collections::{btree_map, BTreeMap, HashMap};

use async_trait::async_trait;
use remark_api::{
    AuthToken, Comment, CommentId, Identity, PageId, SortMode, User, UserId, Uuid,
};
use tokio::sync::RwLock;

use super::{CommentUpdate, Db};
use crate::Error;

/// In-process store, used when no database is configured and as the model the
/// Postgres store is checked against
#[derive(Debug, Default)]
pub struct MemDb(RwLock<MemState>);

#[derive(Debug, Default)]
struct MemState {
    users: BTreeMap<UserId, MemUser>,
    sessions: HashMap<AuthToken, UserId>,
    comments: HashMap<CommentId, Comment>,
}

#[derive(Debug)]
struct MemUser {
    name: String,
    email: String,
    password_hash: String,
}

impl MemDb {
    pub fn new() -> MemDb {
        MemDb::default()
    }
}

#[async_trait]
impl Db for MemDb {
    async fn create_user(
        &self,
        id: UserId,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<(), Error> {
        let mut state = self.0.write().await;
        if state.users.values().any(|u| u.name == name) {
            return Err(Error::name_already_used(String::from(name)));
        }
        if state.users.values().any(|u| u.email == email) {
            return Err(Error::email_already_used(String::from(email)));
        }
        match state.users.entry(id) {
            btree_map::Entry::Occupied(_) => {
                Err(anyhow::anyhow!("user id {id:?} was generated twice").into())
            }
            btree_map::Entry::Vacant(entry) => {
                entry.insert(MemUser {
                    name: String::from(name),
                    email: String::from(email),
                    password_hash: String::from(password_hash),
                });
                Ok(())
            }
        }
    }

    async fn fetch_credentials(
        &self,
        login: &str,
        by_email: bool,
    ) -> anyhow::Result<Option<(UserId, String)>> {
        let state = self.0.read().await;
        Ok(state
            .users
            .iter()
            .find(|(_, u)| match by_email {
                true => u.email == login,
                false => u.name == login,
            })
            .map(|(id, u)| (*id, u.password_hash.clone())))
    }

    async fn fetch_users(&self) -> anyhow::Result<Vec<User>> {
        let state = self.0.read().await;
        let mut users = state
            .users
            .iter()
            .map(|(id, u)| User {
                id: *id,
                name: u.name.clone(),
            })
            .collect::<Vec<_>>();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn create_session(&self, user: UserId, _device: &str) -> anyhow::Result<AuthToken> {
        let token = AuthToken(Uuid::new_v4());
        self.0.write().await.sessions.insert(token, user);
        Ok(token)
    }

    async fn recover_session(&self, token: AuthToken) -> Result<Identity, Error> {
        let state = self.0.read().await;
        let id = *state
            .sessions
            .get(&token)
            .ok_or_else(Error::unauthenticated)?;
        let user = state
            .users
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("session {token:?} points to missing user {id:?}"))?;
        Ok(Identity {
            id,
            name: user.name.clone(),
            email: user.email.clone(),
        })
    }

    async fn logout(&self, token: AuthToken) -> anyhow::Result<bool> {
        Ok(self.0.write().await.sessions.remove(&token).is_some())
    }

    async fn insert_comment(&self, comment: &Comment) -> anyhow::Result<()> {
        let mut state = self.0.write().await;
        anyhow::ensure!(
            !state.comments.contains_key(&comment.id),
            "comment id {:?} was generated twice",
            comment.id
        );
        state.comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn fetch_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        Ok(self.0.read().await.comments.get(&id).cloned())
    }

    async fn update_comment(
        &self,
        id: CommentId,
        update: &mut CommentUpdate<'_>,
    ) -> Result<Option<Comment>, Error> {
        let mut state = self.0.write().await;
        let stored = match state.comments.get_mut(&id) {
            None => return Ok(None),
            Some(c) => c,
        };
        // work on a copy so that a failed update leaves nothing behind
        let mut updated = stored.clone();
        update(&mut updated)?;
        *stored = updated.clone();
        Ok(Some(updated))
    }

    async fn list_top_level(
        &self,
        page: &PageId,
        sort: SortMode,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<(Vec<Comment>, u64)> {
        let state = self.0.read().await;
        let mut top_level = state
            .comments
            .values()
            .filter(|c| c.page_id == *page && c.is_top_level() && !c.is_deleted)
            .collect::<Vec<_>>();
        top_level.sort_by(|a, b| sort.compare(a, b));
        let total = top_level.len() as u64;
        Ok((
            top_level
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
            total,
        ))
    }

    async fn list_replies(&self, parent: CommentId) -> anyhow::Result<Vec<Comment>> {
        let state = self.0.read().await;
        let mut replies = state
            .comments
            .values()
            .filter(|c| c.parent_id == Some(parent) && !c.is_deleted)
            .cloned()
            .collect::<Vec<_>>();
        replies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(replies)
    }

    async fn list_child_ids(&self, parent: CommentId) -> anyhow::Result<Vec<CommentId>> {
        let state = self.0.read().await;
        let mut children = state
            .comments
            .values()
            .filter(|c| c.parent_id == Some(parent))
            .collect::<Vec<_>>();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(children.into_iter().map(|c| c.id).collect())
    }
}
