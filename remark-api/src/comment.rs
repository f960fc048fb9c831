use std::collections::HashSet;

use uuid::Uuid;

use crate::{Error, ReactionKind, ReactionOutcome, Time, UserId, MAX_PAGE_ID_LEN};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

/// Opaque identifier of the page a comment thread is displayed on
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct PageId(pub String);

impl PageId {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.0)?;
        if self.0.trim().is_empty() || self.0.chars().count() > MAX_PAGE_ID_LEN {
            return Err(Error::InvalidPageId(self.0.clone()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub content: String,
    pub author_id: UserId,
    pub page_id: PageId,
    pub parent_id: Option<CommentId>,

    pub likes: HashSet<UserId>,
    pub dislikes: HashSet<UserId>,

    /// Children in insertion order. This is only an index, `parent_id` on the
    /// children is the source of truth.
    pub reply_ids: Vec<CommentId>,

    pub is_deleted: bool,
    pub created_at: Time,
    pub updated_at: Time,
}

impl Comment {
    /// `content` must already have gone through `normalize_content`
    pub fn new(
        id: CommentId,
        author_id: UserId,
        page_id: PageId,
        parent_id: Option<CommentId>,
        content: String,
        now: Time,
    ) -> Comment {
        Comment {
            id,
            content,
            author_id,
            page_id,
            parent_id,
            likes: HashSet::new(),
            dislikes: HashSet::new(),
            reply_ids: Vec::new(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn edit(&mut self, content: &str, now: Time) -> Result<(), Error> {
        self.content = crate::normalize_content(content)?;
        self.updated_at = now;
        Ok(())
    }

    pub fn soft_delete(&mut self, now: Time) {
        self.is_deleted = true;
        self.updated_at = now;
    }

    /// Flips `user`'s `kind` reaction, keeping `likes` and `dislikes` disjoint
    pub fn toggle_reaction(
        &mut self,
        user: UserId,
        kind: ReactionKind,
        now: Time,
    ) -> ReactionOutcome {
        let (target, opposite) = match kind {
            ReactionKind::Like => (&mut self.likes, &mut self.dislikes),
            ReactionKind::Dislike => (&mut self.dislikes, &mut self.likes),
        };
        let outcome = if target.remove(&user) {
            ReactionOutcome::Removed
        } else {
            target.insert(user);
            opposite.remove(&user);
            ReactionOutcome::Added
        };
        self.updated_at = now;
        outcome
    }

    pub fn reaction_of(&self, user: &UserId) -> Option<ReactionKind> {
        if self.likes.contains(user) {
            Some(ReactionKind::Like)
        } else if self.dislikes.contains(user) {
            Some(ReactionKind::Dislike)
        } else {
            None
        }
    }

    /// Returns whether the back-link was actually missing
    pub fn link_reply(&mut self, child: CommentId) -> bool {
        if self.reply_ids.contains(&child) {
            return false;
        }
        self.reply_ids.push(child);
        true
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub page_id: PageId,
    pub content: String,
    pub parent_id: Option<CommentId>,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        self.page_id.validate()?;
        crate::normalize_content(&self.content)?;
        Ok(())
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct EditComment {
    pub content: String,
}
