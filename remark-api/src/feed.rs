use crate::{Comment, CommentId, PageId, ReactionKind, ReactionOutcome, UserId};

/// Messages sent to the viewers of a page
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FeedMessage {
    Pong,
    CommentCreated(Comment),
    CommentEdited(Comment),
    CommentDeleted {
        id: CommentId,
        page_id: PageId,
        parent_id: Option<CommentId>,
    },
    CommentReacted {
        comment: Comment,
        user_id: UserId,
        kind: ReactionKind,
        outcome: ReactionOutcome,
    },
}

impl FeedMessage {
    pub fn page_id(&self) -> Option<&PageId> {
        match self {
            FeedMessage::Pong => None,
            FeedMessage::CommentCreated(c) | FeedMessage::CommentEdited(c) => Some(&c.page_id),
            FeedMessage::CommentDeleted { page_id, .. } => Some(page_id),
            FeedMessage::CommentReacted { comment, .. } => Some(&comment.page_id),
        }
    }
}
