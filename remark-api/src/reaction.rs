use crate::Comment;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Dislike,
}

/// Which way a toggle went. Reported to the caller, never persisted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionOutcome {
    Added,
    Removed,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewReaction {
    pub kind: ReactionKind,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ReactionResult {
    pub comment: Comment,
    pub outcome: ReactionOutcome,
}
