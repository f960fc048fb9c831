use remark_api::{Comment, CommentId, NewComment, ReactionKind, ReactionOutcome, UserId, Uuid};

use crate::{db::Db, Error};

pub async fn get_comment(db: &dyn Db, id: CommentId) -> Result<Comment, Error> {
    match db.fetch_comment(id).await? {
        Some(c) if !c.is_deleted => Ok(c),
        _ => Err(Error::comment_not_found(id)),
    }
}

pub async fn create_comment(
    db: &dyn Db,
    author: UserId,
    new: NewComment,
) -> Result<Comment, Error> {
    new.validate()?;
    let content = remark_api::normalize_content(&new.content)?;
    if let Some(parent_id) = new.parent_id {
        let parent = get_comment(db, parent_id).await?;
        if parent.page_id != new.page_id {
            return Err(Error::page_mismatch(parent.page_id.0));
        }
    }

    let comment = Comment::new(
        CommentId(Uuid::new_v4()),
        author,
        new.page_id,
        new.parent_id,
        content,
        remark_api::now(),
    );
    db.insert_comment(&comment)
        .await
        .map_err(|e| e.context(format!("creating comment for {author:?}")))?;

    // the reply exists from here on, a missing back-link only degrades the index
    if let Some(parent_id) = comment.parent_id {
        if let Err(err) = link_reply(db, parent_id, comment.id).await {
            tracing::warn!(
                ?err,
                ?parent_id,
                child_id = ?comment.id,
                "failed updating reply back-link, reindex the parent to repair it"
            );
        }
    }
    Ok(comment)
}

/// Records `child` in `parent`'s reply index, doing nothing if it already is
pub async fn link_reply(db: &dyn Db, parent: CommentId, child: CommentId) -> Result<(), Error> {
    db.update_comment(parent, &mut |p: &mut Comment| -> Result<(), Error> {
        p.link_reply(child);
        Ok(())
    })
    .await?
    .ok_or_else(|| Error::comment_not_found(parent))?;
    Ok(())
}

pub async fn edit_comment(
    db: &dyn Db,
    id: CommentId,
    requester: UserId,
    content: &str,
) -> Result<Comment, Error> {
    let now = remark_api::now();
    db.update_comment(id, &mut |c: &mut Comment| -> Result<(), Error> {
        check_author(c, requester)?;
        c.edit(content, now)?;
        Ok(())
    })
    .await?
    .ok_or_else(|| Error::comment_not_found(id))
}

pub async fn soft_delete_comment(
    db: &dyn Db,
    id: CommentId,
    requester: UserId,
) -> Result<Comment, Error> {
    let now = remark_api::now();
    let deleted = db
        .update_comment(id, &mut |c: &mut Comment| -> Result<(), Error> {
            check_author(c, requester)?;
            c.soft_delete(now);
            Ok(())
        })
        .await?
        .ok_or_else(|| Error::comment_not_found(id))?;
    tracing::info!(?id, ?requester, "comment soft-deleted");
    Ok(deleted)
}

fn check_author(c: &Comment, requester: UserId) -> Result<(), Error> {
    if c.is_deleted {
        return Err(Error::comment_not_found(c.id));
    }
    if c.author_id != requester {
        return Err(Error::permission_denied());
    }
    Ok(())
}

/// Toggles `user`'s reaction. Membership is decided on the version of the
/// comment read under the store's lock, not on anything fetched earlier.
pub async fn react(
    db: &dyn Db,
    id: CommentId,
    user: UserId,
    kind: ReactionKind,
) -> Result<(Comment, ReactionOutcome), Error> {
    let now = remark_api::now();
    let mut outcome = None;
    let comment = db
        .update_comment(id, &mut |c: &mut Comment| -> Result<(), Error> {
            if c.is_deleted {
                return Err(Error::comment_not_found(id));
            }
            outcome = Some(c.toggle_reaction(user, kind, now));
            Ok(())
        })
        .await?
        .ok_or_else(|| Error::comment_not_found(id))?;
    let outcome = outcome
        .ok_or_else(|| anyhow::anyhow!("reaction on {id:?} was stored without an outcome"))?;
    Ok((comment, outcome))
}

/// Recomputes `reply_ids` from the replies' own `parent_id`. Ids already
/// linked are kept, including replies linked after the scan of children.
pub async fn rebuild_reply_index(db: &dyn Db, id: CommentId) -> Result<Comment, Error> {
    let children = db.list_child_ids(id).await?;
    let comment = db
        .update_comment(id, &mut |c: &mut Comment| -> Result<(), Error> {
            let linked = std::mem::replace(&mut c.reply_ids, children.clone());
            for child in linked {
                c.link_reply(child);
            }
            Ok(())
        })
        .await?
        .ok_or_else(|| Error::comment_not_found(id))?;
    tracing::debug!(?id, replies = comment.reply_ids.len(), "rebuilt reply index");
    Ok(comment)
}
