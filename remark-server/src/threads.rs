use remark_api::{Comment, CommentId, CommentPage, ListQuery, PageId};

use crate::{db::Db, Error};

/// One page of the visible top-level comments of `page`
pub async fn list_top_level(
    db: &dyn Db,
    page: &PageId,
    query: &ListQuery,
) -> Result<CommentPage, Error> {
    page.validate()?;
    query.validate()?;
    let page_size = query.effective_page_size();
    let (items, total_count) = db
        .list_top_level(page, query.sort, query.offset(), page_size)
        .await?;
    Ok(CommentPage {
        items,
        total_count,
        page: query.page,
        page_size,
    })
}

/// Direct visible replies to `parent`, oldest first. The parent itself may be
/// soft-deleted or unknown, this only looks at the replies.
pub async fn list_replies(db: &dyn Db, parent: CommentId) -> Result<Vec<Comment>, Error> {
    Ok(db.list_replies(parent).await?)
}
