use anyhow::Context;
use axum::{
    extract::{State, WebSocketUpgrade},
    Json,
};
use futures::StreamExt;
use remark_api::{
    AuthToken, Comment, CommentId, CommentPage, EditComment, FeedMessage, Identity, ListQuery,
    NewComment, NewReaction, NewSession, NewUser, PageId, ReactionResult, User, Uuid,
};

use crate::{comments, extractors::*, threads, users, Error, PageFeeds};

pub async fn register(
    State(db): State<DbHandle>,
    State(auth): State<AuthConfig>,
    ApiJson(data): ApiJson<NewUser>,
) -> Result<Json<Identity>, Error> {
    Ok(Json(users::register(&*db, data, auth.bcrypt_cost).await?))
}

pub async fn auth(
    State(db): State<DbHandle>,
    ApiJson(data): ApiJson<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    Ok(Json(users::login(&*db, data).await?))
}

pub async fn unauth(
    PreAuth(token): PreAuth,
    State(db): State<DbHandle>,
) -> Result<Json<()>, Error> {
    users::logout(&*db, token).await?;
    Ok(Json(()))
}

pub async fn whoami(Auth(user): Auth) -> Json<Identity> {
    Json(user)
}

pub async fn fetch_users(
    Auth(user): Auth,
    State(db): State<DbHandle>,
) -> Result<Json<Vec<User>>, Error> {
    Ok(Json(db.fetch_users().await.with_context(|| {
        format!("fetching user list for {:?}", user.id)
    })?))
}

pub async fn create_comment(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    State(feeds): State<PageFeeds>,
    ApiJson(data): ApiJson<NewComment>,
) -> Result<Json<Comment>, Error> {
    let comment = comments::create_comment(&*db, user.id, data).await?;
    feeds.publish(FeedMessage::CommentCreated(comment.clone()));
    Ok(Json(comment))
}

pub async fn get_comment(
    State(db): State<DbHandle>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Comment>, Error> {
    Ok(Json(comments::get_comment(&*db, CommentId(id)).await?))
}

pub async fn edit_comment(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    State(feeds): State<PageFeeds>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(data): ApiJson<EditComment>,
) -> Result<Json<Comment>, Error> {
    let comment = comments::edit_comment(&*db, CommentId(id), user.id, &data.content).await?;
    feeds.publish(FeedMessage::CommentEdited(comment.clone()));
    Ok(Json(comment))
}

pub async fn delete_comment(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    State(feeds): State<PageFeeds>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<()>, Error> {
    let comment = comments::soft_delete_comment(&*db, CommentId(id), user.id).await?;
    feeds.publish(FeedMessage::CommentDeleted {
        id: comment.id,
        page_id: comment.page_id,
        parent_id: comment.parent_id,
    });
    Ok(Json(()))
}

pub async fn react(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    State(feeds): State<PageFeeds>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(data): ApiJson<NewReaction>,
) -> Result<Json<ReactionResult>, Error> {
    let (comment, outcome) = comments::react(&*db, CommentId(id), user.id, data.kind).await?;
    feeds.publish(FeedMessage::CommentReacted {
        comment: comment.clone(),
        user_id: user.id,
        kind: data.kind,
        outcome,
    });
    Ok(Json(ReactionResult { comment, outcome }))
}

pub async fn list_replies(
    State(db): State<DbHandle>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<Comment>>, Error> {
    Ok(Json(threads::list_replies(&*db, CommentId(id)).await?))
}

/// Repairs the reply index of a comment, for after a failed back-link
pub async fn reindex(
    Auth(user): Auth,
    State(db): State<DbHandle>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Comment>, Error> {
    tracing::info!(requester = ?user.id, comment = %id, "reindexing replies");
    Ok(Json(comments::rebuild_reply_index(&*db, CommentId(id)).await?))
}

pub async fn list_comments(
    State(db): State<DbHandle>,
    ApiPath(page): ApiPath<String>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<CommentPage>, Error> {
    Ok(Json(
        threads::list_top_level(&*db, &PageId(page), &query).await?,
    ))
}

pub async fn page_feed(
    ws: WebSocketUpgrade,
    State(feeds): State<PageFeeds>,
    ApiPath(page): ApiPath<String>,
) -> Result<axum::response::Response, Error> {
    let page = PageId(page);
    page.validate()?;
    Ok(ws.on_upgrade(move |sock| {
        let (write, read) = sock.split();
        feeds.add_for_page(page, write, read)
    }))
}
