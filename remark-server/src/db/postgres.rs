use std::collections::HashSet;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use remark_api::{
    AuthToken, Comment, CommentId, Identity, PageId, SortMode, User, UserId, Uuid,
};
use sqlx::{postgres::PgRow, Row};

use super::{CommentUpdate, Db};
use crate::Error;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

pub async fn create_sqlx_pool(url: &str, max_connections: u32) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .with_context(|| format!("opening database {url:?}"))
}

macro_rules! comment_columns {
    () => {
        "id, page_id, parent_id, author_id, content, likes, dislikes, reply_ids, is_deleted, created_at, updated_at"
    };
}

const VISIBLE_TOP_LEVEL: &str = "page_id = $1 AND parent_id IS NULL AND is_deleted = false";

#[derive(Clone, Debug)]
pub struct PostgresDb {
    pool: sqlx::PgPool,
}

impl PostgresDb {
    pub fn new(pool: sqlx::PgPool) -> PostgresDb {
        PostgresDb { pool }
    }
}

fn comment_from_row(row: &PgRow) -> anyhow::Result<Comment> {
    let user_set = |field: &str| -> anyhow::Result<HashSet<UserId>> {
        Ok(row
            .try_get::<Vec<Uuid>, _>(field)
            .with_context(|| format!("retrieving the {field} field"))?
            .into_iter()
            .map(UserId)
            .collect())
    };
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        content: row.try_get("content").context("retrieving the content field")?,
        author_id: UserId(
            row.try_get("author_id")
                .context("retrieving the author_id field")?,
        ),
        page_id: PageId(row.try_get("page_id").context("retrieving the page_id field")?),
        parent_id: row
            .try_get::<Option<Uuid>, _>("parent_id")
            .context("retrieving the parent_id field")?
            .map(CommentId),
        likes: user_set("likes")?,
        dislikes: user_set("dislikes")?,
        reply_ids: row
            .try_get::<Vec<Uuid>, _>("reply_ids")
            .context("retrieving the reply_ids field")?
            .into_iter()
            .map(CommentId)
            .collect(),
        is_deleted: row
            .try_get("is_deleted")
            .context("retrieving the is_deleted field")?,
        created_at: row
            .try_get("created_at")
            .context("retrieving the created_at field")?,
        updated_at: row
            .try_get("updated_at")
            .context("retrieving the updated_at field")?,
    })
}

fn user_ids<'a>(users: impl IntoIterator<Item = &'a UserId>) -> Vec<Uuid> {
    users.into_iter().map(|u| u.0).collect()
}

fn order_by(sort: SortMode) -> &'static str {
    match sort {
        SortMode::Newest => "created_at DESC, id DESC",
        SortMode::MostLiked => "cardinality(likes) DESC, created_at DESC, id DESC",
        SortMode::MostDisliked => "cardinality(dislikes) DESC, created_at DESC, id DESC",
    }
}

#[async_trait]
impl Db for PostgresDb {
    async fn create_user(
        &self,
        id: UserId,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<(), Error> {
        let res = sqlx::query("INSERT INTO users VALUES ($1, $2, $3, $4, $5)")
            .bind(id.0)
            .bind(name)
            .bind(email)
            .bind(password_hash)
            .bind(Utc::now())
            .execute(&self.pool)
            .await;
        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.constraint() == Some("users_unique_name") => {
                Err(Error::name_already_used(String::from(name)))
            }
            Err(sqlx::Error::Database(e)) if e.constraint() == Some("users_unique_email") => {
                Err(Error::email_already_used(String::from(email)))
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("inserting user {id:?}"))
                .into()),
        }
    }

    async fn fetch_credentials(
        &self,
        login: &str,
        by_email: bool,
    ) -> anyhow::Result<Option<(UserId, String)>> {
        let query = match by_email {
            true => "SELECT id, password_hash FROM users WHERE email = $1",
            false => "SELECT id, password_hash FROM users WHERE name = $1",
        };
        let row = sqlx::query(query)
            .bind(login)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("fetching credentials for {login:?}"))?;
        match row {
            None => Ok(None),
            Some(row) => Ok(Some((
                UserId(row.try_get("id").context("retrieving the id field")?),
                row.try_get("password_hash")
                    .context("retrieving the password_hash field")?,
            ))),
        }
    }

    async fn fetch_users(&self) -> anyhow::Result<Vec<User>> {
        sqlx::query("SELECT id, name FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("querying users table")?
            .into_iter()
            .map(|row| -> anyhow::Result<User> {
                Ok(User {
                    id: UserId(row.try_get("id").context("retrieving the id field")?),
                    name: row.try_get("name").context("retrieving the name field")?,
                })
            })
            .collect()
    }

    async fn create_session(&self, user: UserId, device: &str) -> anyhow::Result<AuthToken> {
        let token = AuthToken(Uuid::new_v4());
        let now = Utc::now();
        sqlx::query("INSERT INTO sessions VALUES ($1, $2, $3, $4, $4)")
            .bind(token.0)
            .bind(user.0)
            .bind(device)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| format!("inserting session for user {user:?}"))?;
        Ok(token)
    }

    async fn recover_session(&self, token: AuthToken) -> Result<Identity, Error> {
        let row = sqlx::query(
            "
                SELECT u.id, u.name, u.email
                    FROM sessions s
                INNER JOIN users u
                    ON u.id = s.user_id
                WHERE s.id = $1
            ",
        )
        .bind(token.0)
        .fetch_optional(&self.pool)
        .await
        .context("recovering session")?
        .ok_or_else(Error::unauthenticated)?;
        sqlx::query("UPDATE sessions SET last_active = $2 WHERE id = $1")
            .bind(token.0)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("updating session last activity time")?;
        Ok(Identity {
            id: UserId(row.try_get("id").context("retrieving the id field")?),
            name: row.try_get("name").context("retrieving the name field")?,
            email: row.try_get("email").context("retrieving the email field")?,
        })
    }

    async fn logout(&self, token: AuthToken) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(token.0)
            .execute(&self.pool)
            .await
            .context("deleting session")?;
        Ok(res.rows_affected() == 1)
    }

    async fn insert_comment(&self, c: &Comment) -> anyhow::Result<()> {
        let res = sqlx::query(concat!(
            "INSERT INTO comments (",
            comment_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(c.id.0)
        .bind(&c.page_id.0)
        .bind(c.parent_id.map(|p| p.0))
        .bind(c.author_id.0)
        .bind(&c.content)
        .bind(user_ids(&c.likes))
        .bind(user_ids(&c.dislikes))
        .bind(c.reply_ids.iter().map(|r| r.0).collect::<Vec<_>>())
        .bind(c.is_deleted)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting comment {:?}", c.id))?;
        anyhow::ensure!(
            res.rows_affected() == 1,
            "insertion of comment {:?} affected {} rows",
            c.id,
            res.rows_affected()
        );
        Ok(())
    }

    async fn fetch_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        sqlx::query(concat!(
            "SELECT ",
            comment_columns!(),
            " FROM comments WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("fetching comment {id:?}"))?
        .map(|row| comment_from_row(&row))
        .transpose()
    }

    async fn update_comment(
        &self,
        id: CommentId,
        update: &mut CommentUpdate<'_>,
    ) -> Result<Option<Comment>, Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("starting comment update transaction")?;
        let row = sqlx::query(concat!(
            "SELECT ",
            comment_columns!(),
            " FROM comments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("locking comment {id:?}"))?;
        let mut comment = match row {
            None => return Ok(None),
            Some(row) => comment_from_row(&row)?,
        };
        // dropping the transaction on error rolls it back
        update(&mut comment)?;
        sqlx::query(
            "
                UPDATE comments
                SET content = $2,
                    likes = $3,
                    dislikes = $4,
                    reply_ids = $5,
                    is_deleted = $6,
                    updated_at = $7
                WHERE id = $1
            ",
        )
        .bind(id.0)
        .bind(&comment.content)
        .bind(user_ids(&comment.likes))
        .bind(user_ids(&comment.dislikes))
        .bind(comment.reply_ids.iter().map(|r| r.0).collect::<Vec<_>>())
        .bind(comment.is_deleted)
        .bind(comment.updated_at)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("updating comment {id:?}"))?;
        tx.commit()
            .await
            .with_context(|| format!("committing update of comment {id:?}"))?;
        Ok(Some(comment))
    }

    async fn list_top_level(
        &self,
        page: &PageId,
        sort: SortMode,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<(Vec<Comment>, u64)> {
        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM comments WHERE {VISIBLE_TOP_LEVEL}"
        ))
        .bind(&page.0)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("counting top-level comments of {page:?}"))?;
        let query = format!(
            "SELECT {} FROM comments WHERE {VISIBLE_TOP_LEVEL} ORDER BY {} LIMIT $2 OFFSET $3",
            comment_columns!(),
            order_by(sort),
        );
        let comments = sqlx::query(&query)
            .bind(&page.0)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("listing top-level comments of {page:?}"))?
            .iter()
            .map(comment_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((comments, total.max(0) as u64))
    }

    async fn list_replies(&self, parent: CommentId) -> anyhow::Result<Vec<Comment>> {
        sqlx::query(concat!(
            "SELECT ",
            comment_columns!(),
            " FROM comments WHERE parent_id = $1 AND is_deleted = false",
            " ORDER BY created_at ASC, id ASC"
        ))
        .bind(parent.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("listing replies to {parent:?}"))?
        .iter()
        .map(comment_from_row)
        .collect()
    }

    async fn list_child_ids(&self, parent: CommentId) -> anyhow::Result<Vec<CommentId>> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM comments WHERE parent_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(parent.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("listing children of {parent:?}"))?
        .into_iter()
        .map(CommentId)
        .collect())
    }
}
