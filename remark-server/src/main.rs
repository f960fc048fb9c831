use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use structopt::StructOpt;

mod comments;
mod db;
mod error;
mod extractors;
mod feeds;
mod handlers;
mod threads;
mod users;

#[cfg(test)]
mod fuzz;

use db::{create_sqlx_pool, Db, MemDb, PostgresDb, MIGRATOR};
use error::Error;
use extractors::{AppState, AuthConfig};
use feeds::PageFeeds;

#[derive(Debug, StructOpt)]
#[structopt(name = "remark-server", about = "Threaded comments for any web page")]
struct Opt {
    /// Address to listen on
    #[structopt(long, env = "REMARK_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Postgres database to store comments in. Everything is kept in memory,
    /// and lost on restart, if this is not set.
    #[structopt(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[structopt(long, env = "REMARK_MAX_DB_CONNECTIONS", default_value = "16")]
    max_db_connections: u32,

    /// Work factor used when hashing new passwords
    #[structopt(long, env = "REMARK_BCRYPT_COST", default_value = "12")]
    bcrypt_cost: u32,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/register", post(handlers::register))
        .route("/api/auth", post(handlers::auth))
        .route("/api/unauth", post(handlers::unauth))
        .route("/api/whoami", get(handlers::whoami))
        .route("/api/fetch-users", get(handlers::fetch_users))
        .route("/api/comments", post(handlers::create_comment))
        .route(
            "/api/comments/:id",
            get(handlers::get_comment)
                .put(handlers::edit_comment)
                .delete(handlers::delete_comment),
        )
        .route("/api/comments/:id/react", post(handlers::react))
        .route("/api/comments/:id/replies", get(handlers::list_replies))
        .route("/api/comments/:id/reindex", post(handlers::reindex))
        .route("/api/pages/:page_id/comments", get(handlers::list_comments))
        .route("/api/pages/:page_id/feed", get(handlers::page_feed))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = Opt::from_args();

    let db: Arc<dyn Db> = match &opt.database_url {
        Some(url) => {
            let pool = create_sqlx_pool(url, opt.max_db_connections).await?;
            MIGRATOR
                .run(&pool)
                .await
                .context("applying database migrations")?;
            Arc::new(PostgresDb::new(pool))
        }
        None => {
            tracing::warn!("no DATABASE_URL set, comments will only be kept in memory");
            Arc::new(MemDb::new())
        }
    };
    let state = AppState::new(
        db,
        AuthConfig {
            bcrypt_cost: opt.bcrypt_cost,
        },
    );

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app(state).into_make_service())
        .await
        .context("serving axum webserver")
}
