#![cfg(test)]

use axum::{
    extract::FromRequestParts,
    http::{self, request},
    Router,
};
use remark_api::{
    Comment, CommentId, CommentPage, EditComment, Error as ApiError, Identity, NewComment,
    NewReaction, NewSession, NewUser, PageId, ReactionKind, ReactionResult, Uuid,
};
use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path, sync::Arc};
use tower::{Service, ServiceExt};

use crate::{extractors::*, *};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

/// Picks the newest postgres in PATH that postgresfixture can drive, if any
fn build_pg_cluster(data: &Path) -> Option<postgresfixture::cluster::Cluster> {
    let mut runtime = None;
    let mut best_version = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            // pg_ctl status codes are only interpreted up to postgresql 14
            if v.major > 14 {
                continue;
            }
            match (&mut runtime, &mut best_version) {
                (None, None) => {
                    runtime = Some(r);
                    best_version = Some(v);
                }
                (Some(runtime), Some(best_version)) => {
                    if *best_version < v {
                        *runtime = r;
                        *best_version = v;
                    }
                }
                _ => unreachable!(),
            }
        }
    }
    runtime.map(|r| postgresfixture::cluster::Cluster::new(data, r))
}

/// Runs `$fn` on fuzzed inputs against a migrated database. The database is
/// `TEST_DATABASE_URL` when set, and otherwise a throwaway cluster built from
/// the postgres binaries in PATH. With neither available the test is skipped.
/// Every table is truncated between runs, never point this at real data.
macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                tracing_subscriber::fmt::init();
            }
            let fuzz_on = |url: &str| {
                let runtime = AssertUnwindSafe(
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed initializing tokio runtime"),
                );
                let pool = AssertUnwindSafe(runtime.block_on(async move {
                    let pool = create_sqlx_pool(url, 4).await.expect("creating sqlx pool");
                    MIGRATOR
                        .run(&mut *pool.acquire().await.expect("getting migrator connection"))
                        .await
                        .expect("failed applying migrations");
                    sqlx::query(include_str!("../reset-test-db.sql"))
                        .execute(&pool)
                        .await
                        .expect("failed cleaning up database before the first run");
                    pool
                }));
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
                        let idle_before = pool.num_idle();
                        let v_str = format!("{v:?}");
                        let idle_after_res: Result<usize, _> = {
                            let pool = pool.clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool.clone(), v).await;
                                    let mut idle_after = pool.num_idle();
                                    let wait_release_since = std::time::Instant::now();
                                    while idle_after < idle_before
                                        && wait_release_since.elapsed()
                                            <= std::time::Duration::from_secs(1)
                                    {
                                        tokio::task::yield_now().await;
                                        idle_after = pool.num_idle();
                                    }
                                    idle_after
                                })
                            }))
                        };
                        runtime.block_on(async move {
                            let mut conn =
                                pool.acquire().await.expect("getting db cleanup connection");
                            sqlx::query(include_str!("../reset-test-db.sql"))
                                .execute(&mut *conn)
                                .await
                                .expect("failed cleaning up database");
                        });
                        match idle_after_res {
                            Err(e) => std::panic::resume_unwind(e),
                            Ok(idle_after) => assert!(
                                idle_after >= idle_before,
                                "test {} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after} with value {v_str}",
                                stringify!($name)
                            ),
                        }
                    });
            };

            if let Ok(url) = std::env::var("TEST_DATABASE_URL") {
                return fuzz_on(&url);
            }
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let datadir_path: &Path = datadir.as_ref();
            let Some(cluster) = build_pg_cluster(datadir_path) else {
                eprintln!(
                    "skipping {}: set TEST_DATABASE_URL or put postgresql 14 or older in PATH",
                    stringify!($name)
                );
                return;
            };
            let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
            let lockfile = tempfile::tempfile().expect("creating tempfile");
            postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
                cluster.createdb("test_db").expect("creating test_db database");
                fuzz_on(&format!("postgresql://?host={}&dbname=test_db", datadir_path));
            })
            .expect("coordinating spinup and shutdown of the pg cluster");
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::Unauthenticated)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

pub(crate) async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status == http::StatusCode::OK {
        return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
            panic!(
                r#"
                    Failed parsing resp body!

                    The error is the following:
                    ---
                    {err}
                    ---

                    Response body is:
                    ---
                    {body:?}
                    ---

                    Request was:
                    ---
                    {req_body:?}
                    ---
                "#
            )
        }));
    }
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

pub(crate) async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<Uuid>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {token}")),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    Register {
        name: u8,
    },
    Auth {
        uid: usize,
        wrong_password: bool,
    },
    Post {
        sid: usize,
        on_b: bool,
        #[generator(bolero::generator::gen_with::<String>().len(0..24usize))]
        content: String,
    },
    Reply {
        sid: usize,
        cid: usize,
        on_b: bool,
        #[generator(bolero::generator::gen_with::<String>().len(0..24usize))]
        content: String,
    },
    Edit {
        sid: usize,
        cid: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..24usize))]
        content: String,
    },
    Delete {
        sid: usize,
        cid: usize,
    },
    React {
        sid: usize,
        cid: usize,
        like: bool,
    },
    List {
        on_b: bool,
        page: u8,
        page_size: u8,
        sort: u8,
    },
    Replies {
        cid: usize,
    },
    Reindex {
        sid: usize,
        cid: usize,
    },
}

/// The same object as seen by the postgres-backed and the in-memory server
#[derive(Clone, Copy, Debug)]
struct Pair<T> {
    pg: T,
    mem: T,
}

impl<T> Pair<T> {
    fn same(t: T) -> Pair<T>
    where
        T: Clone,
    {
        Pair { pg: t.clone(), mem: t }
    }

    fn map<U>(self, f: impl Fn(T) -> U) -> Pair<U> {
        Pair {
            pg: f(self.pg),
            mem: f(self.mem),
        }
    }
}

/// What must agree between both servers, ids and timestamps being random
#[derive(Debug, Eq, Ord, PartialEq, PartialOrd)]
struct Summary {
    page: PageId,
    content: String,
    is_reply: bool,
    likes: usize,
    dislikes: usize,
    replies: usize,
    is_deleted: bool,
}

impl From<Comment> for Summary {
    fn from(c: Comment) -> Summary {
        Summary {
            page: c.page_id,
            content: c.content,
            is_reply: c.parent_id.is_some(),
            likes: c.likes.len(),
            dislikes: c.dislikes.len(),
            replies: c.reply_ids.len(),
            is_deleted: c.is_deleted,
        }
    }
}

fn strip_ids(err: ApiError) -> ApiError {
    match err {
        ApiError::CommentNotFound(_) => ApiError::CommentNotFound(CommentId(Uuid::nil())),
        ApiError::Unknown(msg) => panic!("server hit an internal error: {msg}"),
        err => err,
    }
}

fn compare<T, U>(name: &str, res: Pair<Result<T, ApiError>>, summarize: impl Fn(T) -> U)
where
    U: Debug + PartialEq,
{
    let res = res.map(|r| r.map(&summarize).map_err(strip_ids));
    assert_eq!(
        res.pg, res.mem,
        "postgres and in-memory servers did not return the same result for {name}"
    );
}

fn page_name(on_b: bool) -> &'static str {
    match on_b {
        false => "page-a",
        true => "page-b",
    }
}

const PASSWORD: &str = "fuzz-password";

struct ComparativeFuzzer {
    apps: Pair<Router>,
    users: Vec<String>,
    registered: usize,
    sessions: Vec<Pair<Uuid>>,
    comments: Vec<Pair<CommentId>>,
}

impl ComparativeFuzzer {
    fn new(pool: sqlx::PgPool) -> ComparativeFuzzer {
        let auth = AuthConfig { bcrypt_cost: 4 };
        ComparativeFuzzer {
            apps: Pair {
                pg: app(AppState::new(Arc::new(PostgresDb::new(pool)), auth)),
                mem: app(AppState::new(Arc::new(MemDb::new()), auth)),
            },
            users: Vec::new(),
            registered: 0,
            sessions: Vec::new(),
            comments: Vec::new(),
        }
    }

    async fn run<Req, Resp>(
        &mut self,
        method: &str,
        uris: Pair<String>,
        tokens: Option<Pair<Uuid>>,
        bodies: Pair<Req>,
    ) -> Pair<Result<Resp, ApiError>>
    where
        Req: Debug + serde::Serialize,
        Resp: 'static + for<'de> serde::Deserialize<'de>,
    {
        Pair {
            pg: run_on_app(
                &mut self.apps.pg,
                method,
                &uris.pg,
                tokens.map(|t| t.pg),
                &bodies.pg,
            )
            .await,
            mem: run_on_app(
                &mut self.apps.mem,
                method,
                &uris.mem,
                tokens.map(|t| t.mem),
                &bodies.mem,
            )
            .await,
        }
    }

    async fn register(&mut self, name: u8) {
        let name = format!("user{}", name % 16);
        // emails never collide, so that a duplicate name is the only possible conflict
        let email = format!("fuzz{}@example.org", self.registered);
        self.registered += 1;
        let new_user = NewUser::new(name.clone(), email, String::from(PASSWORD));
        let res: Pair<Result<Identity, ApiError>> = self
            .run(
                "POST",
                Pair::same(String::from("/api/register")),
                None,
                Pair::same(new_user),
            )
            .await;
        if let (Ok(_), Ok(_)) = (&res.pg, &res.mem) {
            self.users.push(name);
        }
        compare("Register", res, |i| (i.name, i.email));
    }

    async fn auth(&mut self, uid: usize, wrong_password: bool) {
        if self.users.is_empty() {
            self.register(self.registered as u8).await;
        }
        let Some(uid) = resize_int(uid, ..self.users.len()) else {
            return;
        };
        let password = match wrong_password {
            true => format!("{PASSWORD}-wrong"),
            false => String::from(PASSWORD),
        };
        let session = NewSession::new(self.users[uid].clone(), password, String::from("fuzz"));
        let res: Pair<Result<Uuid, ApiError>> = self
            .run(
                "POST",
                Pair::same(String::from("/api/auth")),
                None,
                Pair::same(session),
            )
            .await;
        if let (&Ok(pg), &Ok(mem)) = (&res.pg, &res.mem) {
            self.sessions.push(Pair { pg, mem });
        }
        compare("Auth", res, |_| ());
    }

    async fn session(&mut self, sid: usize) -> Option<Pair<Uuid>> {
        if self.sessions.is_empty() {
            self.auth(0, false).await;
        }
        resize_int(sid, ..self.sessions.len()).map(|s| self.sessions[s])
    }

    fn comment(&self, cid: usize) -> Option<Pair<CommentId>> {
        resize_int(cid, ..self.comments.len()).map(|c| self.comments[c])
    }

    fn comment_uris(c: Pair<CommentId>, suffix: &str) -> Pair<String> {
        c.map(|id| format!("/api/comments/{}{suffix}", id.0))
    }

    fn record(&mut self, res: &Pair<Result<Comment, ApiError>>) {
        if let (Ok(pg), Ok(mem)) = (&res.pg, &res.mem) {
            self.comments.push(Pair {
                pg: pg.id,
                mem: mem.id,
            });
        }
    }

    /// Each server must hand out exactly the comment it then serves from storage
    async fn check_stored(&mut self, returned: Pair<Option<Comment>>) {
        let (Some(pg), Some(mem)) = (returned.pg, returned.mem) else { return };
        let ids = Pair {
            pg: pg.id,
            mem: mem.id,
        };
        let fetched: Pair<Result<Comment, ApiError>> = self
            .run("GET", Self::comment_uris(ids, ""), None, Pair::same(()))
            .await;
        assert_eq!(fetched.pg, Ok(pg), "postgres server returned a comment it did not store");
        assert_eq!(fetched.mem, Ok(mem), "in-memory server returned a comment it did not store");
    }

    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::Register { name } => self.register(name).await,
            FuzzOp::Auth {
                uid,
                wrong_password,
            } => self.auth(uid, wrong_password).await,
            FuzzOp::Post { sid, on_b, content } => {
                let Some(tok) = self.session(sid).await else { return };
                let new_comment = NewComment {
                    page_id: PageId(String::from(page_name(on_b))),
                    content,
                    parent_id: None,
                };
                let res = self
                    .run(
                        "POST",
                        Pair::same(String::from("/api/comments")),
                        Some(tok),
                        Pair::same(new_comment),
                    )
                    .await;
                self.record(&res);
                self.check_stored(Pair {
                    pg: res.pg.as_ref().ok().cloned(),
                    mem: res.mem.as_ref().ok().cloned(),
                })
                .await;
                compare("Post", res, Summary::from);
            }
            FuzzOp::Reply {
                sid,
                cid,
                on_b,
                content,
            } => {
                let Some(tok) = self.session(sid).await else { return };
                let Some(parent) = self.comment(cid) else { return };
                let bodies = parent.map(|parent| NewComment {
                    page_id: PageId(String::from(page_name(on_b))),
                    content: content.clone(),
                    parent_id: Some(parent),
                });
                let res = self
                    .run(
                        "POST",
                        Pair::same(String::from("/api/comments")),
                        Some(tok),
                        bodies,
                    )
                    .await;
                self.record(&res);
                self.check_stored(Pair {
                    pg: res.pg.as_ref().ok().cloned(),
                    mem: res.mem.as_ref().ok().cloned(),
                })
                .await;
                compare("Reply", res, Summary::from);
            }
            FuzzOp::Edit { sid, cid, content } => {
                let Some(tok) = self.session(sid).await else { return };
                let Some(c) = self.comment(cid) else { return };
                let res: Pair<Result<Comment, ApiError>> = self
                    .run(
                        "PUT",
                        Self::comment_uris(c, ""),
                        Some(tok),
                        Pair::same(EditComment { content }),
                    )
                    .await;
                self.check_stored(Pair {
                    pg: res.pg.as_ref().ok().cloned(),
                    mem: res.mem.as_ref().ok().cloned(),
                })
                .await;
                compare("Edit", res, Summary::from);
            }
            FuzzOp::Delete { sid, cid } => {
                let Some(tok) = self.session(sid).await else { return };
                let Some(c) = self.comment(cid) else { return };
                let res: Pair<Result<(), ApiError>> = self
                    .run("DELETE", Self::comment_uris(c, ""), Some(tok), Pair::same(()))
                    .await;
                compare("Delete", res, |()| ());
            }
            FuzzOp::React { sid, cid, like } => {
                let Some(tok) = self.session(sid).await else { return };
                let Some(c) = self.comment(cid) else { return };
                let kind = match like {
                    true => ReactionKind::Like,
                    false => ReactionKind::Dislike,
                };
                let res: Pair<Result<ReactionResult, ApiError>> = self
                    .run(
                        "POST",
                        Self::comment_uris(c, "/react"),
                        Some(tok),
                        Pair::same(NewReaction { kind }),
                    )
                    .await;
                self.check_stored(Pair {
                    pg: res.pg.as_ref().ok().map(|r| r.comment.clone()),
                    mem: res.mem.as_ref().ok().map(|r| r.comment.clone()),
                })
                .await;
                compare("React", res, |r| (Summary::from(r.comment), r.outcome));
            }
            FuzzOp::List {
                on_b,
                page,
                page_size,
                sort,
            } => {
                let sort = ["newest", "most_liked", "most_disliked"][usize::from(sort % 3)];
                let uri = format!(
                    "/api/pages/{}/comments?page={page}&page_size={page_size}&sort={sort}",
                    page_name(on_b)
                );
                let res: Pair<Result<CommentPage, ApiError>> =
                    self.run("GET", Pair::same(uri), None, Pair::same(())).await;
                compare("List", res, |p| {
                    let items = p.items.into_iter().map(Summary::from).collect::<Vec<_>>();
                    (p.total_count, p.page, p.page_size, items)
                });
            }
            FuzzOp::Replies { cid } => {
                let Some(c) = self.comment(cid) else { return };
                let res: Pair<Result<Vec<Comment>, ApiError>> = self
                    .run("GET", Self::comment_uris(c, "/replies"), None, Pair::same(()))
                    .await;
                compare("Replies", res, |replies| {
                    let mut replies = replies.into_iter().map(Summary::from).collect::<Vec<_>>();
                    replies.sort();
                    replies
                });
            }
            FuzzOp::Reindex { sid, cid } => {
                let Some(tok) = self.session(sid).await else { return };
                let Some(c) = self.comment(cid) else { return };
                let res: Pair<Result<Comment, ApiError>> = self
                    .run("POST", Self::comment_uris(c, "/reindex"), Some(tok), Pair::same(()))
                    .await;
                compare("Reindex", res, Summary::from);
            }
        }
    }
}

do_sqlx_test!(
    compare_postgres_with_memory,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..60usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool);
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);
