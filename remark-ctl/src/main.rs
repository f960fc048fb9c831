use anyhow::{anyhow, Context};
use remark_api::{
    AuthToken, CommentId, EditComment, ListQuery, NewComment, NewReaction, NewSession, NewUser,
    PageId, ReactionKind, SortMode, Uuid,
};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, env = "REMARK_HOST", default_value = "http://127.0.0.1:3000")]
    host: reqwest::Url,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create an account
    Register {
        name: String,
        email: String,
        password: String,
    },

    /// Open a session and print its token, to be exported as REMARK_TOKEN
    Login {
        /// User name or email address
        login: String,
        password: String,

        #[structopt(long, default_value = "remark-ctl")]
        device: String,
    },

    /// Close the session in REMARK_TOKEN
    Logout,

    /// Post a comment on a page
    Post {
        page: String,
        content: String,

        /// Post as a reply to this comment
        #[structopt(long)]
        reply_to: Option<Uuid>,
    },

    /// List the top-level comments of a page
    List {
        page: String,

        #[structopt(long, default_value = "1")]
        page_num: usize,

        #[structopt(long, default_value = "10")]
        page_size: usize,

        /// newest, most_liked or most_disliked
        #[structopt(long, default_value = "newest", parse(try_from_str = parse_snake_case))]
        sort: SortMode,
    },

    /// List the replies to a comment
    Replies { id: Uuid },

    /// Toggle a like or dislike
    React {
        id: Uuid,

        /// like or dislike
        #[structopt(parse(try_from_str = parse_snake_case))]
        kind: ReactionKind,
    },

    /// Replace the content of one of your comments
    Edit { id: Uuid, content: String },

    /// Delete one of your comments
    Delete { id: Uuid },
}

fn parse_snake_case<T: serde::de::DeserializeOwned>(s: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(String::from(s)))
        .with_context(|| format!("{s:?} is not a valid choice"))
}

fn token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("REMARK_TOKEN").context("retrieving REMARK_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing REMARK_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

fn endpoint(host: &reqwest::Url, segments: &[&str]) -> anyhow::Result<reqwest::Url> {
    let mut url = host.clone();
    url.path_segments_mut()
        .map_err(|()| anyhow!("{host} cannot be used as a base url"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Sends the request, turning API errors back into `remark_api::Error`
async fn send(req: reqwest::RequestBuilder) -> anyhow::Result<serde_json::Value> {
    let resp = req.send().await.context("sending request")?;
    let status = resp.status();
    let body = resp.bytes().await.context("reading response body")?;
    if !status.is_success() {
        let err = remark_api::Error::parse(&body)
            .with_context(|| format!("server answered {status} with an unparseable error"))?;
        return Err(err.into());
    }
    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(&body).context("parsing response body")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();
    let host = &opt.host;

    let client = reqwest::Client::new();

    let res = match opt.cmd {
        Command::Register {
            name,
            email,
            password,
        } => {
            send(
                client
                    .post(endpoint(host, &["api", "register"])?)
                    .json(&NewUser::new(name, email, password)),
            )
            .await?
        }
        Command::Login {
            login,
            password,
            device,
        } => {
            let tok = send(
                client
                    .post(endpoint(host, &["api", "auth"])?)
                    .json(&NewSession::new(login, password, device)),
            )
            .await?;
            let tok: AuthToken = serde_json::from_value(tok).context("parsing session token")?;
            println!("{}", tok.0);
            return Ok(());
        }
        Command::Logout => {
            send(
                client
                    .post(endpoint(host, &["api", "unauth"])?)
                    .bearer_auth(token()?.0),
            )
            .await?
        }
        Command::Post {
            page,
            content,
            reply_to,
        } => {
            send(
                client
                    .post(endpoint(host, &["api", "comments"])?)
                    .bearer_auth(token()?.0)
                    .json(&NewComment {
                        page_id: PageId(page),
                        content,
                        parent_id: reply_to.map(CommentId),
                    }),
            )
            .await?
        }
        Command::List {
            page,
            page_num,
            page_size,
            sort,
        } => {
            send(
                client
                    .get(endpoint(host, &["api", "pages", &page, "comments"])?)
                    .query(&ListQuery::new(page_num, page_size, sort)),
            )
            .await?
        }
        Command::Replies { id } => {
            let id = id.to_string();
            send(client.get(endpoint(host, &["api", "comments", &id, "replies"])?)).await?
        }
        Command::React { id, kind } => {
            let id = id.to_string();
            send(
                client
                    .post(endpoint(host, &["api", "comments", &id, "react"])?)
                    .bearer_auth(token()?.0)
                    .json(&NewReaction { kind }),
            )
            .await?
        }
        Command::Edit { id, content } => {
            let id = id.to_string();
            send(
                client
                    .put(endpoint(host, &["api", "comments", &id])?)
                    .bearer_auth(token()?.0)
                    .json(&EditComment { content }),
            )
            .await?
        }
        Command::Delete { id } => {
            let id = id.to_string();
            send(
                client
                    .delete(endpoint(host, &["api", "comments", &id])?)
                    .bearer_auth(token()?.0),
            )
            .await?
        }
    };

    if !res.is_null() {
        println!(
            "{}",
            serde_json::to_string_pretty(&res).context("formatting response")?
        );
    }
    Ok(())
}
