use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

const NUM_USERS: usize = 8;
const PASSWORD: &str = "password";

const PAGES: &[&str] = &["/blog/hello-world", "/blog/why-rust", "/about"];
const NUM_COMMENTS: usize = 300;
const REPLY_PROBABILITY: f64 = 0.6;
const DELETE_PROBABILITY: f64 = 0.05;
const MAX_COMMENT_WORDS: usize = 60;

struct GenComment {
    id: Uuid,
    page: &'static str,
    parent: Option<usize>,
    author: Uuid,
    content: String,
    likes: Vec<Uuid>,
    dislikes: Vec<Uuid>,
    reply_ids: Vec<Uuid>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
}

fn gen_n_items(table: &str, n: usize, mut f: impl FnMut(usize) -> String) {
    println!("INSERT INTO {} VALUES", table);
    for i in 0..n {
        if i != 0 {
            println!(",");
        }
        print!("    {}", f(i));
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

fn sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn sql_uuid_array(ids: &[Uuid]) -> String {
    let ids = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
    format!("'{{{}}}'::UUID[]", ids.join(","))
}

fn gen_comment_text(rng: &mut impl Rng) -> String {
    lipsum::lipsum_words(rng.gen_range(1..=MAX_COMMENT_WORDS))
}

/// Splits the users into likers and dislikers of a comment, with most users
/// not reacting at all
fn gen_reactions(rng: &mut impl Rng, users: &[Uuid]) -> (Vec<Uuid>, Vec<Uuid>) {
    let (mut likes, mut dislikes) = (Vec::new(), Vec::new());
    for u in users {
        match rng.gen_range(0..6) {
            0 | 1 => likes.push(*u),
            2 => dislikes.push(*u),
            _ => (),
        }
    }
    (likes, dislikes)
}

/// Comments in creation order, so parents always come first. Replies only
/// go to comments that are not deleted.
fn gen_comments(rng: &mut impl Rng, users: &[Uuid], start: DateTime<Utc>) -> Vec<GenComment> {
    let mut comments: Vec<GenComment> = Vec::with_capacity(NUM_COMMENTS);
    let mut live: Vec<usize> = Vec::new();
    let mut ids = HashSet::new();
    for i in 0..NUM_COMMENTS {
        let created_at = start + Duration::minutes(i as i64 * 7 + rng.gen_range(0..7));
        let parent = match rng.gen_bool(REPLY_PROBABILITY) {
            true => live.choose(rng).copied(),
            false => None,
        };
        let page = match parent {
            Some(p) => comments[p].page,
            None => PAGES.choose(rng).copied().unwrap_or(PAGES[0]),
        };
        let id = Uuid::new_v4();
        assert!(ids.insert(id), "generated the same uuid twice");
        if let Some(p) = parent {
            comments[p].reply_ids.push(id);
        }
        let (likes, dislikes) = gen_reactions(rng, users);
        let is_deleted = rng.gen_bool(DELETE_PROBABILITY);
        if !is_deleted {
            live.push(i);
        }
        comments.push(GenComment {
            id,
            page,
            parent,
            author: *users.choose(rng).unwrap_or(&users[0]),
            content: gen_comment_text(rng),
            likes,
            dislikes,
            reply_ids: Vec::new(),
            is_deleted,
            created_at,
        });
    }
    comments
}

fn main() {
    let mut rng = rand::thread_rng();
    let start = Utc::now() - Duration::days(30);

    // all users share the same password, hashed once
    let password_hash = bcrypt::hash(PASSWORD, 4).expect("hashing test password");
    let users = (0..NUM_USERS).map(|_| Uuid::new_v4()).collect::<Vec<_>>();
    gen_n_items("users", NUM_USERS, |i| {
        format!(
            "('{}', 'user{i}', 'user{i}@example.org', {}, '{}')",
            users[i],
            sql_string(&password_hash),
            start.to_rfc3339(),
        )
    });

    let comments = gen_comments(&mut rng, &users, start);

    gen_n_items("comments", comments.len(), |i| {
        let c = &comments[i];
        let updated_at = c.created_at + Duration::seconds(rng.gen_range(0..3600));
        format!(
            "('{}', {}, {}, '{}', {}, {}, {}, {}, {}, '{}', '{}')",
            c.id,
            sql_string(c.page),
            match c.parent {
                Some(p) => format!("'{}'", comments[p].id),
                None => String::from("NULL"),
            },
            c.author,
            sql_string(&c.content),
            sql_uuid_array(&c.likes),
            sql_uuid_array(&c.dislikes),
            sql_uuid_array(&c.reply_ids),
            c.is_deleted,
            c.created_at.to_rfc3339(),
            updated_at.to_rfc3339(),
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_only_target_live_comments() {
        let mut rng = rand::thread_rng();
        let users = (0..NUM_USERS).map(|_| Uuid::new_v4()).collect::<Vec<_>>();
        for _ in 0..20 {
            let comments = gen_comments(&mut rng, &users, Utc::now());
            for c in &comments {
                if let Some(p) = c.parent {
                    assert!(!comments[p].is_deleted, "reply to a deleted comment");
                    assert_eq!(comments[p].page, c.page);
                    assert!(comments[p].reply_ids.contains(&c.id));
                }
            }
        }
    }
}
