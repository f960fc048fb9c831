use std::cmp::Ordering;

use crate::{Comment, Error};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Newest,
    MostLiked,
    MostDisliked,
}

impl SortMode {
    /// Total order used to sort top-level comments. Ties on the primary key
    /// fall back to newest first, then to the id so that pagination is stable.
    pub fn compare(&self, a: &Comment, b: &Comment) -> Ordering {
        let primary = match self {
            SortMode::Newest => Ordering::Equal,
            SortMode::MostLiked => b.likes.len().cmp(&a.likes.len()),
            SortMode::MostDisliked => b.dislikes.len().cmp(&a.dislikes.len()),
        };
        primary
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct ListQuery {
    #[serde(default = "first_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub sort: SortMode,
}

fn first_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for ListQuery {
    fn default() -> ListQuery {
        ListQuery {
            page: first_page(),
            page_size: default_page_size(),
            sort: SortMode::default(),
        }
    }
}

impl ListQuery {
    pub fn new(page: usize, page_size: usize, sort: SortMode) -> ListQuery {
        ListQuery {
            page,
            page_size,
            sort,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.page == 0 {
            return Err(Error::InvalidPage(self.page));
        }
        Ok(())
    }

    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Number of items to skip, saturating for absurdly large page numbers
    pub fn offset(&self) -> usize {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.effective_page_size())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentPage {
    pub items: Vec<Comment>,
    pub total_count: u64,
    pub page: usize,
    pub page_size: usize,
}
