pub mod html;
pub mod reader;
pub mod select;

pub use reader::{parse_feed, FeedBatch, FeedFailure, FeedReader};
pub use select::{select_articles, Selection, SkipReason, Skipped};

pub mod prelude {
    pub use super::reader::FeedReader;
    pub use super::select::select_articles;
    pub use ab_core::{ArticleRecord, Error, Result};
}
