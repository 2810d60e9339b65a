use ab_core::ArticleRecord;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyPublished,
    Stale,
    Duplicate,
    OverQuota,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::AlreadyPublished => "already published",
            SkipReason::Stale => "too old",
            SkipReason::Duplicate => "duplicate in batch",
            SkipReason::OverQuota => "over daily quota",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Skipped {
    pub article: ArticleRecord,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub selected: Vec<ArticleRecord>,
    pub skipped: Vec<Skipped>,
}

/// Picks at most `quota` fresh, unpublished articles, newest first. Ties
/// are broken by feed order, then by position inside the feed, so the same
/// input always yields the same selection.
pub fn select_articles(
    mut articles: Vec<ArticleRecord>,
    published: &HashSet<String>,
    now: DateTime<Utc>,
    max_age_days: i64,
    quota: usize,
) -> Selection {
    articles.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then(a.feed_position.cmp(&b.feed_position))
            .then(a.entry_position.cmp(&b.entry_position))
    });

    let cutoff = now - Duration::days(max_age_days.max(0));
    let mut seen = HashSet::new();
    let mut selection = Selection::default();

    for article in articles {
        let reason = if published.contains(&article.url) {
            Some(SkipReason::AlreadyPublished)
        } else if article.published_at < cutoff {
            Some(SkipReason::Stale)
        } else if !seen.insert(article.url.clone()) {
            Some(SkipReason::Duplicate)
        } else if selection.selected.len() >= quota {
            Some(SkipReason::OverQuota)
        } else {
            None
        };

        match reason {
            Some(reason) => selection.skipped.push(Skipped { article, reason }),
            None => selection.selected.push(article),
        }
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    fn article(url: &str, hours_ago: i64, feed: usize, entry: usize) -> ArticleRecord {
        ArticleRecord {
            feed_url: format!("https://feed{}.example.com", feed),
            feed_position: feed,
            entry_position: entry,
            url: url.to_string(),
            title: url.to_string(),
            summary: String::new(),
            content: "body".to_string(),
            published_at: now() - Duration::hours(hours_ago),
            image_urls: vec![],
            source: "Example".to_string(),
            categories: vec![],
            author: None,
        }
    }

    fn urls(articles: &[ArticleRecord]) -> Vec<&str> {
        articles.iter().map(|a| a.url.as_str()).collect()
    }

    #[test]
    fn test_newest_first_with_tie_break() {
        let articles = vec![
            article("b1", 5, 1, 0),
            article("a1", 5, 0, 1),
            article("a0", 5, 0, 0),
            article("fresh", 1, 1, 3),
        ];
        let selection = select_articles(articles, &HashSet::new(), now(), 3, 10);
        assert_eq!(urls(&selection.selected), vec!["fresh", "a0", "a1", "b1"]);
        assert!(selection.skipped.is_empty());
    }

    #[test]
    fn test_skip_reasons() {
        let published: HashSet<String> = ["old-news".to_string()].into_iter().collect();
        let articles = vec![
            article("old-news", 1, 0, 0),
            article("stale", 24 * 4, 0, 1),
            article("dup", 2, 0, 2),
            article("dup", 3, 1, 0),
            article("extra", 4, 1, 1),
        ];
        let selection = select_articles(articles, &published, now(), 3, 1);
        assert_eq!(urls(&selection.selected), vec!["dup"]);

        let reasons: Vec<(&str, SkipReason)> = selection
            .skipped
            .iter()
            .map(|s| (s.article.url.as_str(), s.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("old-news", SkipReason::AlreadyPublished),
                ("dup", SkipReason::Duplicate),
                ("extra", SkipReason::OverQuota),
                ("stale", SkipReason::Stale),
            ]
        );
    }

    #[test]
    fn test_everything_published_selects_nothing() {
        let published: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let selection = select_articles(vec![article("a", 1, 0, 0), article("b", 2, 0, 1)], &published, now(), 3, 3);
        assert!(selection.selected.is_empty());
        assert_eq!(selection.skipped.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_selection_respects_quota_and_ledger(
            entries in prop::collection::vec((0usize..12, 0i64..200, 0usize..3), 0..40),
            published_ids in prop::collection::hash_set(0usize..12, 0..6),
            quota in 0usize..6,
        ) {
            let articles: Vec<ArticleRecord> = entries
                .iter()
                .enumerate()
                .map(|(i, (id, hours, feed))| article(&format!("u{}", id), *hours, *feed, i))
                .collect();
            let published: HashSet<String> = published_ids.iter().map(|id| format!("u{}", id)).collect();
            let total = articles.len();

            let selection = select_articles(articles, &published, now(), 3, quota);

            prop_assert!(selection.selected.len() <= quota);
            prop_assert_eq!(selection.selected.len() + selection.skipped.len(), total);

            let mut unique = HashSet::new();
            for a in &selection.selected {
                prop_assert!(!published.contains(&a.url));
                prop_assert!(now() - a.published_at <= Duration::days(3));
                prop_assert!(unique.insert(a.url.clone()));
            }
            prop_assert!(selection
                .selected
                .windows(2)
                .all(|w| w[0].published_at >= w[1].published_at));
        }
    }
}
