//! Generic "fetch every page" loop.
//!
//! Two continuation styles are in use across the workspace:
//! - an opaque cursor token returned in the response body (directory search)
//! - a URL carried by the `Link` response header under `rel="next"` (record APIs)
//!
//! Both reduce to the same contract: a fetch function is called with `None`
//! first and then with whatever continuation the previous page returned,
//! until a page comes back without one. See [`collect_pages`] and
//! [`next_link`].

use std::future::Future;

use once_cell::sync::Lazy;
use regex_lite::Regex;

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<([^>]+)>\s*;\s*rel\s*=\s*"([^"]+)""#).expect("link header pattern is valid")
});

/// One page of results plus the continuation needed to fetch the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page, in server order.
    pub items: Vec<T>,
    /// Cursor or URL of the next page. `None` or an empty string ends pagination.
    pub next: Option<String>,
    /// Total number of items the server reports for the whole query, if any.
    pub total: Option<u64>,
}

impl<T> Page<T> {
    /// Creates a page without a reported total.
    pub fn new(items: Vec<T>, next: Option<String>) -> Self {
        Self {
            items,
            next,
            total: None,
        }
    }

    /// Attaches the server-reported total.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }
}

/// Every page of a query, concatenated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected<T> {
    /// Items from all pages in fetch order.
    pub items: Vec<T>,
    /// Number of fetch calls made.
    pub pages: usize,
    /// Last total reported by the server.
    pub total: Option<u64>,
}

/// Calls `fetch` until a page without a continuation is returned and
/// concatenates the pages.
///
/// The first call receives `None`. Any error aborts the loop and the pages
/// fetched so far are dropped.
pub async fn collect_pages<T, E, F, Fut>(mut fetch: F) -> Result<Collected<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut collected = Collected {
        items: Vec::new(),
        pages: 0,
        total: None,
    };
    let mut continuation: Option<String> = None;

    loop {
        let page = fetch(continuation.take()).await?;
        collected.pages += 1;
        if page.total.is_some() {
            collected.total = page.total;
        }
        collected.items.extend(page.items);

        match page.next {
            Some(next) if !next.is_empty() => continuation = Some(next),
            _ => break,
        }
    }

    Ok(collected)
}

/// Extracts the URL of the `rel="next"` entry from a `Link` header value.
///
/// The header may hold several comma separated `<url>; rel="name"` entries.
/// Returns `None` when no entry is tagged `next`.
pub fn next_link(header: &str) -> Option<String> {
    LINK_RE
        .captures_iter(header)
        .find(|caps| &caps[2] == "next")
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[tokio::test]
    async fn cursor_pages_are_concatenated_in_order() {
        let calls = RefCell::new(Vec::new());
        let pages = [
            Page::new(vec![1, 2], Some("c1".to_string())).with_total(5),
            Page::new(vec![3, 4], Some("c2".to_string())).with_total(5),
            Page::new(vec![5], Some(String::new())).with_total(5),
        ];

        let collected = collect_pages(|cursor: Option<String>| {
            let idx = calls.borrow().len();
            calls.borrow_mut().push(cursor);
            let page = pages[idx].clone();
            async move { Ok::<_, ()>(page) }
        })
        .await
        .unwrap();

        assert_eq!(collected.items, vec![1, 2, 3, 4, 5]);
        assert_eq!(collected.pages, 3);
        assert_eq!(collected.total, Some(5));
        assert_eq!(
            calls.into_inner(),
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[tokio::test]
    async fn missing_continuation_stops_after_first_page() {
        let collected = collect_pages(|_| async { Ok::<_, ()>(Page::new(vec!["a"], None)) })
            .await
            .unwrap();
        assert_eq!(collected.items, vec!["a"]);
        assert_eq!(collected.pages, 1);
        assert_eq!(collected.total, None);
    }

    #[tokio::test]
    async fn error_discards_fetched_pages() {
        let result = collect_pages(|cursor: Option<String>| async move {
            match cursor {
                None => Ok(Page::new(vec![1], Some("next".to_string()))),
                Some(_) => Err("boom"),
            }
        })
        .await;
        assert_eq!(result, Err("boom"));
    }

    #[test]
    fn next_link_picks_the_next_relation() {
        let header = r#"<https://x.example/api?sysparm_offset=0>;rel="first",<https://x.example/api?sysparm_offset=100>;rel="next", <https://x.example/api?sysparm_offset=900> ; rel = "last""#;
        assert_eq!(
            next_link(header).as_deref(),
            Some("https://x.example/api?sysparm_offset=100")
        );
    }

    #[test]
    fn prev_only_link_header_ends_pagination() {
        let header = r#"<https://x.example/api?sysparm_offset=0>;rel="prev""#;
        assert_eq!(next_link(header), None);
        assert_eq!(next_link(""), None);
    }
}
