//! Keyset pagination over ID-ordered queries.

use std::future::Future;

/// Page size used when the caller passes `per_page <= 0`.
pub const DEFAULT_PER_PAGE: i64 = 10_000;

/// Fetch pages of rows with IDs greater than a moving cursor.
///
/// `fetch(cursor, page_size)` returns the next page ordered by ID; `visit`
/// consumes one row and returns its ID. `limit <= 0` means no limit.
/// Pagination stops on a short page, once `limit` rows were visited, on
/// the first error, or when a page does not move the cursor forward.
pub async fn paginate<T, E, F, Fut, V>(
    limit: i64,
    per_page: i64,
    cursor: i64,
    mut fetch: F,
    mut visit: V,
) -> Result<(), E>
where
    F: FnMut(i64, i64) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
    V: FnMut(T) -> i64,
{
    let mut page_size = if per_page <= 0 { DEFAULT_PER_PAGE } else { per_page };
    if limit > 0 {
        page_size = page_size.min(limit);
    }

    let mut cursor = cursor;
    let mut remaining = limit;

    loop {
        let page = fetch(cursor, page_size).await?;
        let fetched = i64::try_from(page.len()).unwrap_or(i64::MAX);

        let mut next = cursor;
        for row in page {
            next = visit(row);
        }

        if fetched < page_size || next <= cursor {
            return Ok(());
        }
        cursor = next;

        if limit > 0 {
            remaining -= fetched;
            if remaining <= 0 {
                return Ok(());
            }
            page_size = page_size.min(remaining);
        }
    }
}
