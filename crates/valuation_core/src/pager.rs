use async_trait::async_trait;
use futures_util::stream::{self, Stream, TryStreamExt};
use futures_util::pin_mut;

use crate::{RequestGuard, ValuationError, ValuationResult, ValueRecord};

pub const DEFAULT_PAGE_SIZE: usize = 500;

/// One backend page plus the continuation cursor, if the backend has more.
#[derive(Clone, Debug)]
pub struct Page<C> {
    pub items: Vec<ValueRecord>,
    pub next: Option<C>,
}

impl<C> Page<C> {
    pub fn last(items: Vec<ValueRecord>) -> Self {
        Self { items, next: None }
    }
}

/// A paged backend request. The cursor type stays opaque to the pager.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Cursor: Send;

    async fn fetch_page(
        &self,
        cursor: Option<Self::Cursor>,
        page_size: usize,
    ) -> ValuationResult<Page<Self::Cursor>>;
}

#[derive(Clone, Debug)]
pub struct Pager {
    page_size: usize,
    stop_at: Option<usize>,
    guard: RequestGuard,
}

struct PagerState<C> {
    cursor: Option<C>,
    collected: usize,
    done: bool,
}

impl Pager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            stop_at: None,
            guard: RequestGuard::default(),
        }
    }

    /// Stops requesting pages once this many records have been gathered.
    pub fn stop_at(mut self, count: usize) -> Self {
        self.stop_at = Some(count);
        self
    }

    pub fn with_guard(mut self, guard: RequestGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn satisfied(&self, collected: usize) -> bool {
        self.stop_at.is_some_and(|limit| collected >= limit)
    }

    /// Lazily issues page requests. Each call starts again from the first
    /// page.
    pub fn stream<'a, S>(
        &'a self,
        source: &'a S,
    ) -> impl Stream<Item = ValuationResult<Vec<ValueRecord>>> + 'a
    where
        S: PageSource + 'a,
    {
        let state = PagerState {
            cursor: None,
            collected: 0,
            done: self.satisfied(0),
        };
        stream::try_unfold(state, move |mut state| async move {
            if state.done {
                return Ok::<_, ValuationError>(None);
            }
            let cursor = state.cursor.take();
            let page = self
                .guard
                .run("page fetch", source.fetch_page(cursor, self.page_size))
                .await?;
            state.collected += page.items.len();
            log::debug!(
                "pager: fetched {} items, {} total, more={}",
                page.items.len(),
                state.collected,
                page.next.is_some()
            );
            match page.next {
                Some(next) if !self.satisfied(state.collected) => state.cursor = Some(next),
                _ => state.done = true,
            }
            Ok(Some((page.items, state)))
        })
    }

    /// Drains the stream, truncating to the stop count when one is set.
    pub async fn collect<S: PageSource>(&self, source: &S) -> ValuationResult<Vec<ValueRecord>> {
        let pages = self.stream(source);
        pin_mut!(pages);
        let mut records = Vec::new();
        loop {
            match pages.try_next().await {
                Ok(Some(page)) => records.extend(page),
                Ok(None) => break,
                Err(err) => {
                    if matches!(err, ValuationError::Cancelled { .. }) {
                        log::warn!("pager: scan cancelled after {} items", records.len());
                    }
                    return Err(err);
                }
            }
        }
        if let Some(limit) = self.stop_at {
            records.truncate(limit);
        }
        Ok(records)
    }
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}
