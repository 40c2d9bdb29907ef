//! Write batches and page change notifications.
//!
//! Every write batch gets a new generation number. A level remembers, per
//! page, the generation that last dirtied it, so a page is recorded at most
//! once per batch no matter how many of its voxels change. Records that span
//! several generations before a flush are merged when they are taken.

/// What happened to a page during a write batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PageUpdateKind {
    /// The page received its first backing memory in this batch.
    Added,
    /// An already committed page changed.
    Updated,
    /// Every byte of the page went back to zero and its memory was released.
    /// The update carries no data.
    Removed,
}

/// One dirty page, as recorded during a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DirtyPage {
    pub page: u32,
    pub kind: PageUpdateKind,
}

/// Notification handed to the `end_write` callback.
#[derive(Clone, Copy, Debug)]
pub struct PageUpdate<'a> {
    /// Level index (0 = finest)
    pub level: u8,
    /// Page index within the level
    pub page: u32,
    pub kind: PageUpdateKind,
    /// Current contents of the page; empty for removed pages
    pub data: &'a [u8],
}

/// Dirty pages of the current batch, grouped by level.
#[derive(Debug)]
pub struct DirtyLog {
    generation: u64,
    levels: Vec<Vec<DirtyPage>>,
}

impl DirtyLog {
    /// Create an empty log for `level_count` levels.
    ///
    /// Generation 0 is never current, so freshly built levels (whose pages
    /// start at generation 0) record their first change.
    pub fn new(level_count: usize) -> Self {
        Self {
            generation: 1,
            levels: vec![Vec::new(); level_count],
        }
    }

    /// Current batch generation
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new batch.
    pub fn advance(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Record a page that changed for the first time in this batch.
    pub(crate) fn record(&mut self, level: usize, page: DirtyPage) {
        self.levels[level].push(page);
    }

    /// Pages recorded for one level
    pub fn pages(&self, level: usize) -> &[DirtyPage] {
        self.levels.get(level).map_or(&[], Vec::as_slice)
    }

    /// Total pages waiting to be reported
    pub fn pending(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Remove and return the records of one level, one per page.
    ///
    /// A page dirtied in several generations keeps its earliest record, so a
    /// page committed anywhere in the span is still reported as added.
    pub(crate) fn take(&mut self, level: usize) -> Vec<DirtyPage> {
        let mut pages = std::mem::take(&mut self.levels[level]);
        pages.sort_by_key(|dirty| dirty.page);
        pages.dedup_by_key(|dirty| dirty.page);
        pages
    }
}
