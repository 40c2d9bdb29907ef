//! Demand-paged byte storage for one level.
//!
//! A virtual arena reserves a page table up front and only allocates a
//! page's bytes the first time something is written into it; reads of
//! uncommitted pages see zeroes and never allocate. Each page keeps a count
//! of its non-zero bytes so a virtual page that goes back to all zeroes can
//! be released. A direct arena is one
//! heap block with every page committed from the start, used for levels too
//! small to be worth paging.

/// How a level's bytes are backed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PagingMode {
    /// Single heap allocation, all pages committed.
    Direct,
    /// Reserved page table, pages committed on first write.
    Virtual,
}

#[derive(Debug)]
enum Backing {
    Direct(Box<[u8]>),
    Virtual(Vec<Option<Box<[u8]>>>),
}

/// Fixed-size pages of bytes with commit-on-write semantics.
#[derive(Debug)]
pub struct PagedArena {
    page_bytes: usize,
    page_count: usize,
    committed: usize,
    /// Non-zero bytes per page
    live: Vec<u32>,
    backing: Backing,
}

impl PagedArena {
    /// Reserve `page_count` pages of `page_bytes` each.
    pub fn new(mode: PagingMode, page_bytes: usize, page_count: usize) -> Self {
        debug_assert!(page_bytes > 0);
        let backing = match mode {
            PagingMode::Direct => Backing::Direct(vec![0u8; page_bytes * page_count].into()),
            PagingMode::Virtual => Backing::Virtual((0..page_count).map(|_| None).collect()),
        };
        let committed = match mode {
            PagingMode::Direct => page_count,
            PagingMode::Virtual => 0,
        };
        Self {
            page_bytes,
            page_count,
            committed,
            live: vec![0; page_count],
            backing,
        }
    }

    /// Backing mode of this arena
    pub const fn mode(&self) -> PagingMode {
        match self.backing {
            Backing::Direct(_) => PagingMode::Direct,
            Backing::Virtual(_) => PagingMode::Virtual,
        }
    }

    /// Bytes per page
    pub const fn page_bytes(&self) -> usize {
        self.page_bytes
    }

    /// Number of reserved pages
    pub const fn page_count(&self) -> usize {
        self.page_count
    }

    /// Number of pages currently backed by memory
    pub const fn committed_pages(&self) -> usize {
        self.committed
    }

    /// Address space reserved by this arena
    pub const fn reserved_bytes(&self) -> usize {
        self.page_bytes * self.page_count
    }

    /// Bytes actually allocated for page contents
    pub const fn committed_bytes(&self) -> usize {
        self.page_bytes * self.committed
    }

    /// Whether a page has backing memory
    pub fn is_committed(&self, page: usize) -> bool {
        match &self.backing {
            Backing::Direct(_) => page < self.page_count,
            Backing::Virtual(pages) => pages[page].is_some(),
        }
    }

    /// Back a page with zeroed memory.
    ///
    /// Returns `true` if the page was committed by this call.
    pub fn commit(&mut self, page: usize) -> bool {
        let Backing::Virtual(pages) = &mut self.backing else {
            return false;
        };
        let slot = &mut pages[page];
        if slot.is_some() {
            return false;
        }
        *slot = Some(vec![0u8; self.page_bytes].into_boxed_slice());
        self.committed += 1;
        tracing::trace!(page, bytes = self.page_bytes, "committed page");
        true
    }

    /// Release a virtual page whose bytes are all zero.
    ///
    /// Returns `true` if the page's memory was freed. Direct pages and pages
    /// still holding data are left alone.
    pub fn decommit_if_empty(&mut self, page: usize) -> bool {
        let Backing::Virtual(pages) = &mut self.backing else {
            return false;
        };
        if self.live[page] != 0 || pages[page].take().is_none() {
            return false;
        }
        self.committed -= 1;
        tracing::trace!(page, bytes = self.page_bytes, "released page");
        true
    }

    /// Number of non-zero bytes in a page
    pub fn live_bytes(&self, page: usize) -> u32 {
        self.live[page]
    }

    /// Read one byte; uncommitted pages read as zero.
    #[inline]
    pub fn read(&self, page: usize, offset: usize) -> u8 {
        debug_assert!(offset < self.page_bytes);
        match &self.backing {
            Backing::Direct(bytes) => bytes[page * self.page_bytes + offset],
            Backing::Virtual(pages) => pages[page].as_ref().map_or(0, |bytes| bytes[offset]),
        }
    }

    /// Write one byte, committing the page first if needed.
    ///
    /// Returns `true` if the page was committed by this call.
    #[inline]
    pub fn write(&mut self, page: usize, offset: usize, value: u8) -> bool {
        debug_assert!(offset < self.page_bytes);
        let old = self.read(page, offset);
        let newly_committed = self.commit(page);
        match &mut self.backing {
            Backing::Direct(bytes) => bytes[page * self.page_bytes + offset] = value,
            Backing::Virtual(pages) => {
                if let Some(bytes) = pages[page].as_mut() {
                    bytes[offset] = value;
                }
            }
        }
        if old == 0 && value != 0 {
            self.live[page] += 1;
        } else if old != 0 && value == 0 {
            self.live[page] -= 1;
        }
        newly_committed
    }

    /// Contents of a committed page
    pub fn page(&self, page: usize) -> Option<&[u8]> {
        match &self.backing {
            Backing::Direct(bytes) => {
                let start = page * self.page_bytes;
                bytes.get(start..start + self.page_bytes)
            }
            Backing::Virtual(pages) => pages.get(page)?.as_deref(),
        }
    }

    /// Bookkeeping plus committed page memory, in bytes
    pub fn memory_usage(&self) -> usize {
        let table = match &self.backing {
            Backing::Direct(_) => 0,
            Backing::Virtual(pages) => pages.len() * std::mem::size_of::<Option<Box<[u8]>>>(),
        };
        std::mem::size_of::<Self>()
            + table
            + self.live.len() * std::mem::size_of::<u32>()
            + self.committed_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_reads_never_commit() {
        let arena = PagedArena::new(PagingMode::Virtual, 64, 8);
        assert_eq!(arena.read(3, 10), 0);
        assert_eq!(arena.committed_pages(), 0);
        assert!(!arena.is_committed(3));
        assert!(arena.page(3).is_none());
    }

    #[test]
    fn virtual_write_commits_once() {
        let mut arena = PagedArena::new(PagingMode::Virtual, 64, 8);
        assert!(arena.write(2, 5, 7));
        assert!(!arena.write(2, 6, 9));
        assert_eq!(arena.committed_pages(), 1);
        assert_eq!(arena.read(2, 5), 7);
        assert_eq!(arena.read(2, 6), 9);
        assert_eq!(arena.read(2, 7), 0);
        assert_eq!(arena.committed_bytes(), 64);
        assert_eq!(arena.reserved_bytes(), 512);
    }

    #[test]
    fn direct_is_fully_committed() {
        let mut arena = PagedArena::new(PagingMode::Direct, 32, 4);
        assert_eq!(arena.mode(), PagingMode::Direct);
        assert_eq!(arena.committed_pages(), 4);
        assert!(arena.is_committed(3));
        assert!(!arena.commit(1));
        assert!(!arena.write(3, 31, 200));
        assert_eq!(arena.read(3, 31), 200);
        let page = arena.page(3).unwrap();
        assert_eq!(page.len(), 32);
        assert_eq!(page[31], 200);
    }

    #[test]
    fn commit_reports_only_first_call() {
        let mut arena = PagedArena::new(PagingMode::Virtual, 16, 2);
        assert!(arena.commit(1));
        assert!(!arena.commit(1));
        assert_eq!(arena.page(1).unwrap(), &[0u8; 16][..]);
    }

    #[test]
    fn emptied_virtual_page_is_released() {
        let mut arena = PagedArena::new(PagingMode::Virtual, 16, 2);
        arena.write(0, 3, 1);
        arena.write(0, 4, 2);
        arena.write(0, 4, 5);
        assert_eq!(arena.live_bytes(0), 2);

        arena.write(0, 3, 0);
        assert!(!arena.decommit_if_empty(0));
        assert_eq!(arena.read(0, 4), 5);

        arena.write(0, 4, 0);
        assert_eq!(arena.live_bytes(0), 0);
        assert!(arena.decommit_if_empty(0));
        assert!(!arena.decommit_if_empty(0));
        assert_eq!(arena.committed_pages(), 0);
        assert!(arena.page(0).is_none());
        assert_eq!(arena.read(0, 4), 0);

        // A later write commits fresh zeroed memory.
        assert!(arena.write(0, 7, 9));
        assert_eq!(arena.live_bytes(0), 1);
        assert_eq!(arena.read(0, 4), 0);
    }

    #[test]
    fn direct_pages_are_never_released() {
        let mut arena = PagedArena::new(PagingMode::Direct, 8, 2);
        arena.write(1, 0, 4);
        arena.write(1, 0, 0);
        assert!(!arena.decommit_if_empty(1));
        assert_eq!(arena.committed_pages(), 2);
    }
}
