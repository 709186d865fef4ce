//! Storage manager with injectable faults.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{PageId, StorageManager};
use crate::errors::{SpatialError, SpatialResult};

/// In-memory pages whose ids start at 0. Writes can be made to fail on
/// demand, and payloads above a hidden limit are rejected even though
/// [`StorageManager::max_payload`] reports no limit.
pub(crate) struct FaultyStorageManager {
    inner: Mutex<FaultyPages>,
    payload_limit: Option<usize>,
    fail_writes: AtomicBool,
}

struct FaultyPages {
    pages: HashMap<PageId, Vec<u8>>,
    free_pages: Vec<PageId>,
    next_page_id: PageId,
}

impl FaultyStorageManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FaultyPages {
                pages: HashMap::new(),
                free_pages: Vec::new(),
                next_page_id: 0,
            }),
            payload_limit: None,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn with_payload_limit(limit: usize) -> Self {
        Self {
            payload_limit: Some(limit),
            ..Self::new()
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StorageManager for FaultyStorageManager {
    fn load_byte_array(&self, page: PageId) -> SpatialResult<Vec<u8>> {
        self.inner
            .lock()
            .pages
            .get(&page)
            .cloned()
            .ok_or(SpatialError::InvalidPage(page))
    }

    fn store_byte_array(&self, page: Option<PageId>, data: &[u8]) -> SpatialResult<PageId> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SpatialError::Io(io::Error::new(
                io::ErrorKind::Other,
                "write rejected",
            )));
        }
        if let Some(capacity) = self.payload_limit {
            if data.len() > capacity {
                return Err(SpatialError::PageOverflow {
                    size: data.len(),
                    capacity,
                });
            }
        }

        let mut inner = self.inner.lock();
        let page_id = match page {
            Some(page_id) if inner.pages.contains_key(&page_id) => page_id,
            Some(page_id) => return Err(SpatialError::InvalidPage(page_id)),
            None => match inner.free_pages.pop() {
                Some(page_id) => page_id,
                None => {
                    let page_id = inner.next_page_id;
                    inner.next_page_id += 1;
                    page_id
                }
            },
        };
        inner.pages.insert(page_id, data.to_vec());
        Ok(page_id)
    }

    fn delete_byte_array(&self, page: PageId) -> SpatialResult<()> {
        let mut inner = self.inner.lock();
        if inner.pages.remove(&page).is_none() {
            return Err(SpatialError::InvalidPage(page));
        }
        inner.free_pages.push(page);
        Ok(())
    }

    fn flush(&self) -> SpatialResult<()> {
        Ok(())
    }

    fn page_count(&self) -> u64 {
        self.inner.lock().pages.len() as u64
    }
}
