use std::collections::HashMap;

use parking_lot::RwLock;

use super::{PageId, StorageManager};
use crate::errors::{SpatialError, SpatialResult};

/// Keeps every page in memory. Nothing survives the process.
pub struct MemoryStorageManager {
    inner: RwLock<MemoryPages>,
}

struct MemoryPages {
    pages: HashMap<PageId, Vec<u8>>,
    free_pages: Vec<PageId>,
    next_page_id: PageId,
}

impl MemoryStorageManager {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryPages {
                pages: HashMap::new(),
                free_pages: Vec::new(),
                next_page_id: 1,
            }),
        }
    }
}

impl Default for MemoryStorageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageManager for MemoryStorageManager {
    fn load_byte_array(&self, page: PageId) -> SpatialResult<Vec<u8>> {
        self.inner
            .read()
            .pages
            .get(&page)
            .cloned()
            .ok_or(SpatialError::InvalidPage(page))
    }

    fn store_byte_array(&self, page: Option<PageId>, data: &[u8]) -> SpatialResult<PageId> {
        let mut inner = self.inner.write();
        let page_id = match page {
            Some(page_id) => {
                if !inner.pages.contains_key(&page_id) {
                    return Err(SpatialError::InvalidPage(page_id));
                }
                page_id
            }
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
        let mut inner = self.inner.write();
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
        self.inner.read().pages.len() as u64
    }
}
