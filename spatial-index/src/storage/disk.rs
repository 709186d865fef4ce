//! File-backed storage manager.
//!
//! The file is a sequence of fixed-size pages. Page 0 holds the
//! [`StorageHeader`]; every other page holds one bincode-encoded
//! [`PageSlot`]. Each read or write touches exactly one page: there is no
//! preloading, caching belongs to [`BufferedStorageManager`](super::BufferedStorageManager).
//!
//! Deleted pages are chained into a free list whose head lives in the
//! header, so ids are reused across reopen.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{PageId, StorageManager};
use crate::constants::{DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE, STORAGE_MAGIC, STORAGE_VERSION};
use crate::errors::{SpatialError, SpatialResult};

/// Bytes a data slot spends on its own framing (variant tag, checksum, length)
const SLOT_OVERHEAD: usize = 16;

/// Options for [`DiskStorageManager::create_with_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStorageConfig {
    page_size: usize,
    checksums: bool,
}

impl DiskStorageConfig {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            checksums: true,
        }
    }

    /// Sets the on-disk page size in bytes.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Enables or disables CRC32 checksums on data pages.
    pub fn with_checksums(mut self, checksums: bool) -> Self {
        self.checksums = checksums;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn checksums(&self) -> bool {
        self.checksums
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.page_size < MIN_PAGE_SIZE {
            return Err(SpatialError::InvalidConfig(format!(
                "page size must be at least {} bytes, got {}",
                MIN_PAGE_SIZE, self.page_size
            )));
        }
        if self.page_size > u32::MAX as usize {
            return Err(SpatialError::InvalidConfig(format!(
                "page size {} does not fit the file header",
                self.page_size
            )));
        }
        Ok(())
    }
}

impl Default for DiskStorageConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Header stored in page 0 of the storage file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StorageHeader {
    magic: u32,
    version: u32,
    page_size: u32,
    next_page_id: PageId,
    free_list_head: PageId,
    page_count: u64,
    checksum_enabled: bool,
}

impl StorageHeader {
    fn new(config: &DiskStorageConfig) -> Self {
        Self {
            magic: STORAGE_MAGIC,
            version: STORAGE_VERSION,
            page_size: config.page_size as u32,
            next_page_id: 1,
            free_list_head: 0,
            page_count: 0,
            checksum_enabled: config.checksums,
        }
    }

    fn validate(&self) -> SpatialResult<()> {
        if self.magic != STORAGE_MAGIC {
            return Err(SpatialError::Corrupted(
                "Invalid file format (bad magic)".into(),
            ));
        }
        if self.version != STORAGE_VERSION {
            return Err(SpatialError::Corrupted(format!(
                "Unsupported file format version {}",
                self.version
            )));
        }
        if (self.page_size as usize) < MIN_PAGE_SIZE {
            return Err(SpatialError::Corrupted(format!(
                "Invalid page size {}",
                self.page_size
            )));
        }
        Ok(())
    }
}

/// Content of a non-header page
#[derive(Debug, Clone, Serialize, Deserialize)]
enum PageSlot {
    /// A live byte array. `checksum` is zero when checksums are disabled.
    Data { checksum: u32, bytes: Vec<u8> },
    /// A released page, linked into the free list (0 = end of chain)
    Free { next_free: PageId },
}

/// Stores byte arrays in fixed-size pages of a single file.
pub struct DiskStorageManager {
    inner: Mutex<DiskFile>,
}

struct DiskFile {
    file: File,
    path: PathBuf,
    header: StorageHeader,
}

impl DiskStorageManager {
    /// Create a new storage file with default settings, truncating any
    /// existing file at `path`.
    pub fn create(path: impl AsRef<Path>) -> SpatialResult<Self> {
        Self::create_with_config(path, DiskStorageConfig::default())
    }

    pub fn create_with_config(
        path: impl AsRef<Path>,
        config: DiskStorageConfig,
    ) -> SpatialResult<Self> {
        config.validate()?;
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut disk = DiskFile {
            file,
            path: path.to_path_buf(),
            header: StorageHeader::new(&config),
        };
        disk.write_header()?;
        disk.file.sync_all()?;

        log::debug!(
            "Created storage file at {:?} with {} byte pages",
            path,
            config.page_size
        );
        Ok(Self {
            inner: Mutex::new(disk),
        })
    }

    /// Open an existing storage file. Only the header is read.
    pub fn open(path: impl AsRef<Path>) -> SpatialResult<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut prefix = vec![0u8; MIN_PAGE_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut prefix)?;
        let (header, _): (StorageHeader, usize) =
            bincode::serde::decode_from_slice(&prefix, bincode::config::legacy())?;
        header.validate()?;

        log::debug!(
            "Opened storage file at {:?} ({} live pages)",
            path,
            header.page_count
        );
        Ok(Self {
            inner: Mutex::new(DiskFile {
                file,
                path: path.to_path_buf(),
                header,
            }),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    pub fn page_size(&self) -> usize {
        self.inner.lock().header.page_size as usize
    }

    /// Largest byte array a single page can hold.
    pub fn page_capacity(&self) -> usize {
        self.page_size() - SLOT_OVERHEAD
    }
}

impl DiskFile {
    fn page_size(&self) -> usize {
        self.header.page_size as usize
    }

    fn write_header(&mut self) -> SpatialResult<()> {
        let mut bytes = bincode::serde::encode_to_vec(&self.header, bincode::config::legacy())?;
        bytes.resize(self.page_size(), 0);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    /// Read a SINGLE page from disk (one seek + one read).
    fn read_slot(&mut self, page: PageId) -> SpatialResult<PageSlot> {
        if page == 0 || page >= self.header.next_page_id {
            return Err(SpatialError::InvalidPage(page));
        }

        let offset = page * self.page_size() as u64;
        let mut buffer = vec![0u8; self.page_size()];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buffer)?;

        let (slot, _): (PageSlot, usize) =
            bincode::serde::decode_from_slice(&buffer, bincode::config::legacy())?;
        Ok(slot)
    }

    fn write_slot(&mut self, page: PageId, slot: &PageSlot) -> SpatialResult<()> {
        if page == 0 {
            return Err(SpatialError::InvalidPage(page));
        }

        let mut bytes = bincode::serde::encode_to_vec(slot, bincode::config::legacy())?;
        if bytes.len() > self.page_size() {
            return Err(SpatialError::PageOverflow {
                size: bytes.len() - SLOT_OVERHEAD,
                capacity: self.page_size() - SLOT_OVERHEAD,
            });
        }
        bytes.resize(self.page_size(), 0);

        let offset = page * self.page_size() as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    fn allocate_page(&mut self) -> SpatialResult<PageId> {
        let head = self.header.free_list_head;
        if head != 0 {
            match self.read_slot(head)? {
                PageSlot::Free { next_free } => {
                    self.header.free_list_head = next_free;
                    return Ok(head);
                }
                PageSlot::Data { .. } => {
                    return Err(SpatialError::Corrupted(format!(
                        "Free list head {} points at a live page",
                        head
                    )));
                }
            }
        }

        let page = self.header.next_page_id;
        self.header.next_page_id += 1;
        Ok(page)
    }

    fn data_slot(&self, data: &[u8]) -> PageSlot {
        let checksum = if self.header.checksum_enabled {
            crc32(data)
        } else {
            0
        };
        PageSlot::Data {
            checksum,
            bytes: data.to_vec(),
        }
    }
}

impl StorageManager for DiskStorageManager {
    fn load_byte_array(&self, page: PageId) -> SpatialResult<Vec<u8>> {
        let mut disk = self.inner.lock();
        match disk.read_slot(page)? {
            PageSlot::Data { checksum, bytes } => {
                if disk.header.checksum_enabled {
                    let expected = crc32(&bytes);
                    if checksum != expected {
                        return Err(SpatialError::Corrupted(format!(
                            "Page {} checksum mismatch (expected: {:x}, got: {:x})",
                            page, expected, checksum
                        )));
                    }
                }
                Ok(bytes)
            }
            PageSlot::Free { .. } => Err(SpatialError::InvalidPage(page)),
        }
    }

    fn store_byte_array(&self, page: Option<PageId>, data: &[u8]) -> SpatialResult<PageId> {
        let mut disk = self.inner.lock();
        let capacity = disk.page_size() - SLOT_OVERHEAD;
        if data.len() > capacity {
            return Err(SpatialError::PageOverflow {
                size: data.len(),
                capacity,
            });
        }

        let slot = disk.data_slot(data);
        match page {
            Some(page) => {
                if let PageSlot::Free { .. } = disk.read_slot(page)? {
                    return Err(SpatialError::InvalidPage(page));
                }
                disk.write_slot(page, &slot)?;
                Ok(page)
            }
            None => {
                let page = disk.allocate_page()?;
                disk.write_slot(page, &slot)?;
                disk.header.page_count += 1;
                Ok(page)
            }
        }
    }

    fn delete_byte_array(&self, page: PageId) -> SpatialResult<()> {
        let mut disk = self.inner.lock();
        if let PageSlot::Free { .. } = disk.read_slot(page)? {
            return Err(SpatialError::InvalidPage(page));
        }

        let next_free = disk.header.free_list_head;
        disk.write_slot(page, &PageSlot::Free { next_free })?;
        disk.header.free_list_head = page;
        disk.header.page_count = disk.header.page_count.saturating_sub(1);
        Ok(())
    }

    fn flush(&self) -> SpatialResult<()> {
        let mut disk = self.inner.lock();
        disk.write_header()?;
        disk.file.sync_all()?;
        Ok(())
    }

    fn page_count(&self) -> u64 {
        self.inner.lock().header.page_count
    }

    fn max_payload(&self) -> Option<usize> {
        Some(self.page_capacity())
    }
}

impl Drop for DiskStorageManager {
    fn drop(&mut self) {
        // Best effort, the header is otherwise only written on flush
        if let Err(e) = self.flush() {
            log::warn!("Failed to flush storage file on drop: {}", e);
        }
    }
}

/// CRC32-MPEG2 checksum of a page payload
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    const POLY: u32 = 0x04C11DB7;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFFFFFF
}
