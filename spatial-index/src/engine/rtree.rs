//! Paged R-Tree engine.
//!
//! Every node lives in its own page of the injected storage manager and is
//! loaded on demand; the engine keeps nothing but the [`TreeHeader`] in
//! memory. Caching, if wanted, is the storage manager's job (see
//! [`BufferedStorageManager`](crate::storage::BufferedStorageManager)).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::ControlFlow;
use std::sync::Arc;

use super::node::{split_half, ChildRef, LeafEntry, Node, TreeHeader};
use super::{EngineData, EngineStats, IntegrityReport, SpatialEngine, Visitor};
use crate::bounding_box::BoundingBox;
use crate::config::RTreeConfig;
use crate::constants::DIMENSIONS;
use crate::entry::EntryId;
use crate::errors::{SpatialError, SpatialResult};
use crate::storage::{PageId, StorageManager};

/// R-Tree over a [`StorageManager`].
pub struct RTree {
    storage: Arc<dyn StorageManager>,
    header_page: PageId,
    header: TreeHeader,
    config: RTreeConfig,
}

/// Outcome of removing an entry from a subtree
enum Removal {
    NotFound,
    /// The subtree still has entries and now has this bounding box
    Updated(BoundingBox),
    /// The subtree root is empty and must be released by its parent
    Emptied,
}

/// Pages an insert has changed so far, for undoing it if a later write
/// fails.
#[derive(Default)]
struct Journal {
    /// Contents of each node before its first overwrite
    overwritten: Vec<(PageId, Node)>,
    allocated: Vec<PageId>,
}

impl RTree {
    /// Create an empty tree. Only the header page is written.
    pub fn create(storage: Arc<dyn StorageManager>, config: RTreeConfig) -> SpatialResult<Self> {
        config.validate()?;
        check_page_fit(&config, storage.as_ref())?;
        let header = TreeHeader::new(&config);
        let header_page = storage.store_byte_array(None, &header.encode()?)?;

        log::debug!(
            "Created R-Tree with header page {} (leaf capacity {}, index capacity {})",
            header_page,
            config.leaf_capacity(),
            config.index_capacity()
        );
        Ok(Self {
            storage,
            header_page,
            header,
            config,
        })
    }

    /// Open a tree previously created in `storage` and flushed.
    pub fn open(storage: Arc<dyn StorageManager>, header_page: PageId) -> SpatialResult<Self> {
        let header = TreeHeader::decode(&storage.load_byte_array(header_page)?)?;
        let config = header.config();
        config.validate()?;
        check_page_fit(&config, storage.as_ref())?;

        log::debug!(
            "Opened R-Tree at header page {} ({} entries, height {})",
            header_page,
            header.entry_count,
            header.height
        );
        Ok(Self {
            storage,
            header_page,
            header,
            config,
        })
    }

    /// Page holding the tree header. Pass it to [`RTree::open`] to reopen.
    pub fn header_page(&self) -> PageId {
        self.header_page
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    fn read_node(&self, page_id: PageId) -> SpatialResult<Node> {
        Node::decode(&self.storage.load_byte_array(page_id)?)
    }

    fn write_node(&self, page_id: PageId, node: &Node) -> SpatialResult<()> {
        self.storage.store_byte_array(Some(page_id), &node.encode()?)?;
        Ok(())
    }

    fn allocate_node(&mut self, node: &Node, journal: &mut Journal) -> SpatialResult<PageId> {
        let page_id = self.storage.store_byte_array(None, &node.encode()?)?;
        journal.allocated.push(page_id);
        self.header.node_count += 1;
        Ok(page_id)
    }

    fn free_node(&mut self, page_id: PageId) -> SpatialResult<()> {
        self.storage.delete_byte_array(page_id)?;
        self.header.node_count = self.header.node_count.saturating_sub(1);
        Ok(())
    }

    /// Choose the best leaf for `bbox`, recording (page, child index) for
    /// every internal node on the way down.
    fn choose_leaf(
        &self,
        root: PageId,
        bbox: &BoundingBox,
        path: &mut Vec<(PageId, usize)>,
    ) -> SpatialResult<(PageId, Node)> {
        let mut page_id = root;
        loop {
            let node = self.read_node(page_id)?;
            let best = match &node {
                Node::Leaf { .. } => None,
                Node::Internal { children, .. } => {
                    let best = choose_subtree(children, bbox).ok_or_else(|| {
                        SpatialError::InvalidOperation(format!(
                            "Internal node {} has no children",
                            page_id
                        ))
                    })?;
                    Some(best)
                }
            };

            match best {
                None => return Ok((page_id, node)),
                Some((best_idx, child_page)) => {
                    path.push((page_id, best_idx));
                    page_id = child_page;
                }
            }
        }
    }

    /// Walk the insertion path bottom-up, fixing child boxes and adding the
    /// sibling produced by a split below. Grows a new root if the split
    /// reaches the top.
    fn adjust_path(
        &mut self,
        root: PageId,
        path: &[(PageId, usize)],
        mut child_bbox: BoundingBox,
        mut split: Option<(PageId, BoundingBox)>,
        journal: &mut Journal,
    ) -> SpatialResult<()> {
        for &(parent_id, child_idx) in path.iter().rev() {
            let mut node = self.read_node(parent_id)?;
            journal.overwritten.push((parent_id, node.clone()));
            let (children, level) = match &mut node {
                Node::Internal { children, level } => (children, *level),
                Node::Leaf { .. } => {
                    return Err(SpatialError::InvalidOperation(format!(
                        "Expected internal node at page {}",
                        parent_id
                    )))
                }
            };

            children[child_idx].bbox = child_bbox;
            if let Some((page_id, bbox)) = split.take() {
                children.push(ChildRef { bbox, page_id });

                if children.len() > self.config.index_capacity() {
                    let (remaining, moved) = split_half(std::mem::take(children), |c| &c.bbox);
                    *children = remaining;
                    let sibling = Node::Internal {
                        children: moved,
                        level,
                    };
                    let sibling_bbox = sibling.compute_bbox();
                    let sibling_page = self.allocate_node(&sibling, journal)?;
                    split = Some((sibling_page, sibling_bbox));
                }
            }

            child_bbox = node.compute_bbox();
            self.write_node(parent_id, &node)?;
        }

        if let Some((page_id, bbox)) = split {
            let new_root = Node::Internal {
                children: vec![
                    ChildRef {
                        bbox: child_bbox,
                        page_id: root,
                    },
                    ChildRef { bbox, page_id },
                ],
                level: self.header.height,
            };
            let new_root_page = self.allocate_node(&new_root, journal)?;
            self.header.root_page = Some(new_root_page);
            self.header.height += 1;
            log::debug!(
                "R-Tree root split, new root {} at height {}",
                new_root_page,
                self.header.height
            );
        }
        Ok(())
    }

    /// Insert without cleaning up on failure. Every page changed on the
    /// way is recorded in `journal`.
    fn insert_entry(&mut self, entry: LeafEntry, journal: &mut Journal) -> SpatialResult<()> {
        let root = match self.header.root_page {
            Some(root) => root,
            None => {
                let bbox = entry.bbox;
                let leaf = Node::Leaf {
                    entries: vec![entry],
                };
                let root = self.allocate_node(&leaf, journal)?;
                self.header.root_page = Some(root);
                self.header.height = 1;
                self.header.entry_count = 1;
                log::trace!("R-Tree root leaf {} created for {}", root, bbox);
                return Ok(());
            }
        };

        let mut path = Vec::new();
        let (leaf_id, mut leaf) = self.choose_leaf(root, &entry.bbox, &mut path)?;
        journal.overwritten.push((leaf_id, leaf.clone()));

        let mut split = None;
        if let Node::Leaf { entries } = &mut leaf {
            entries.push(entry);
            if entries.len() > self.config.leaf_capacity() {
                let (remaining, moved) = split_half(std::mem::take(entries), |e| &e.bbox);
                *entries = remaining;
                let sibling = Node::Leaf { entries: moved };
                let sibling_bbox = sibling.compute_bbox();
                let sibling_page = self.allocate_node(&sibling, journal)?;
                split = Some((sibling_page, sibling_bbox));
            }
        }
        self.write_node(leaf_id, &leaf)?;

        self.adjust_path(root, &path, leaf.compute_bbox(), split, journal)?;
        self.header.entry_count += 1;
        Ok(())
    }

    /// Undo a failed insert: put back every overwritten node, release the
    /// pages it allocated and restore the header.
    fn roll_back(&mut self, journal: Journal, header: TreeHeader) {
        for (page_id, node) in journal.overwritten.iter().rev() {
            if let Err(e) = self.write_node(*page_id, node) {
                log::error!("Failed to restore page {} after a failed insert: {}", page_id, e);
            }
        }
        for page_id in journal.allocated {
            if let Err(e) = self.storage.delete_byte_array(page_id) {
                log::error!("Failed to release page {} after a failed insert: {}", page_id, e);
            }
        }
        self.header = header;
    }

    fn remove_recursive(
        &mut self,
        page_id: PageId,
        mbr: &BoundingBox,
        id: EntryId,
    ) -> SpatialResult<Removal> {
        let mut node = self.read_node(page_id)?;

        match &mut node {
            Node::Leaf { entries } => {
                let position = entries.iter().position(|e| e.id == id && e.bbox == *mbr);
                match position {
                    None => Ok(Removal::NotFound),
                    Some(i) => {
                        entries.remove(i);
                        if entries.is_empty() {
                            return Ok(Removal::Emptied);
                        }
                        self.write_node(page_id, &node)?;
                        Ok(Removal::Updated(node.compute_bbox()))
                    }
                }
            }
            Node::Internal { children, .. } => {
                for i in 0..children.len() {
                    // The entry box lies within every ancestor's box
                    if !children[i].bbox.contains(mbr) {
                        continue;
                    }

                    match self.remove_recursive(children[i].page_id, mbr, id)? {
                        Removal::NotFound => continue,
                        Removal::Updated(bbox) => {
                            children[i].bbox = bbox;
                        }
                        Removal::Emptied => {
                            let child = children.remove(i);
                            self.free_node(child.page_id)?;
                            if children.is_empty() {
                                return Ok(Removal::Emptied);
                            }
                        }
                    }
                    self.write_node(page_id, &node)?;
                    return Ok(Removal::Updated(node.compute_bbox()));
                }
                Ok(Removal::NotFound)
            }
        }
    }

    /// Replace an internal root with a single child by that child.
    fn collapse_root(&mut self) -> SpatialResult<()> {
        while let Some(old_root) = self.header.root_page {
            let only_child = match self.read_node(old_root)? {
                Node::Internal { children, .. } if children.len() == 1 => children[0].page_id,
                _ => break,
            };
            self.header.root_page = Some(only_child);
            self.header.height = self.header.height.saturating_sub(1);
            self.free_node(old_root)?;
        }
        Ok(())
    }

    /// Depth-first search. Descends into children for which `descend`
    /// holds and reports leaf entries for which `accept` holds.
    fn search<D, A>(
        &self,
        page_id: PageId,
        descend: &D,
        accept: &A,
        visitor: &mut dyn Visitor,
    ) -> SpatialResult<ControlFlow<()>>
    where
        D: Fn(&BoundingBox) -> bool,
        A: Fn(&BoundingBox) -> bool,
    {
        match self.read_node(page_id)? {
            Node::Leaf { entries } => {
                for entry in entries.iter().filter(|e| accept(&e.bbox)) {
                    let data = EngineData {
                        id: entry.id,
                        mbr: entry.bbox,
                        mindist: None,
                    };
                    if visitor.visit_data(&data)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
            }
            Node::Internal { children, .. } => {
                for child in children.iter().filter(|c| descend(&c.bbox)) {
                    if self
                        .search(child.page_id, descend, accept, visitor)?
                        .is_break()
                    {
                        return Ok(ControlFlow::Break(()));
                    }
                }
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn check_subtree(
        &self,
        page_id: PageId,
        depth: u32,
        expected_bbox: Option<&BoundingBox>,
        report: &mut IntegrityReport,
    ) -> SpatialResult<()> {
        let node = match self.read_node(page_id) {
            Ok(node) => node,
            Err(e) => {
                report.fail(format!("Page {}: {}", page_id, e));
                return Ok(());
            }
        };
        report.nodes_checked += 1;

        if let Some(expected) = expected_bbox {
            if node.compute_bbox() != *expected {
                report.fail(format!(
                    "Page {}: parent box {} does not match node box {}",
                    page_id,
                    expected,
                    node.compute_bbox()
                ));
            }
        }
        if node.is_empty() && depth > 1 {
            report.fail(format!("Page {}: empty non-root node", page_id));
        }

        match &node {
            Node::Leaf { entries } => {
                if depth != self.header.height {
                    report.fail(format!(
                        "Page {}: leaf at depth {} in tree of height {}",
                        page_id, depth, self.header.height
                    ));
                }
                if entries.len() > self.config.leaf_capacity() {
                    report.fail(format!(
                        "Page {}: {} entries exceed leaf capacity {}",
                        page_id,
                        entries.len(),
                        self.config.leaf_capacity()
                    ));
                }
                report.entries_found += entries.len() as u64;
            }
            Node::Internal { children, level } => {
                if self.header.height.checked_sub(depth) != Some(*level) {
                    report.fail(format!(
                        "Page {}: level {} does not match depth {}",
                        page_id, level, depth
                    ));
                }
                if children.len() > self.config.index_capacity() {
                    report.fail(format!(
                        "Page {}: {} children exceed index capacity {}",
                        page_id,
                        children.len(),
                        self.config.index_capacity()
                    ));
                }
                for child in children {
                    self.check_subtree(child.page_id, depth + 1, Some(&child.bbox), report)?;
                }
            }
        }
        Ok(())
    }
}

/// Child with minimum enlargement, then minimum area
fn choose_subtree(children: &[ChildRef], bbox: &BoundingBox) -> Option<(usize, PageId)> {
    let mut best: Option<(usize, f64, f64)> = None;
    for (i, child) in children.iter().enumerate() {
        let enlargement = child.bbox.enlargement(bbox);
        let area = child.bbox.area();
        let better = match best {
            None => true,
            Some((_, best_enlargement, best_area)) => {
                enlargement < best_enlargement
                    || (enlargement == best_enlargement && area < best_area)
            }
        };
        if better {
            best = Some((i, enlargement, area));
        }
    }
    best.map(|(i, _, _)| (i, children[i].page_id))
}

/// Reject capacities whose fullest node would not fit in one page of
/// `storage`. Node encodings have a fixed size per entry, so checking one
/// full leaf and one full internal node covers every node.
fn check_page_fit(config: &RTreeConfig, storage: &dyn StorageManager) -> SpatialResult<()> {
    let max_payload = match storage.max_payload() {
        Some(max_payload) => max_payload,
        None => return Ok(()),
    };

    let bbox = BoundingBox::empty();
    let leaf = Node::Leaf {
        entries: vec![LeafEntry { bbox, id: 0 }; config.leaf_capacity()],
    };
    let internal = Node::Internal {
        children: vec![ChildRef { bbox, page_id: 0 }; config.index_capacity()],
        level: 0,
    };

    for (kind, capacity, node) in [
        ("leaf", config.leaf_capacity(), leaf),
        ("index", config.index_capacity(), internal),
    ] {
        let size = node.encode()?.len();
        if size > max_payload {
            return Err(SpatialError::InvalidConfig(format!(
                "A full node at {} capacity {} needs {} bytes but a page holds {}",
                kind, capacity, size, max_payload
            )));
        }
    }
    Ok(())
}

/// A node or entry waiting in the nearest-neighbor queue
enum Pending {
    Node(PageId),
    Entry(LeafEntry),
}

struct Queued {
    distance: f64,
    seq: u64,
    item: Pending,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Reversed so the BinaryHeap pops the nearest item first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl SpatialEngine for RTree {
    fn insert_data(&mut self, mbr: &BoundingBox, id: EntryId) -> SpatialResult<()> {
        let header = self.header.clone();
        let mut journal = Journal::default();
        match self.insert_entry(LeafEntry { bbox: *mbr, id }, &mut journal) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("Insert of entry {} failed, rolling back: {}", id, e);
                self.roll_back(journal, header);
                Err(e)
            }
        }
    }

    fn delete_data(&mut self, mbr: &BoundingBox, id: EntryId) -> SpatialResult<bool> {
        let root = match self.header.root_page {
            Some(root) => root,
            None => return Ok(false),
        };

        match self.remove_recursive(root, mbr, id)? {
            Removal::NotFound => return Ok(false),
            Removal::Updated(_) => self.collapse_root()?,
            Removal::Emptied => {
                self.free_node(root)?;
                self.header.root_page = None;
                self.header.height = 0;
            }
        }
        self.header.entry_count = self.header.entry_count.saturating_sub(1);
        Ok(true)
    }

    fn contains_what_query(
        &self,
        query: &BoundingBox,
        visitor: &mut dyn Visitor,
    ) -> SpatialResult<()> {
        let root = match self.header.root_page {
            Some(root) => root,
            None => return Ok(()),
        };
        // A contained entry can sit in a child that only partially
        // intersects the query
        self.search(
            root,
            &|b: &BoundingBox| b.intersects(query),
            &|b: &BoundingBox| query.contains(b),
            visitor,
        )
        .map(|_flow| ())
    }

    fn intersects_with_query(
        &self,
        query: &BoundingBox,
        visitor: &mut dyn Visitor,
    ) -> SpatialResult<()> {
        let root = match self.header.root_page {
            Some(root) => root,
            None => return Ok(()),
        };
        self.search(
            root,
            &|b: &BoundingBox| b.intersects(query),
            &|b: &BoundingBox| b.intersects(query),
            visitor,
        )
        .map(|_flow| ())
    }

    fn nearest_neighbor_query(
        &self,
        query: &BoundingBox,
        visitor: &mut dyn Visitor,
    ) -> SpatialResult<()> {
        let root = match self.header.root_page {
            Some(root) => root,
            None => return Ok(()),
        };

        let mut seq = 0u64;
        let mut queue = BinaryHeap::new();
        queue.push(Queued {
            distance: 0.0,
            seq,
            item: Pending::Node(root),
        });

        while let Some(Queued { distance, item, .. }) = queue.pop() {
            match item {
                Pending::Entry(entry) => {
                    let data = EngineData {
                        id: entry.id,
                        mbr: entry.bbox,
                        mindist: Some(distance),
                    };
                    if visitor.visit_data(&data)?.is_break() {
                        return Ok(());
                    }
                }
                Pending::Node(page_id) => match self.read_node(page_id)? {
                    Node::Leaf { entries } => {
                        for entry in entries {
                            seq += 1;
                            queue.push(Queued {
                                distance: entry.bbox.min_distance(query),
                                seq,
                                item: Pending::Entry(entry),
                            });
                        }
                    }
                    Node::Internal { children, .. } => {
                        for child in children {
                            seq += 1;
                            queue.push(Queued {
                                distance: child.bbox.min_distance(query),
                                seq,
                                item: Pending::Node(child.page_id),
                            });
                        }
                    }
                },
            }
        }
        Ok(())
    }

    fn query_all(&self, visitor: &mut dyn Visitor) -> SpatialResult<()> {
        let root = match self.header.root_page {
            Some(root) => root,
            None => return Ok(()),
        };
        self.search(
            root,
            &|_: &BoundingBox| true,
            &|_: &BoundingBox| true,
            visitor,
        )
        .map(|_flow| ())
    }

    fn size(&self) -> u64 {
        self.header.entry_count
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            entry_count: self.header.entry_count,
            height: self.header.height,
            node_count: self.header.node_count,
            leaf_capacity: self.config.leaf_capacity(),
            index_capacity: self.config.index_capacity(),
        }
    }

    fn check_integrity(&self) -> SpatialResult<IntegrityReport> {
        let mut report = IntegrityReport::new();

        let root = match self.header.root_page {
            Some(root) => root,
            None => {
                if self.header.entry_count != 0 || self.header.height != 0 {
                    report.fail(format!(
                        "Empty tree reports {} entries and height {}",
                        self.header.entry_count, self.header.height
                    ));
                }
                return Ok(report);
            }
        };

        self.check_subtree(root, 1, None, &mut report)?;

        if report.entries_found != self.header.entry_count {
            report.fail(format!(
                "Header counts {} entries but leaves hold {}",
                self.header.entry_count, report.entries_found
            ));
        }
        if report.nodes_checked != self.header.node_count {
            report.fail(format!(
                "Header counts {} nodes but {} are reachable",
                self.header.node_count, report.nodes_checked
            ));
        }
        Ok(report)
    }

    fn flush(&self) -> SpatialResult<()> {
        self.storage
            .store_byte_array(Some(self.header_page), &self.header.encode()?)?;
        self.storage.flush()
    }
}
