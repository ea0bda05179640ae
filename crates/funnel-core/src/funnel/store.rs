//! In-memory document store.
//!
//! `DocumentStore` owns the funnel being edited. Every mutation builds a new
//! `Arc<Funnel>` and swaps it in; the previous value stays valid for whoever
//! still holds it (for example a save that is in flight). Only the pages and
//! blocks on the edited path are reallocated.
//!
//! Mutations are synchronous. On error the document is left untouched.

use super::model::{Block, Funnel, Page, PageDraft};
use super::patch::{BlockPatch, ConfigPatch, PagePatch, SettingsPatch};
use super::template::new_id;
use crate::error::{FunnelError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Side-channel notifications emitted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// A page and all of its blocks were removed.
    PageDeleted { page_id: String, index: usize },
    /// A block was removed from a page.
    BlockDeleted { page_id: String, block_id: String },
    /// The whole document was swapped (restore or remote adoption).
    Replaced { version: u64 },
}

/// Result of a page deletion.
#[derive(Debug, Clone)]
pub struct PageRemoval {
    pub funnel: Arc<Funnel>,
    pub removed: Arc<Page>,
    /// Index the page occupied before removal.
    pub index: usize,
}

/// Document captured at the moment a save begins.
#[derive(Debug, Clone)]
pub struct SaveSnapshot {
    /// Funnel stamped with the version this save will create.
    pub funnel: Arc<Funnel>,
    /// Dirty generation the snapshot corresponds to.
    pub generation: u64,
}

pub struct DocumentStore {
    current: Arc<Funnel>,
    /// Incremented on every successful mutation.
    generation: u64,
    /// Generation of the last persisted snapshot.
    saved_generation: u64,
    /// Highest version ever persisted for this funnel.
    persisted_version: u64,
    events: broadcast::Sender<DocumentEvent>,
}

impl DocumentStore {
    /// Takes ownership of a funnel. Page orders are normalized on entry.
    pub fn new(funnel: Funnel) -> Self {
        let (events, _) = broadcast::channel(64);
        let persisted_version = funnel.version;
        let mut funnel = funnel;
        renumber(&mut funnel.pages);

        Self {
            current: Arc::new(funnel),
            generation: 0,
            saved_generation: 0,
            persisted_version,
            events,
        }
    }

    /// Current funnel value.
    pub fn funnel(&self) -> Arc<Funnel> {
        Arc::clone(&self.current)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn persisted_version(&self) -> u64 {
        self.persisted_version
    }

    /// True when mutations happened after the last persisted snapshot.
    pub fn is_dirty(&self) -> bool {
        self.generation != self.saved_generation
    }

    /// Subscribes to side-channel notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }

    // ============================================================================
    // Page operations
    // ============================================================================

    /// Appends a page, or inserts it right after `after_id`.
    pub fn add_page(
        &mut self,
        after_id: Option<&str>,
        draft: PageDraft,
    ) -> Result<(Arc<Funnel>, Arc<Page>)> {
        let insert_at = match after_id {
            Some(id) => self.require_page_index(id)? + 1,
            None => self.current.pages.len(),
        };

        let page = Arc::new(Page {
            id: new_id(),
            name: draft.name,
            page_type: draft.page_type,
            order: insert_at,
            blocks: assign_block_ids(draft.blocks)?,
            settings: draft.settings,
        });

        let mut next = (*self.current).clone();
        next.pages.insert(insert_at, Arc::clone(&page));
        renumber(&mut next.pages);

        Ok((self.commit(next), page))
    }

    /// Merges `patch` into the page. An empty patch is a no-op that still
    /// requires the page to exist.
    pub fn update_page(&mut self, page_id: &str, patch: &PagePatch) -> Result<Arc<Funnel>> {
        let index = self.require_page_index(page_id)?;
        if patch.is_empty() {
            return Ok(self.funnel());
        }
        let page = patch.apply(&self.current.pages[index]);
        self.replace_page(index, page)
    }

    pub fn update_page_settings(
        &mut self,
        page_id: &str,
        settings: &SettingsPatch,
    ) -> Result<Arc<Funnel>> {
        let patch = PagePatch {
            settings: Some(settings.clone()),
            ..Default::default()
        };
        self.update_page(page_id, &patch)
    }

    /// Removes the page together with its blocks.
    pub fn delete_page(&mut self, page_id: &str) -> Result<PageRemoval> {
        let index = self.require_page_index(page_id)?;

        let mut next = (*self.current).clone();
        let removed = next.pages.remove(index);
        renumber(&mut next.pages);

        let funnel = self.commit(next);
        let _ = self.events.send(DocumentEvent::PageDeleted {
            page_id: page_id.to_string(),
            index,
        });

        Ok(PageRemoval {
            funnel,
            removed,
            index,
        })
    }

    /// Moves the page to `new_index`; indices past the end clamp to the last slot.
    pub fn move_page(&mut self, page_id: &str, new_index: usize) -> Result<Arc<Funnel>> {
        let from = self.require_page_index(page_id)?;
        let to = new_index.min(self.current.pages.len().saturating_sub(1));
        if from == to {
            return Ok(self.funnel());
        }

        let mut next = (*self.current).clone();
        let page = next.pages.remove(from);
        next.pages.insert(to, page);
        renumber(&mut next.pages);

        Ok(self.commit(next))
    }

    /// Deep-copies a page with fresh page and block ids, right after the source.
    pub fn duplicate_page(&mut self, page_id: &str) -> Result<(Arc<Funnel>, Arc<Page>)> {
        let index = self.require_page_index(page_id)?;
        let source = &self.current.pages[index];

        let copy = Arc::new(Page {
            id: new_id(),
            name: format!("{} (copy)", source.name),
            page_type: source.page_type,
            order: index + 1,
            blocks: source
                .blocks
                .iter()
                .map(|b| {
                    Arc::new(Block {
                        id: new_id(),
                        ..(**b).clone()
                    })
                })
                .collect(),
            settings: source.settings.clone(),
        });

        let mut next = (*self.current).clone();
        next.pages.insert(index + 1, Arc::clone(&copy));
        renumber(&mut next.pages);

        Ok((self.commit(next), copy))
    }

    // ============================================================================
    // Block operations
    // ============================================================================

    /// Appends a block to the page. The block id must be non-empty and unique
    /// within the page.
    pub fn add_block(&mut self, page_id: &str, block: Block) -> Result<Arc<Funnel>> {
        if block.id.trim().is_empty() {
            return Err(FunnelError::validation("block id must not be empty"));
        }
        let index = self.require_page_index(page_id)?;
        let page = &self.current.pages[index];
        if page.block(&block.id).is_some() {
            return Err(FunnelError::validation(format!(
                "block '{}' already exists on page '{}'",
                block.id, page_id
            )));
        }

        let mut next_page = (**page).clone();
        next_page.blocks.push(Arc::new(block));
        self.replace_page(index, next_page)
    }

    pub fn update_block(
        &mut self,
        page_id: &str,
        block_id: &str,
        patch: &BlockPatch,
    ) -> Result<Arc<Funnel>> {
        let (page_index, block_index) = self.require_block_index(page_id, block_id)?;
        let page = &self.current.pages[page_index];

        let mut next_page = (**page).clone();
        next_page.blocks[block_index] = Arc::new(patch.apply(&page.blocks[block_index]));
        self.replace_page(page_index, next_page)
    }

    pub fn delete_block(&mut self, page_id: &str, block_id: &str) -> Result<Arc<Funnel>> {
        let (page_index, block_index) = self.require_block_index(page_id, block_id)?;

        let mut next_page = (*self.current.pages[page_index]).clone();
        next_page.blocks.remove(block_index);
        let funnel = self.replace_page(page_index, next_page)?;

        let _ = self.events.send(DocumentEvent::BlockDeleted {
            page_id: page_id.to_string(),
            block_id: block_id.to_string(),
        });
        Ok(funnel)
    }

    /// Reorders the page's blocks. `ordered_ids` must be a permutation of the
    /// page's current block ids.
    pub fn reorder_blocks(&mut self, page_id: &str, ordered_ids: &[String]) -> Result<Arc<Funnel>> {
        let index = self.require_page_index(page_id)?;
        let page = &self.current.pages[index];

        let unique: HashSet<&str> = ordered_ids.iter().map(String::as_str).collect();
        if ordered_ids.len() != page.blocks.len() || unique.len() != ordered_ids.len() {
            return Err(FunnelError::validation(format!(
                "reorder of page '{}' must list each of its {} blocks exactly once",
                page_id,
                page.blocks.len()
            )));
        }

        let mut blocks = Vec::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            let block = page
                .block(id)
                .ok_or_else(|| FunnelError::not_found("block", id.clone()))?;
            blocks.push(Arc::clone(block));
        }

        let mut next_page = (**page).clone();
        next_page.blocks = blocks;
        self.replace_page(index, next_page)
    }

    /// Copies a block with a fresh id, right after the source.
    pub fn duplicate_block(
        &mut self,
        page_id: &str,
        block_id: &str,
    ) -> Result<(Arc<Funnel>, Arc<Block>)> {
        let (page_index, block_index) = self.require_block_index(page_id, block_id)?;
        let page = &self.current.pages[page_index];

        let copy = Arc::new(Block {
            id: new_id(),
            ..(*page.blocks[block_index]).clone()
        });

        let mut next_page = (**page).clone();
        next_page.blocks.insert(block_index + 1, Arc::clone(&copy));
        Ok((self.replace_page(page_index, next_page)?, copy))
    }

    // ============================================================================
    // Funnel-level operations
    // ============================================================================

    pub fn update_config(&mut self, patch: &ConfigPatch) -> Result<Arc<Funnel>> {
        let mut next = (*self.current).clone();
        next.config = patch.apply(&self.current.config);
        Ok(self.commit(next))
    }

    pub fn rename(&mut self, name: &str) -> Result<Arc<Funnel>> {
        if name.trim().is_empty() {
            return Err(FunnelError::validation("funnel name must not be empty"));
        }
        let mut next = (*self.current).clone();
        next.name = name.to_string();
        Ok(self.commit(next))
    }

    /// Replaces the document with a restored snapshot.
    ///
    /// The version field is reset to the latest persisted version so that the
    /// next save creates `latest + 1`. The document becomes dirty.
    pub fn restore(&mut self, snapshot: Funnel) -> Arc<Funnel> {
        let mut next = snapshot;
        next.id = self.current.id.clone();
        next.version = self.persisted_version;
        renumber(&mut next.pages);

        let funnel = self.commit(next);
        let _ = self.events.send(DocumentEvent::Replaced {
            version: self.persisted_version,
        });
        funnel
    }

    /// Adopts a funnel the remote store holds as authoritative. The document is
    /// considered clean afterwards.
    pub fn adopt_remote(&mut self, remote: Funnel) -> Arc<Funnel> {
        let mut next = remote;
        renumber(&mut next.pages);
        self.persisted_version = self.persisted_version.max(next.version);
        next.version = self.persisted_version;

        self.current = Arc::new(next);
        self.generation += 1;
        self.saved_generation = self.generation;

        let _ = self.events.send(DocumentEvent::Replaced {
            version: self.persisted_version,
        });
        self.funnel()
    }

    // ============================================================================
    // Save bookkeeping
    // ============================================================================

    /// Captures the document for a save. The snapshot carries the version the
    /// save will create.
    pub fn begin_save(&self, at: DateTime<Utc>) -> SaveSnapshot {
        SaveSnapshot {
            funnel: Arc::new(self.current.with_version(self.persisted_version + 1, at)),
            generation: self.generation,
        }
    }

    /// Records a successful save of `snapshot`.
    ///
    /// Mutations made while the save was running keep the document dirty.
    pub fn mark_persisted(&mut self, snapshot: &SaveSnapshot) {
        let version = snapshot.funnel.version;
        if version <= self.persisted_version {
            return;
        }
        self.persisted_version = version;
        self.saved_generation = self.saved_generation.max(snapshot.generation);

        let mut next = (*self.current).clone();
        next.version = version;
        if snapshot.generation == self.generation {
            next.last_modified = snapshot.funnel.last_modified;
        }
        self.current = Arc::new(next);
    }

    // ============================================================================
    // Internal
    // ============================================================================

    fn commit(&mut self, mut next: Funnel) -> Arc<Funnel> {
        next.last_modified = Utc::now();
        let next = Arc::new(next);
        self.current = Arc::clone(&next);
        self.generation += 1;
        next
    }

    fn replace_page(&mut self, index: usize, page: Page) -> Result<Arc<Funnel>> {
        let mut next = (*self.current).clone();
        next.pages[index] = Arc::new(page);
        Ok(self.commit(next))
    }

    fn require_page_index(&self, page_id: &str) -> Result<usize> {
        self.current
            .page_index(page_id)
            .ok_or_else(|| FunnelError::not_found("page", page_id))
    }

    fn require_block_index(&self, page_id: &str, block_id: &str) -> Result<(usize, usize)> {
        let page_index = self.require_page_index(page_id)?;
        let block_index = self.current.pages[page_index]
            .block_index(block_id)
            .ok_or_else(|| FunnelError::not_found("block", block_id))?;
        Ok((page_index, block_index))
    }
}

/// Rewrites `order` to match list positions. Pages already in place keep
/// their allocation.
fn renumber(pages: &mut [Arc<Page>]) {
    for (index, page) in pages.iter_mut().enumerate() {
        if page.order != index {
            let mut moved = (**page).clone();
            moved.order = index;
            *page = Arc::new(moved);
        }
    }
}

fn assign_block_ids(blocks: Vec<Block>) -> Result<Vec<Arc<Block>>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(blocks.len());
    for mut block in blocks {
        if block.id.trim().is_empty() {
            block.id = new_id();
        }
        if !seen.insert(block.id.clone()) {
            return Err(FunnelError::validation(format!(
                "duplicate block id '{}' in page draft",
                block.id
            )));
        }
        out.push(Arc::new(block));
    }
    Ok(out)
}
