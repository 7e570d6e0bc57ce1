//! Per-view model cache. One entry per view index; each entry remembers the path it was
//! filled from so a hit costs one comparison.

use super::{Asset, AssetError, AssetLoader, AssetSource, BufferPool, LoadPoll, PendingLoad};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
struct SlotEntry {
    path: Option<PathBuf>,
    asset: Option<Asset>,
    pending: Option<PendingLoad>,
    error: Option<AssetError>,
}

impl SlotEntry {
    fn release(&mut self, pool: &mut BufferPool) {
        if let Some(asset) = self.asset.take() {
            let id = asset.id();
            let released = asset.dispose(pool);
            log::debug!("Disposed asset {} ({} buffers)", id, released);
        }
        // A dropped receiver makes the worker's late result go nowhere.
        self.pending = None;
        self.error = None;
        self.path = None;
    }
}

#[derive(Debug)]
pub struct SlotCache<S: AssetSource = AssetLoader> {
    source: S,
    pool: BufferPool,
    slots: Vec<SlotEntry>,
}

impl SlotCache<AssetLoader> {
    pub fn new() -> Self {
        Self::with_source(AssetLoader::new())
    }
}

impl Default for SlotCache<AssetLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: AssetSource> SlotCache<S> {
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            pool: BufferPool::new(),
            slots: Vec::new(),
        }
    }

    /// Returns the asset shown by `index` for `path`, starting a load on a miss.
    ///
    /// A slot whose path changes loses its previous asset before the new load is issued, so it
    /// is empty (never half-swapped) until the new asset arrives through [`SlotCache::poll`].
    pub fn ensure(&mut self, index: usize, path: &Path) -> Option<&Asset> {
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, SlotEntry::default);
        }
        let entry = &mut self.slots[index];

        if entry.path.as_deref() != Some(path) {
            entry.release(&mut self.pool);
            log::info!("Loading {} into view {}", path.display(), index);
            entry.path = Some(path.to_path_buf());
            entry.pending = Some(self.source.submit(index, path));
            Self::poll_entry(index, entry, &mut self.pool);
        } else if entry.asset.is_some() {
            log::trace!("Cache hit for view {}: {}", index, path.display());
        }

        self.slots[index].asset.as_ref()
    }

    /// Installs finished loads. Returns the number of slots whose load resolved.
    pub fn poll(&mut self) -> usize {
        let mut resolved = 0;
        for (index, entry) in self.slots.iter_mut().enumerate() {
            if Self::poll_entry(index, entry, &mut self.pool) {
                resolved += 1;
            }
        }
        resolved
    }

    fn poll_entry(index: usize, entry: &mut SlotEntry, pool: &mut BufferPool) -> bool {
        let Some(pending) = entry.pending.as_mut() else {
            return false;
        };
        let result = match pending.poll() {
            LoadPoll::Pending => return false,
            LoadPoll::Complete(result) => result,
        };
        let requested = pending.path().to_path_buf();
        entry.pending = None;

        if entry.path.as_deref() != Some(requested.as_path()) {
            log::debug!(
                "Discarding stale load of {} for view {}",
                requested.display(),
                index
            );
            return true;
        }

        match result {
            Ok(parsed) => {
                let asset = Asset::upload(parsed, pool);
                log::info!(
                    "View {} now shows {} (asset {}, {} meshes, {} triangles)",
                    index,
                    requested.display(),
                    asset.id(),
                    asset.mesh_count(),
                    asset.triangle_count()
                );
                if let Some(previous) = entry.asset.replace(asset) {
                    previous.dispose(pool);
                }
                entry.error = None;
            }
            Err(err) => {
                match &err {
                    AssetError::UnsupportedFormat { .. } => log::error!("View {}: {}", index, err),
                    _ => log::warn!("View {}: {}", index, err),
                }
                if let Some(previous) = entry.asset.take() {
                    previous.dispose(pool);
                }
                entry.error = Some(err);
            }
        }
        true
    }

    /// Drops every slot at or beyond `count`, disposing what they hold.
    pub fn truncate(&mut self, count: usize) {
        if self.slots.len() <= count {
            return;
        }
        for entry in &mut self.slots[count..] {
            entry.release(&mut self.pool);
        }
        log::debug!(
            "Dropped {} slots; {} buffers live ({} bytes), {} released",
            self.slots.len() - count,
            self.pool.live_count(),
            self.pool.live_bytes(),
            self.pool.released_count()
        );
        self.slots.truncate(count);
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn get(&self, index: usize) -> Option<&Asset> {
        self.slots.get(index)?.asset.as_ref()
    }

    pub fn error(&self, index: usize) -> Option<&AssetError> {
        self.slots.get(index)?.error.as_ref()
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.slots.get(index)?.path.as_deref()
    }

    pub fn is_loading(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|entry| entry.pending.is_some())
    }

    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|entry| entry.pending.is_some()).count()
    }

    #[cfg(test)]
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: AssetSource> Drop for SlotCache<S> {
    fn drop(&mut self) {
        self.clear();
    }
}
