use std::collections::HashMap;

/// Handle to one device-side allocation. Not `Clone`: releasing it consumes the handle.
#[derive(Debug, PartialEq, Eq)]
pub struct GpuBuffer {
    id: u64,
}

impl GpuBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Book-keeping for every buffer uploaded on behalf of a loaded asset.
#[derive(Debug, Default)]
pub struct BufferPool {
    next_buffer_id: u64,
    next_asset_id: u64,
    live: HashMap<u64, usize>,
    released: u64,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, bytes: usize) -> GpuBuffer {
        self.next_buffer_id += 1;
        let id = self.next_buffer_id;
        self.live.insert(id, bytes);
        GpuBuffer { id }
    }

    pub fn release(&mut self, buffer: GpuBuffer) {
        if self.live.remove(&buffer.id()).is_some() {
            self.released += 1;
        } else {
            log::warn!("Released buffer {} that the pool does not track", buffer.id());
        }
    }

    pub fn next_asset_id(&mut self) -> u64 {
        self.next_asset_id += 1;
        self.next_asset_id
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.live.values().sum()
    }

    pub fn released_count(&self) -> u64 {
        self.released
    }
}
