use std::sync::Arc;
use vsync_controller_core::{ObjectMapStore, ResourceId};

/// What was last written to a route's status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VsMetadata {
    pub vip: String,
    pub hostnames: Vec<String>,
}

/// Remembers the last status synced for each route so redundant writes can be skipped.
#[derive(Debug, Default)]
pub struct StatusCache {
    synced: ObjectMapStore<VsMetadata>,
}

// === impl StatusCache ===

impl StatusCache {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn save(&self, id: &ResourceId, metadata: VsMetadata) {
        tracing::debug!(%id, vip = %metadata.vip, "Saving synced status");
        self.synced.add_or_update(id.key(), metadata);
    }

    pub fn get(&self, id: &ResourceId) -> Option<VsMetadata> {
        self.synced.get(&id.key())
    }

    pub fn delete(&self, id: &ResourceId) {
        self.synced.delete(&id.key());
    }

    /// Returns true if `metadata` is exactly what was last synced for the route.
    pub fn is_synced(&self, id: &ResourceId, metadata: &VsMetadata) -> bool {
        self.get(id).as_ref() == Some(metadata)
    }
}
