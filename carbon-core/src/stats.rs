use std::collections::HashMap;

use crate::store::Store;

/// Size summary of a [`Pool`](crate::Pool)
///
/// Sizes include expired entries that have not been swept yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of registered stores
    pub total_db: usize,
    /// Sum of all store sizes
    pub total_size: usize,
    /// Entry count per store name
    pub size_per_db: HashMap<String, usize>,
}

impl PoolStats {
    /// Builds the summary from a snapshot of registered stores
    pub(crate) fn collect<'a>(stores: impl IntoIterator<Item = &'a Store>) -> Self {
        let mut stats = PoolStats::default();

        for store in stores {
            let size = store.size();
            stats.total_db += 1;
            stats.total_size += size;
            stats.size_per_db.insert(store.name().to_string(), size);
        }

        stats
    }
}
