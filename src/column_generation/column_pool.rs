use std::collections::BTreeMap;

use crate::domain::configuration::Configuration;
use crate::domain::id::ServiceId;

/// Append-only set of configurations of one service.
#[derive(Debug, Clone, Default)]
pub struct ColumnPool {
    columns: Vec<Configuration>,
}

impl ColumnPool {
    /// Adds the configuration unless a structurally equal one is already pooled.
    ///
    /// # Returns
    /// The per-service index assigned to the new column, `None` for a duplicate.
    pub fn insert(&mut self, configuration: Configuration) -> Option<usize> {
        if self.columns.contains(&configuration) {
            return None;
        }

        let index = self.columns.len();
        self.columns.push(configuration.with_index(index));
        Some(index)
    }

    pub fn get(&self, index: usize) -> Option<&Configuration> {
        self.columns.get(index)
    }

    pub fn columns(&self) -> &[Configuration] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Column pools of all services of a batch, ordered by service id.
#[derive(Debug, Clone, Default)]
pub struct ColumnPools {
    pools: BTreeMap<ServiceId, ColumnPool>,
}

impl ColumnPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, configuration: Configuration) -> Option<usize> {
        self.pools.entry(configuration.service()).or_default().insert(configuration)
    }

    pub fn pool(&self, service: ServiceId) -> Option<&ColumnPool> {
        self.pools.get(&service)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ServiceId, &ColumnPool)> {
        self.pools.iter().map(|(id, pool)| (*id, pool))
    }

    pub fn services(&self) -> impl Iterator<Item = ServiceId> + '_ {
        self.pools.keys().copied()
    }

    pub fn total_columns(&self) -> usize {
        self.pools.values().map(ColumnPool::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_columns() == 0
    }
}
