//! Name-to-index registry of the objects a service exposes.
//!
//! Objects listed in configuration get indices 1..=n in configuration order
//! and never move. Objects registered later go to a lock-protected list and
//! receive the next index never handed out before. Index 0 is reserved for
//! "resolve by name".

use std::sync::{Arc, RwLock};

use obsrpc_core::error::{ObsError, Result};

struct Entry<T> {
    name: String,
    index: u16,
    object: Arc<T>,
}

struct Late<T> {
    entries: Vec<Entry<T>>,
    next_index: u32,
}

/// Snapshot row for listings.
#[derive(Clone)]
pub struct Registered<T> {
    pub name: String,
    pub index: u16,
    pub object: Arc<T>,
}

pub struct ServiceRegistry<T> {
    fixed: Vec<Entry<T>>,
    late: RwLock<Late<T>>,
}

impl<T> ServiceRegistry<T> {
    /// Build from configuration order. Duplicate names are rejected.
    pub fn build<I, S>(objects: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
    {
        let mut fixed: Vec<Entry<T>> = Vec::new();
        for (name, object) in objects {
            let name = name.into();
            if fixed.iter().any(|e| e.name == name) {
                return Err(ObsError::AlreadyExists(name));
            }
            let index = u16::try_from(fixed.len() + 1)
                .map_err(|_| ObsError::InvalidArgument("more than 65535 objects".into()))?;
            fixed.push(Entry {
                name,
                index,
                object: Arc::new(object),
            });
        }
        let next_index = fixed.len() as u32 + 1;
        Ok(Self {
            fixed,
            late: RwLock::new(Late {
                entries: Vec::new(),
                next_index,
            }),
        })
    }

    /// First exact match in the configured table, then among late entries.
    pub fn index_by_name(&self, name: &str) -> Result<u16> {
        if let Some(e) = self.fixed.iter().find(|e| e.name == name) {
            return Ok(e.index);
        }
        let late = self.late.read().unwrap_or_else(|p| p.into_inner());
        late.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.index)
            .ok_or_else(|| ObsError::NotFound(name.to_string()))
    }

    /// 1-based lookup; `0` and unknown indices yield `None`.
    pub fn object_by_index(&self, index: u16) -> Option<Arc<T>> {
        if index == 0 {
            return None;
        }
        if let Some(e) = self.fixed.get(usize::from(index) - 1) {
            return Some(Arc::clone(&e.object));
        }
        let late = self.late.read().unwrap_or_else(|p| p.into_inner());
        late.entries
            .iter()
            .find(|e| e.index == index)
            .map(|e| Arc::clone(&e.object))
    }

    /// Add an object after startup and return its index.
    pub fn register_late(&self, name: impl Into<String>, object: T) -> Result<u16> {
        let name = name.into();
        if self.fixed.iter().any(|e| e.name == name) {
            return Err(ObsError::AlreadyExists(name));
        }
        let mut late = self.late.write().unwrap_or_else(|p| p.into_inner());
        if late.entries.iter().any(|e| e.name == name) {
            return Err(ObsError::AlreadyExists(name));
        }
        let index = u16::try_from(late.next_index)
            .map_err(|_| ObsError::InvalidArgument("object index space exhausted".into()))?;
        late.next_index += 1;
        tracing::info!(name = %name, index, "object registered");
        late.entries.push(Entry {
            name,
            index,
            object: Arc::new(object),
        });
        Ok(index)
    }

    pub fn len(&self) -> usize {
        let late = self.late.read().unwrap_or_else(|p| p.into_inner());
        self.fixed.len() + late.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All objects in index order.
    pub fn entries(&self) -> Vec<Registered<T>> {
        let late = self.late.read().unwrap_or_else(|p| p.into_inner());
        self.fixed
            .iter()
            .chain(late.entries.iter())
            .map(|e| Registered {
                name: e.name.clone(),
                index: e.index,
                object: Arc::clone(&e.object),
            })
            .collect()
    }
}
