// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Live instance registry.
//!
//! The `fmi2Component` handed to the host is a registry key, not an address:
//! a stale, freed or forged handle simply misses the lookup. Each instance sits
//! behind its own mutex so distinct handles can be stepped from different
//! threads without contending.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use gtdrive::fmi2::Fmi2Component;
use parking_lot::Mutex;

use crate::instance::Instance;

pub(crate) type SharedInstance = Arc<Mutex<Instance>>;

fn instances() -> &'static DashMap<usize, SharedInstance> {
    static INSTANCES: OnceLock<DashMap<usize, SharedInstance>> = OnceLock::new();
    INSTANCES.get_or_init(DashMap::new)
}

// Ids start at 1 so no handle is ever NULL; they are never reused.
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

pub(crate) fn insert(instance: Instance) -> Fmi2Component {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    instances().insert(id, Arc::new(Mutex::new(instance)));
    id as Fmi2Component
}

/// Look up a handle; the DashMap shard lock is released before returning.
pub(crate) fn get(handle: Fmi2Component) -> Option<SharedInstance> {
    if handle.is_null() {
        return None;
    }
    instances()
        .get(&(handle as usize))
        .map(|entry| Arc::clone(entry.value()))
}

pub(crate) fn remove(handle: Fmi2Component) -> Option<SharedInstance> {
    if handle.is_null() {
        return None;
    }
    instances().remove(&(handle as usize)).map(|(_, instance)| instance)
}

pub(crate) fn len() -> usize {
    instances().len()
}
