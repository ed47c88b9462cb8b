// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::{cfg::enums::TransportKind, errors::NcError};

/// Where one endpoint listens. The sockets themselves belong to the
/// embedder; the registry only tracks the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    pub address: String,
    pub port: u16,
    pub transport: TransportKind,
}

/// One named endpoint. Settings mutate under the endpoint's own mutex while
/// the registry list is held for read.
#[derive(Debug)]
pub struct Endpoint {
    name: String,
    settings: Mutex<EndpointSettings>,
}

impl Endpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> EndpointSettings {
        self.lock_settings().clone()
    }

    fn lock_settings(&self) -> MutexGuard<'_, EndpointSettings> {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of server endpoints.
///
/// Add and remove take the list write lock; per-endpoint mutation takes the
/// read lock plus that endpoint's mutex, so updates on distinct endpoints
/// do not contend.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<Vec<Arc<Endpoint>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &self,
        name: &str,
        settings: EndpointSettings,
    ) -> Result<Arc<Endpoint>, NcError> {
        let mut list = self
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if list.iter().any(|e| e.name == name) {
            return Err(NcError::Internal(format!(
                "endpoint {name:?} already exists"
            )));
        }
        let endpoint = Arc::new(Endpoint {
            name: name.to_string(),
            settings: Mutex::new(settings),
        });
        list.push(Arc::clone(&endpoint));
        Ok(endpoint)
    }

    pub fn remove(&self, name: &str) -> Result<(), NcError> {
        let mut list = self
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = list.len();
        list.retain(|e| e.name != name);
        if list.len() == before {
            return Err(NcError::Internal(format!("unknown endpoint {name:?}")));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.name == name)
            .cloned()
    }

    /// Points an endpoint somewhere else without touching the list lock
    /// exclusively.
    pub fn update(
        &self,
        name: &str,
        settings: EndpointSettings,
    ) -> Result<(), NcError> {
        let list = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let endpoint = list
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| NcError::Internal(format!("unknown endpoint {name:?}")))?;
        *endpoint.lock_settings() = settings;
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
