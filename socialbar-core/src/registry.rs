//! Registry: one [`UserDataObserver`] per owner thread.
//!
//! The registry is an ordinary value owned by the application context. Each
//! thread that calls [`Registry::get_instance`] gets its own observer (and so
//! its own worker thread and session); the observer lives until that thread
//! calls [`Registry::release_instance`] or the registry is cleared or dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use dashmap::DashMap;
use parking_lot::Mutex;
use socialbar_session::SessionFactory;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::observer::UserDataObserver;

pub struct Registry {
    factory: Arc<dyn SessionFactory>,
    config: BridgeConfig,
    /// Owner thread → observer. Reads go straight to the map; inserts and
    /// removals take `write_lock`.
    instances: DashMap<ThreadId, Arc<UserDataObserver>>,
    write_lock: Mutex<()>,
    /// Used to number worker threads.
    spawned: AtomicU64,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("instances", &self.instances.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(factory: Arc<dyn SessionFactory>, config: BridgeConfig) -> Self {
        Self {
            factory,
            config,
            instances: DashMap::new(),
            write_lock: Mutex::new(()),
            spawned: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The calling thread's observer, created (with its worker) on first use.
    pub fn get_instance(&self) -> Result<Arc<UserDataObserver>, BridgeError> {
        let thread = std::thread::current().id();
        if let Some(found) = self.lookup(thread) {
            return Ok(found);
        }

        let _guard = self.write_lock.lock();
        if let Some(found) = self.lookup(thread) {
            return Ok(found);
        }
        let n = self.spawned.fetch_add(1, Ordering::Relaxed) + 1;
        let thread_name = format!("{}-{n}", self.config.thread_name_prefix);
        let observer = UserDataObserver::spawn(
            thread,
            self.config.clone(),
            Arc::clone(&self.factory),
            thread_name,
        )?;
        self.instances.insert(thread, Arc::clone(&observer));
        tracing::debug!(owner = ?thread, instances = self.instances.len(), "user data observer created");
        Ok(observer)
    }

    /// Stop and join the calling thread's worker and forget its observer.
    /// Returns `false` if the thread had none.
    ///
    /// Outstanding `Arc`s to the released observer keep working only in the
    /// sense that every call returns [`BridgeError::Released`].
    pub fn release_instance(&self) -> bool {
        let thread = std::thread::current().id();
        let removed = {
            let _guard = self.write_lock.lock();
            self.instances.remove(&thread)
        };
        match removed {
            Some((_, observer)) => {
                observer.shutdown();
                tracing::debug!(owner = ?thread, "user data observer released");
                true
            }
            None => false,
        }
    }

    /// Release every registered observer. Meant for process teardown.
    pub fn clear_instances(&self) {
        let drained: Vec<Arc<UserDataObserver>> = {
            let _guard = self.write_lock.lock();
            let threads: Vec<ThreadId> = self.instances.iter().map(|e| *e.key()).collect();
            threads
                .into_iter()
                .filter_map(|t| self.instances.remove(&t).map(|(_, o)| o))
                .collect()
        };
        if drained.is_empty() {
            return;
        }
        // Signal everyone first so the workers wind down in parallel.
        for observer in &drained {
            observer.request_stop();
        }
        for observer in &drained {
            observer.shutdown();
        }
        tracing::info!(released = drained.len(), "all user data observers released");
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains_current(&self) -> bool {
        self.instances.contains_key(&std::thread::current().id())
    }

    fn lookup(&self, thread: ThreadId) -> Option<Arc<UserDataObserver>> {
        self.instances.get(&thread).map(|e| Arc::clone(e.value()))
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.clear_instances();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialbar_session::memory::MemoryService;

    fn registry(service: &MemoryService) -> Registry {
        Registry::new(service.factory(), BridgeConfig::default())
    }

    #[test]
    fn test_get_instance_is_idempotent_per_thread() {
        let service = MemoryService::new();
        let registry = registry(&service);

        let a = registry.get_instance().unwrap();
        let b = registry.get_instance().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains_current());
    }

    #[test]
    fn test_each_thread_gets_its_own_instance() {
        let service = MemoryService::new();
        let registry = Arc::new(registry(&service));
        let mine = registry.get_instance().unwrap();

        let theirs_owner = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let theirs = registry.get_instance().unwrap();
                let owner = theirs.owner();
                assert!(registry.release_instance());
                owner
            })
            .join()
            .unwrap()
        };

        assert_ne!(mine.owner(), theirs_owner);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_release_without_instance() {
        let service = MemoryService::new();
        let registry = registry(&service);
        assert!(!registry.release_instance());
    }

    #[test]
    fn test_release_then_get_yields_fresh_instance() {
        let service = MemoryService::new();
        let registry = registry(&service);

        let first = registry.get_instance().unwrap();
        assert!(registry.release_instance());
        assert!(first.is_released());
        assert!(registry.is_empty());

        let second = registry.get_instance().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_released());
    }

    #[test]
    fn test_clear_instances_releases_everything() {
        let service = MemoryService::new();
        let registry = Arc::new(registry(&service));
        let mine = registry.get_instance().unwrap();
        let theirs = {
            let registry = registry.clone();
            std::thread::spawn(move || registry.get_instance().unwrap())
                .join()
                .unwrap()
        };
        assert_eq!(registry.len(), 2);

        registry.clear_instances();
        assert!(registry.is_empty());
        assert!(mine.is_released());
        assert!(theirs.is_released());
    }
}
