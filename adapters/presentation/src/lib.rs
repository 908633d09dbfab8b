#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Presentation bridge that mirrors live entities onto a rendering root.
//!
//! The [`RenderRoot`] belongs to a single owning thread, which holds the
//! [`SurfaceOwner`] and drains queued mutations with [`SurfaceOwner::pump`]
//! every tick. Every other thread only enqueues mutations through a
//! [`Dispatcher`]. [`ShowManager`] builds on the dispatcher to add and remove
//! entity handles and runs a sync loop reconciling the live-entity registry
//! with what is on screen. The loop only retracts entities it mirrored itself
//! and never re-adds an entity hidden through [`ShowManager::un_show`].

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use star_siege_core::{EntityHandle, EntityId, EntityKind, EntityRegistry};

/// Backdrop handle occupying the first slot of every root.
pub const BACKGROUND: EntityHandle =
    EntityHandle::new(EntityId::new(u64::MAX), EntityKind::Background);

/// Ordered collection of displayed handles. The baseline sits at index 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderRoot {
    children: Vec<EntityHandle>,
}

impl RenderRoot {
    /// Creates a root holding only the provided baseline.
    #[must_use]
    pub fn new(baseline: EntityHandle) -> Self {
        Self {
            children: vec![baseline],
        }
    }

    /// Handles currently displayed, in insertion order.
    #[must_use]
    pub fn children(&self) -> &[EntityHandle] {
        &self.children
    }

    /// Reports whether an entity with the identifier is displayed.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.children.iter().any(|child| child.id() == id)
    }

    /// Appends a handle unless it is already displayed.
    pub fn add(&mut self, entity: EntityHandle) {
        if !self.contains(entity.id()) {
            self.children.push(entity);
        }
    }

    /// Removes the handle with the identifier. The baseline is never removed.
    pub fn remove(&mut self, id: EntityId) -> bool {
        match self.children.iter().skip(1).position(|child| child.id() == id) {
            Some(offset) => {
                let _ = self.children.remove(offset + 1);
                true
            }
            None => false,
        }
    }

    /// Drops every child except the baseline.
    pub fn truncate_to_baseline(&mut self) {
        self.children.truncate(1);
    }
}

impl Default for RenderRoot {
    fn default() -> Self {
        Self::new(BACKGROUND)
    }
}

type Mutation = Box<dyn FnOnce(&mut RenderRoot) + Send>;

/// Creates the marshaling queue for `root`.
#[must_use]
pub fn channel(root: RenderRoot) -> (Dispatcher, SurfaceOwner) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (Dispatcher { sender }, SurfaceOwner { root, receiver })
}

/// Sending half of the marshaling queue. Cheap to clone and `Send`.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    sender: Sender<Mutation>,
}

impl Dispatcher {
    /// Enqueues a mutation for the owning thread. Returns `false` when the
    /// owner has been dropped.
    pub fn dispatch<F>(&self, mutation: F) -> bool
    where
        F: FnOnce(&mut RenderRoot) + Send + 'static,
    {
        self.sender.send(Box::new(mutation)).is_ok()
    }
}

/// Owning half of the marshaling queue, holding the root itself.
#[derive(Debug)]
pub struct SurfaceOwner {
    root: RenderRoot,
    receiver: Receiver<Mutation>,
}

impl SurfaceOwner {
    /// Applies every queued mutation and returns how many ran.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(mutation) => {
                    mutation(&mut self.root);
                    applied += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return applied,
            }
        }
    }

    /// Waits up to `timeout` for the first mutation, then drains the queue.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(mutation) => {
                mutation(&mut self.root);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Read access to the root.
    #[must_use]
    pub fn root(&self) -> &RenderRoot {
        &self.root
    }
}

/// Tuning of the presentation sync loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceConfig {
    /// Delay between two reconciliation passes.
    pub poll_interval: Duration,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(16),
        }
    }
}

/// Thread-safe bridge adding and removing entities on the rendering root.
pub struct ShowManager {
    shared: Arc<SurfaceShared>,
    sync_loop: Mutex<Option<SyncLoop>>,
    config: SurfaceConfig,
}

struct SurfaceShared {
    running: AtomicBool,
    registry: Mutex<Arc<dyn EntityRegistry>>,
    visibility: Mutex<Visibility>,
    dispatcher: Dispatcher,
}

/// Bookkeeping of the sync loop, kept apart from explicit requests.
#[derive(Debug, Default)]
struct Visibility {
    /// Registry entities the loop put on screen.
    synced: HashSet<EntityId>,
    /// Entities explicitly hidden while still live.
    hidden: HashSet<EntityId>,
}

struct SyncLoop {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl ShowManager {
    /// Creates a stopped manager mirroring `registry` through `dispatcher`.
    #[must_use]
    pub fn new(registry: Arc<dyn EntityRegistry>, dispatcher: Dispatcher) -> Self {
        Self::with_config(registry, dispatcher, SurfaceConfig::default())
    }

    /// Creates a stopped manager with a custom sync loop cadence.
    #[must_use]
    pub fn with_config(
        registry: Arc<dyn EntityRegistry>,
        dispatcher: Dispatcher,
        config: SurfaceConfig,
    ) -> Self {
        Self {
            shared: Arc::new(SurfaceShared {
                running: AtomicBool::new(false),
                registry: Mutex::new(registry),
                visibility: Mutex::new(Visibility::default()),
                dispatcher,
            }),
            sync_loop: Mutex::new(None),
            config,
        }
    }

    /// Marks the surface running, shows the ship and starts the sync loop.
    pub fn start(&self) {
        self.shared.running.store(true, Ordering::Release);
        let ship = self.shared.registry().ship();
        let _ = self.shared.show(ship);
        self.start_loop();
        tracing::debug!("show manager started");
    }

    /// Stops mirroring. Already queued mutations still apply.
    pub fn pause(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.stop_loop();
        tracing::debug!("show manager paused");
    }

    /// Restarts mirroring after a pause.
    pub fn resume(&self) {
        self.shared.running.store(true, Ordering::Release);
        self.start_loop();
        tracing::debug!("show manager resumed");
    }

    /// Rebinds to `registry`, stops mirroring, forgets every show and hide
    /// request and clears the root down to its baseline.
    pub fn reset(&self, registry: Arc<dyn EntityRegistry>) {
        *lock(&self.shared.registry) = registry;
        self.shared.running.store(false, Ordering::Release);
        self.stop_loop();
        *lock(&self.shared.visibility) = Visibility::default();
        if !self
            .shared
            .dispatcher
            .dispatch(RenderRoot::truncate_to_baseline)
        {
            tracing::warn!("surface owner gone; reset not applied");
        }
        tracing::debug!("show manager reset");
    }

    /// Queues `entity` for display. Returns `false` without queuing anything
    /// when the surface is not running.
    ///
    /// Entities absent from the registry stay displayed until un-shown.
    pub fn show(&self, entity: EntityHandle) -> bool {
        self.shared.show(entity)
    }

    /// Queues `entity` for removal. Returns `false` without queuing anything
    /// when the surface is not running.
    ///
    /// A live entity stays hidden until shown again.
    pub fn un_show(&self, entity: EntityHandle) -> bool {
        self.shared.un_show(entity)
    }

    /// Reports whether the surface accepts mutations.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    fn start_loop(&self) {
        let mut slot = lock(&self.sync_loop);
        if slot.is_some() {
            return;
        }
        let (stop, stopped) = crossbeam_channel::bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        let poll_interval = self.config.poll_interval;
        let spawned = thread::Builder::new()
            .name("show-sync".into())
            .spawn(move || loop {
                shared.sync_once();
                match stopped.recv_timeout(poll_interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            });
        match spawned {
            Ok(handle) => *slot = Some(SyncLoop { stop, handle }),
            Err(err) => tracing::error!(%err, "failed to spawn show sync loop"),
        }
    }

    fn stop_loop(&self) {
        let Some(sync_loop) = lock(&self.sync_loop).take() else {
            return;
        };
        drop(sync_loop.stop);
        if sync_loop.handle.join().is_err() {
            tracing::warn!("show sync loop panicked");
        }
    }
}

impl Drop for ShowManager {
    fn drop(&mut self) {
        self.stop_loop();
    }
}

impl SurfaceShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn registry(&self) -> Arc<dyn EntityRegistry> {
        let registry: Arc<dyn EntityRegistry> = lock(&self.registry).clone();
        registry
    }

    fn show(&self, entity: EntityHandle) -> bool {
        if !self.is_running() {
            return false;
        }
        let _ = lock(&self.visibility).hidden.remove(&entity.id());
        self.add(entity)
    }

    fn un_show(&self, entity: EntityHandle) -> bool {
        if !self.is_running() {
            return false;
        }
        {
            let mut visibility = lock(&self.visibility);
            let _ = visibility.synced.remove(&entity.id());
            let _ = visibility.hidden.insert(entity.id());
        }
        self.remove(entity.id())
    }

    fn add(&self, entity: EntityHandle) -> bool {
        self.dispatcher.dispatch(move |root| root.add(entity))
    }

    fn remove(&self, id: EntityId) -> bool {
        self.dispatcher.dispatch(move |root| {
            let _ = root.remove(id);
        })
    }

    /// Mirrors registry arrivals and departures onto the root.
    ///
    /// Only entities the loop added are retracted, and hidden ones are
    /// skipped until they leave the registry.
    fn sync_once(&self) {
        if !self.is_running() {
            return;
        }
        let live = self.registry().snapshot();
        let (added, removed) = {
            let mut visibility = lock(&self.visibility);
            let Visibility { synced, hidden } = &mut *visibility;
            hidden.retain(|id| live.iter().any(|entry| entry.id() == *id));

            let added: Vec<EntityHandle> = live
                .iter()
                .filter(|handle| {
                    !synced.contains(&handle.id()) && !hidden.contains(&handle.id())
                })
                .copied()
                .collect();
            let removed: Vec<EntityId> = synced
                .iter()
                .filter(|id| live.iter().all(|entry| entry.id() != **id))
                .copied()
                .collect();
            for handle in &added {
                let _ = synced.insert(handle.id());
            }
            for id in &removed {
                let _ = synced.remove(id);
            }
            (added, removed)
        };

        for handle in added {
            let _ = self.add(handle);
        }
        for id in removed {
            let _ = self.remove(id);
        }
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
