use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use star_siege_core::{
    Enemy, EnemyKind, EntityHandle, EntityId, EntityKind, EntityRegistry, Position,
};
use star_siege_presentation::{
    channel, RenderRoot, ShowManager, SurfaceConfig, SurfaceOwner, BACKGROUND,
};
use star_siege_world::InstanceManager;

fn fast() -> SurfaceConfig {
    SurfaceConfig {
        poll_interval: Duration::from_millis(2),
    }
}

fn scout() -> Enemy {
    Enemy::new(
        EnemyKind::Scout,
        EnemyKind::Scout.base_stats(),
        Position::new(0.0, 0.0),
    )
}

/// Pumps the owner until `condition` holds on its root.
fn pump_until(
    owner: &mut SurfaceOwner,
    timeout: Duration,
    mut condition: impl FnMut(&RenderRoot) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let _ = owner.pump_timeout(Duration::from_millis(2));
        if condition(owner.root()) {
            return true;
        }
    }
    condition(owner.root())
}

#[test]
fn stopped_surface_ignores_show_requests() {
    let registry = Arc::new(InstanceManager::new());
    let (dispatcher, mut owner) = channel(RenderRoot::default());
    let surface = ShowManager::with_config(registry.clone(), dispatcher, fast());

    assert!(!surface.is_running());
    assert!(!surface.show(registry.ship()));
    assert!(!surface.un_show(registry.ship()));
    assert_eq!(owner.pump(), 0);
    assert_eq!(owner.root().children(), &[BACKGROUND]);
}

#[test]
fn requests_from_other_threads_apply_only_when_pumped() {
    let registry = Arc::new(InstanceManager::new());
    let (dispatcher, mut owner) = channel(RenderRoot::default());
    let surface = Arc::new(ShowManager::new(registry.clone(), dispatcher));
    surface.start();

    let extra = EntityHandle::new(EntityId::new(42), EntityKind::Enemy(EnemyKind::Striker));
    let remote = Arc::clone(&surface);
    let queued = thread::spawn(move || remote.show(extra))
        .join()
        .expect("worker thread");
    assert!(queued);
    assert!(!owner.root().contains(extra.id()));

    assert!(pump_until(&mut owner, Duration::from_secs(2), |root| {
        root.contains(extra.id()) && root.contains(registry.ship().id())
    }));
    assert_eq!(owner.root().children()[0], BACKGROUND);
}

#[test]
fn explicitly_shown_entity_survives_registry_polls() {
    let registry = Arc::new(InstanceManager::new());
    let (dispatcher, mut owner) = channel(RenderRoot::default());
    let surface = ShowManager::new(registry.clone(), dispatcher);
    surface.start();

    let decoy = EntityHandle::new(EntityId::new(42), EntityKind::Enemy(EnemyKind::Scout));
    assert!(surface.show(decoy));
    let _ = pump_until(&mut owner, Duration::from_millis(200), |_| false);

    assert!(owner.root().contains(decoy.id()), "not in the registry yet still shown");
    assert!(surface.un_show(decoy));
    assert!(pump_until(&mut owner, Duration::from_secs(2), |root| !root
        .contains(decoy.id())));
}

#[test]
fn explicitly_hidden_entity_stays_hidden_while_live() {
    let registry = Arc::new(InstanceManager::new());
    let (dispatcher, mut owner) = channel(RenderRoot::default());
    let surface = ShowManager::new(registry.clone(), dispatcher);
    surface.start();

    let handle = registry.spawn(scout());
    assert!(pump_until(&mut owner, Duration::from_secs(2), |root| root
        .contains(handle.id())));

    assert!(surface.un_show(handle));
    let _ = pump_until(&mut owner, Duration::from_millis(200), |_| false);
    assert!(!owner.root().contains(handle.id()), "sync loop re-added a hidden entity");
    assert!(owner.root().contains(registry.ship().id()));

    assert!(surface.show(handle));
    assert!(pump_until(&mut owner, Duration::from_secs(2), |root| root
        .contains(handle.id())));
}

#[test]
fn sync_loop_mirrors_spawn_and_despawn() {
    let registry = Arc::new(InstanceManager::new());
    let (dispatcher, mut owner) = channel(RenderRoot::default());
    let surface = ShowManager::with_config(registry.clone(), dispatcher, fast());
    surface.start();

    let handle = registry.spawn(scout());
    assert!(pump_until(&mut owner, Duration::from_secs(2), |root| root
        .contains(handle.id())));

    let _ = registry.despawn(handle.id());
    assert!(pump_until(&mut owner, Duration::from_secs(2), |root| !root
        .contains(handle.id())));
    assert!(owner.root().contains(registry.ship().id()));
}

#[test]
fn paused_surface_stops_mirroring_until_resumed() {
    let registry = Arc::new(InstanceManager::new());
    let (dispatcher, mut owner) = channel(RenderRoot::default());
    let surface = ShowManager::with_config(registry.clone(), dispatcher, fast());
    surface.start();
    surface.pause();
    let _ = owner.pump();

    let handle = registry.spawn(scout());
    thread::sleep(Duration::from_millis(30));
    let _ = owner.pump();
    assert!(!owner.root().contains(handle.id()));
    assert!(!surface.show(handle));

    surface.resume();
    assert!(surface.is_running());
    assert!(pump_until(&mut owner, Duration::from_secs(2), |root| root
        .contains(handle.id())));
}

#[test]
fn reset_clears_to_the_baseline_and_rebinds() {
    let first = Arc::new(InstanceManager::new());
    let (dispatcher, mut owner) = channel(RenderRoot::default());
    let surface = ShowManager::with_config(first.clone(), dispatcher, fast());
    surface.start();
    let handle = first.spawn(scout());
    assert!(pump_until(&mut owner, Duration::from_secs(2), |root| root
        .contains(handle.id())));

    let second = Arc::new(InstanceManager::new());
    surface.reset(second.clone());
    let _ = owner.pump();
    assert_eq!(owner.root().children(), &[BACKGROUND]);
    assert!(!surface.is_running());
    assert!(!surface.show(handle));

    let fresh = second.spawn(scout());
    surface.start();
    assert!(pump_until(&mut owner, Duration::from_secs(2), |root| root
        .contains(fresh.id())));
    assert!(owner.root().contains(second.ship().id()));
}
