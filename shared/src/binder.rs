//! Permission UI binder.
//!
//! This crate renders nothing. Rendering collaborators register a surface
//! with named controls bound to permissions; the binder computes per-control
//! states from the RBAC engine and delivers them through the surface's
//! `apply`. Re-application is event-driven: a task subscribed to the
//! engine's broadcast re-applies on every permission resolution, and on
//! render completion for the one surface that reported it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::rbac::{Permission, PermissionEngine, PermissionEvent};

/// Tooltip attached to disabled controls.
pub const NO_PERMISSION_TOOLTIP: &str = "暂无权限执行此操作";

/// How a control reacts when its permission is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Treatment {
    /// The control disappears (navigation entries lacking `read`).
    HideWhenDenied,
    /// The control stays visible but disabled, with an explanatory tooltip.
    DisableWhenDenied,
}

/// A named control bound to one permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBinding {
    /// Control name, unique within its surface.
    pub control: String,
    /// Gating permission.
    pub permission: Permission,
    /// Denial treatment.
    pub treatment: Treatment,
}

impl ControlBinding {
    /// Construct a binding.
    pub fn new(control: impl Into<String>, permission: Permission, treatment: Treatment) -> Self {
        ControlBinding {
            control: control.into(),
            permission,
            treatment,
        }
    }
}

/// Computed state for one control, as delivered to the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    /// Control name from the binding.
    pub control: String,
    /// Whether the active user holds the permission.
    pub allowed: bool,
    /// Denial treatment from the binding.
    pub treatment: Treatment,
    /// Set only on denied disable-treatment controls.
    pub tooltip: Option<String>,
}

/// A rendering collaborator. Implementations live outside this crate.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Receive the full computed state set for this surface.
    async fn apply(&self, states: Vec<ControlState>);
}

struct Registration {
    surface: Arc<dyn RenderSurface>,
    bindings: Vec<ControlBinding>,
}

/// Registry of surfaces plus the event-driven re-application loop.
pub struct PermissionBinder {
    engine: Arc<PermissionEngine>,
    surfaces: DashMap<String, Registration>,
}

impl PermissionBinder {
    /// Binder over `engine`.
    pub fn new(engine: Arc<PermissionEngine>) -> Self {
        PermissionBinder {
            engine,
            surfaces: DashMap::new(),
        }
    }

    /// Register a surface and apply its control states once immediately.
    pub async fn register(
        &self,
        name: impl Into<String>,
        surface: Arc<dyn RenderSurface>,
        bindings: Vec<ControlBinding>,
    ) {
        let name = name.into();
        let states = self.compute_states(&bindings).await;
        surface.apply(states).await;
        tracing::debug!(surface = %name, controls = bindings.len(), "surface registered");
        self.surfaces.insert(name, Registration { surface, bindings });
    }

    /// Remove a surface; later events no longer reach it.
    pub fn unregister(&self, name: &str) {
        self.surfaces.remove(name);
    }

    /// A surface finished rendering; the event loop re-applies to it.
    pub fn render_completed(&self, name: &str) {
        self.engine.notify_render_completed(name);
    }

    /// Re-apply control states to every registered surface.
    pub async fn apply_all(&self) {
        let names: Vec<String> = self.surfaces.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.apply_one(&name).await;
        }
    }

    /// Re-apply control states to one surface, if registered.
    pub async fn apply_one(&self, name: &str) {
        // Clone out of the map entry so no shard lock is held across await.
        let Some((surface, bindings)) = self
            .surfaces
            .get(name)
            .map(|reg| (reg.surface.clone(), reg.bindings.clone()))
        else {
            return;
        };
        let states = self.compute_states(&bindings).await;
        surface.apply(states).await;
    }

    /// Spawn the re-application loop. Runs until the engine is dropped.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let binder = Arc::clone(self);
        let mut events = binder.engine.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PermissionEvent::PermissionsResolved) => binder.apply_all().await,
                    Ok(PermissionEvent::RenderCompleted { surface }) => {
                        binder.apply_one(&surface).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "permission events lagged, re-applying all");
                        binder.apply_all().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn compute_states(&self, bindings: &[ControlBinding]) -> Vec<ControlState> {
        let mut states = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let allowed = self
                .engine
                .has_permission(binding.permission.module, binding.permission.action)
                .await;
            let tooltip = (!allowed && binding.treatment == Treatment::DisableWhenDenied)
                .then(|| NO_PERMISSION_TOOLTIP.to_string());
            states.push(ControlState {
                control: binding.control.clone(),
                allowed,
                treatment: binding.treatment,
                tooltip,
            });
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::rbac::{Action, ActiveUser, Module, Role};

    struct Recording {
        applied: Mutex<Vec<Vec<ControlState>>>,
    }

    impl Recording {
        fn new() -> Arc<Self> {
            Arc::new(Recording {
                applied: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> Vec<ControlState> {
            self.applied.lock().last().cloned().unwrap_or_default()
        }

        fn applications(&self) -> usize {
            self.applied.lock().len()
        }
    }

    #[async_trait]
    impl RenderSurface for Recording {
        async fn apply(&self, states: Vec<ControlState>) {
            self.applied.lock().push(states);
        }
    }

    fn bindings() -> Vec<ControlBinding> {
        vec![
            ControlBinding::new(
                "nav-users",
                Permission::new(Module::Users, Action::Read),
                Treatment::HideWhenDenied,
            ),
            ControlBinding::new(
                "btn-delete-article",
                Permission::new(Module::Articles, Action::Delete),
                Treatment::DisableWhenDenied,
            ),
        ]
    }

    async fn engine_with(role: Role) -> Arc<PermissionEngine> {
        let engine = Arc::new(PermissionEngine::new());
        engine
            .set_current_user(ActiveUser {
                username: "tester".into(),
                role,
            })
            .await;
        engine
    }

    #[tokio::test]
    async fn registration_applies_immediately() {
        let binder = PermissionBinder::new(engine_with(Role::Viewer).await);
        let surface = Recording::new();
        binder
            .register("admin-shell", surface.clone(), bindings())
            .await;

        assert_eq!(surface.applications(), 1);
        let states = surface.last();
        assert_eq!(states.len(), 2);
        // Viewer lacks users.read: hidden, no tooltip.
        assert!(!states[0].allowed);
        assert_eq!(states[0].treatment, Treatment::HideWhenDenied);
        assert_eq!(states[0].tooltip, None);
        // Viewer lacks articles.delete: disabled with tooltip.
        assert!(!states[1].allowed);
        assert_eq!(states[1].tooltip, Some(NO_PERMISSION_TOOLTIP.to_string()));
    }

    #[tokio::test]
    async fn resolution_event_reapplies_to_all_surfaces() {
        let engine = engine_with(Role::Viewer).await;
        let binder = Arc::new(PermissionBinder::new(engine.clone()));
        let surface = Recording::new();
        binder.register("admin-shell", surface.clone(), bindings()).await;
        let _loop = binder.start();

        engine
            .set_current_user(ActiveUser {
                username: "root".into(),
                role: Role::SuperAdmin,
            })
            .await;
        tokio::task::yield_now().await;
        // Give the loop a moment to deliver.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(surface.applications() >= 2);
        let states = surface.last();
        assert!(states.iter().all(|s| s.allowed));
        assert!(states.iter().all(|s| s.tooltip.is_none()));
    }

    #[tokio::test]
    async fn render_completion_reapplies_to_that_surface_only() {
        let engine = engine_with(Role::Admin).await;
        let binder = Arc::new(PermissionBinder::new(engine));
        let first = Recording::new();
        let second = Recording::new();
        binder.register("nav", first.clone(), bindings()).await;
        binder.register("toolbar", second.clone(), bindings()).await;
        let _loop = binder.start();

        binder.render_completed("nav");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(first.applications(), 2);
        assert_eq!(second.applications(), 1);
    }
}
