//! Role-based access control.
//!
//! The matrix is static: roles gain no permissions at runtime. The engine
//! holds the active user, answers membership queries, and broadcasts
//! permission events so UI collaborators re-apply control states without
//! polling.
//!
//! Before any user is loaded the engine is deliberately fail-open: during
//! the bootstrap window every check warns and passes, so the admin shell can
//! render while the session is still resolving. Once a user is set, unknown
//! module/action pairs fail closed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

/// The four roles, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Holds every defined permission.
    SuperAdmin,
    /// Full content control, no user administration.
    Admin,
    /// Creates and edits content, rarely deletes.
    Editor,
    /// Read-mostly.
    Viewer,
}

impl Role {
    /// Every role, strongest first.
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Editor, Role::Viewer];

    /// Stable snake_case form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }

    /// Short Chinese display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "超管",
            Role::Admin => "管理员",
            Role::Editor => "编辑者",
            Role::Viewer => "查看者",
        }
    }

    /// Privilege level description.
    pub fn level_description(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "最高级别",
            Role::Admin => "高级权限",
            Role::Editor => "中级权限",
            Role::Viewer => "基础权限",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParsePermissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "super_admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "viewer" => Ok(Role::Viewer),
            other => Err(ParsePermissionError::UnknownRole(other.to_string())),
        }
    }
}

/// Admin surface modules. Some exist only as permission scopes
/// (apps/dashboard/events) and have no repository collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    /// Blog articles.
    Articles,
    /// Article categories.
    Categories,
    /// Article tags.
    Tags,
    /// Article comments.
    Comments,
    /// Guestbook messages.
    Guestbook,
    /// Images and videos.
    Media,
    /// Admin accounts.
    Users,
    /// Site settings.
    Settings,
    /// Mini applications.
    Apps,
    /// Dashboard overview.
    Dashboard,
    /// Timeline events.
    Events,
}

impl Module {
    /// Every module, matrix order.
    pub const ALL: [Module; 11] = [
        Module::Articles,
        Module::Categories,
        Module::Tags,
        Module::Comments,
        Module::Guestbook,
        Module::Media,
        Module::Users,
        Module::Settings,
        Module::Apps,
        Module::Dashboard,
        Module::Events,
    ];

    /// Stable snake_case form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Articles => "articles",
            Module::Categories => "categories",
            Module::Tags => "tags",
            Module::Comments => "comments",
            Module::Guestbook => "guestbook",
            Module::Media => "media",
            Module::Users => "users",
            Module::Settings => "settings",
            Module::Apps => "apps",
            Module::Dashboard => "dashboard",
            Module::Events => "events",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = ParsePermissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "articles" => Ok(Module::Articles),
            "categories" => Ok(Module::Categories),
            "tags" => Ok(Module::Tags),
            "comments" => Ok(Module::Comments),
            "guestbook" => Ok(Module::Guestbook),
            "media" => Ok(Module::Media),
            "users" => Ok(Module::Users),
            "settings" => Ok(Module::Settings),
            "apps" => Ok(Module::Apps),
            "dashboard" => Ok(Module::Dashboard),
            "events" => Ok(Module::Events),
            other => Err(ParsePermissionError::UnknownModule(other.to_string())),
        }
    }
}

/// Actions a module may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// View.
    Read,
    /// Create new records.
    Create,
    /// Edit existing records.
    Update,
    /// Remove records.
    Delete,
    /// Approve pending comments.
    Approve,
    /// Upload media files.
    Upload,
    /// Change another user's role.
    ChangeRole,
    /// Change a password (self-scoped outside super_admin).
    ChangePassword,
}

impl Action {
    /// Every action.
    pub const ALL: [Action; 8] = [
        Action::Read,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Approve,
        Action::Upload,
        Action::ChangeRole,
        Action::ChangePassword,
    ];

    /// Stable snake_case form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::Upload => "upload",
            Action::ChangeRole => "change_role",
            Action::ChangePassword => "change_password",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParsePermissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "read" => Ok(Action::Read),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "approve" => Ok(Action::Approve),
            "upload" => Ok(Action::Upload),
            "change_role" => Ok(Action::ChangeRole),
            "change_password" => Ok(Action::ChangePassword),
            other => Err(ParsePermissionError::UnknownAction(other.to_string())),
        }
    }
}

/// A `module.action` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Module scope.
    pub module: Module,
    /// Action within the module.
    pub action: Action,
}

impl Permission {
    /// Construct a pair.
    pub fn new(module: Module, action: Action) -> Self {
        Permission { module, action }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.action)
    }
}

impl FromStr for Permission {
    type Err = ParsePermissionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (module, action) = value
            .split_once('.')
            .ok_or_else(|| ParsePermissionError::BadFormat(value.to_string()))?;
        Ok(Permission {
            module: module.parse()?,
            action: action.parse()?,
        })
    }
}

/// Parse failures for roles, modules, actions and permission strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsePermissionError {
    /// Role string outside the four known roles.
    #[error("unknown role: {0}")]
    UnknownRole(String),
    /// Module string outside the matrix.
    #[error("unknown module: {0}")]
    UnknownModule(String),
    /// Action string outside the matrix.
    #[error("unknown action: {0}")]
    UnknownAction(String),
    /// Permission string without the `module.action` shape.
    #[error("expected module.action, got: {0}")]
    BadFormat(String),
}

const SA: Role = Role::SuperAdmin;
const A: Role = Role::Admin;
const E: Role = Role::Editor;
const V: Role = Role::Viewer;

/// Roles holding `module.action`, or `None` for pairs the matrix does not
/// define at all.
pub fn allowed_roles(module: Module, action: Action) -> Option<&'static [Role]> {
    use Action::*;
    use Module::*;

    const EVERYONE: &[Role] = &[SA, A, E, V];
    const CONTENT: &[Role] = &[SA, A, E];
    const ADMINS: &[Role] = &[SA, A];
    const SUPER_ONLY: &[Role] = &[SA];

    let roles: &'static [Role] = match (module, action) {
        (Articles | Categories | Tags | Guestbook, Read) => EVERYONE,
        (Articles | Categories | Tags | Guestbook, Create | Update) => CONTENT,
        (Articles | Categories | Tags | Guestbook, Delete) => ADMINS,

        (Comments, Read) => EVERYONE,
        (Comments, Create | Update | Approve) => CONTENT,
        (Comments, Delete) => ADMINS,

        (Media, Read) => EVERYONE,
        (Media, Update | Delete | Upload) => ADMINS,

        (Users, Read | Create | Delete) => SUPER_ONLY,
        (Users, Update | ChangePassword) => EVERYONE,
        (Users, ChangeRole) => SUPER_ONLY,

        // Settings read excludes editor; events delete includes editor.
        (Settings, Read) => &[SA, A, V],
        (Settings, Update) => ADMINS,

        (Apps, Read) => EVERYONE,
        (Apps, Create | Update | Delete) => ADMINS,

        (Dashboard, Read) => EVERYONE,

        (Events, Read) => EVERYONE,
        (Events, Create | Update | Delete) => CONTENT,

        _ => return None,
    };
    Some(roles)
}

/// Every permission `role` holds, matrix order.
pub fn permissions_for(role: Role) -> Vec<Permission> {
    let mut held = Vec::new();
    for module in Module::ALL {
        for action in Action::ALL {
            if let Some(roles) = allowed_roles(module, action) {
                if roles.contains(&role) {
                    held.push(Permission::new(module, action));
                }
            }
        }
    }
    held
}

/// The active `{username, role}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUser {
    /// Login name.
    pub username: String,
    /// Granted role.
    pub role: Role,
}

/// Events broadcast by the engine; UI collaborators subscribe instead of
/// polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionEvent {
    /// The active user (and therefore every answer) changed.
    PermissionsResolved,
    /// A surface finished rendering and wants its controls re-applied.
    RenderCompleted {
        /// Surface name, as registered with the binder.
        surface: String,
    },
}

/// Receives user-visible denial notices from [`PermissionEngine::check_permission`].
pub trait DenialNotifier: Send + Sync {
    /// A denied permission was checked on the user-visible path.
    fn denied(&self, user: &ActiveUser, permission: Permission);
}

/// Permission engine: active user, matrix answers, event broadcast.
pub struct PermissionEngine {
    current: RwLock<Option<ActiveUser>>,
    events: broadcast::Sender<PermissionEvent>,
    notifier: RwLock<Option<Arc<dyn DenialNotifier>>>,
}

impl Default for PermissionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionEngine {
    /// Engine with no user loaded (fail-open until one is set).
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        PermissionEngine {
            current: RwLock::new(None),
            events,
            notifier: RwLock::new(None),
        }
    }

    /// Subscribe to permission events.
    pub fn subscribe(&self) -> broadcast::Receiver<PermissionEvent> {
        self.events.subscribe()
    }

    /// Install the denial notifier.
    pub async fn set_notifier(&self, notifier: Arc<dyn DenialNotifier>) {
        *self.notifier.write().await = Some(notifier);
    }

    /// Store the active user and broadcast `PermissionsResolved`.
    pub async fn set_current_user(&self, user: ActiveUser) {
        tracing::info!(username = %user.username, role = %user.role, "current user set");
        *self.current.write().await = Some(user);
        let _ = self.events.send(PermissionEvent::PermissionsResolved);
    }

    /// Drop the active user (logout); re-enters the fail-open window.
    pub async fn clear_current_user(&self) {
        *self.current.write().await = None;
        let _ = self.events.send(PermissionEvent::PermissionsResolved);
    }

    /// The active user, if resolved.
    pub async fn current_user(&self) -> Option<ActiveUser> {
        self.current.read().await.clone()
    }

    /// Re-apply request from a rendered surface.
    pub fn notify_render_completed(&self, surface: &str) {
        let _ = self.events.send(PermissionEvent::RenderCompleted {
            surface: surface.to_string(),
        });
    }

    /// Matrix membership for the active user.
    ///
    /// No user loaded → warn and allow (bootstrap window). Undefined pair →
    /// warn and deny.
    pub async fn has_permission(&self, module: Module, action: Action) -> bool {
        let current = self.current.read().await;
        let Some(user) = current.as_ref() else {
            tracing::warn!(
                permission = %Permission::new(module, action),
                "permission check before user resolution, allowing"
            );
            return true;
        };
        match allowed_roles(module, action) {
            Some(roles) => roles.contains(&user.role),
            None => {
                tracing::warn!(
                    permission = %Permission::new(module, action),
                    "undefined permission pair, denying"
                );
                false
            }
        }
    }

    /// [`has_permission`](Self::has_permission) plus a user-visible denial
    /// notice when denied.
    pub async fn check_permission(&self, module: Module, action: Action) -> bool {
        if self.has_permission(module, action).await {
            return true;
        }
        if let Some(user) = self.current.read().await.as_ref() {
            tracing::info!(
                username = %user.username,
                permission = %Permission::new(module, action),
                "permission denied"
            );
            if let Some(notifier) = self.notifier.read().await.as_ref() {
                notifier.denied(user, Permission::new(module, action));
            }
        }
        false
    }

    /// Whether the active user may modify `target_username`'s account:
    /// super_admin always, anyone else only themselves. Fail-open without a
    /// user, like every other check.
    pub async fn can_modify_user(&self, target_username: &str) -> bool {
        let current = self.current.read().await;
        match current.as_ref() {
            None => true,
            Some(user) => user.role == Role::SuperAdmin || user.username == target_username,
        }
    }

    /// Active user holds admin or super_admin.
    pub async fn is_admin(&self) -> bool {
        matches!(
            self.current.read().await.as_ref().map(|u| u.role),
            Some(Role::SuperAdmin | Role::Admin)
        )
    }

    /// Active user is super_admin.
    pub async fn is_super_admin(&self) -> bool {
        matches!(
            self.current.read().await.as_ref().map(|u| u.role),
            Some(Role::SuperAdmin)
        )
    }
}
