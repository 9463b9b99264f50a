//! Account management guards over the repository's `users` collection.
//!
//! The repository treats users as open records like any other kind. The
//! rules that make accounts special (username shape and immutability,
//! password length, the self/role/last-super-admin guards) live here,
//! parameterized by the acting user.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::{Result, StoreError};
use crate::rbac::{ActiveUser, Role};
use crate::repository::Repository;
use crate::{record_id, ResourceKind};

static USERNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,20}$").expect("username pattern"));

const MIN_PASSWORD_LEN: usize = 6;

/// Login attempt result, mirroring the `{success, message, profile}` shape
/// consumers of this layer expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOutcome {
    /// Whether the credentials checked out.
    pub success: bool,
    /// Human-readable outcome message.
    pub message: String,
    /// Present on success only.
    pub profile: Option<UserProfile>,
}

/// Public profile of a logged-in user; never carries the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Login name.
    pub username: String,
    /// Granted role.
    pub role: Role,
    /// Display name, defaulted to the username at creation.
    pub display_name: String,
    /// Contact address, when set.
    pub email: Option<String>,
}

/// Aggregate account counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    /// All accounts.
    pub total: usize,
    /// Accounts with `status == "active"`.
    pub active: usize,
    /// Everything else.
    pub inactive: usize,
    /// super_admin and admin accounts.
    pub admins: usize,
    /// editor accounts.
    pub editors: usize,
}

/// Guarded account operations.
pub struct AccountManager {
    repo: Arc<Repository>,
}

impl AccountManager {
    /// Manager over `repo`.
    pub fn new(repo: Arc<Repository>) -> Self {
        AccountManager { repo }
    }

    /// Create an account. Username shape, password length and uniqueness
    /// are enforced here; defaults (role `editor`, status `active`,
    /// displayName) come from the create validation.
    pub async fn add_user(&self, payload: &Value) -> Result<Value> {
        let username = payload
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let password = payload
            .get("password")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if username.is_empty() || password.is_empty() {
            return Err(guard("用户名和密码不能为空"));
        }
        if !USERNAME.is_match(username) {
            return Err(guard("用户名只能包含字母、数字和下划线，长度3-20位"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(guard("密码至少需要6位"));
        }
        if self.find_by_username(username).await?.is_some() {
            return Err(guard("用户名已存在"));
        }

        self.repo.add(ResourceKind::Users, payload).await
    }

    /// Update an account. The username is immutable; role changes demand a
    /// super_admin actor and never target the actor itself; a present
    /// password is re-checked for length. `None` for unknown usernames.
    pub async fn update_user(
        &self,
        actor: &ActiveUser,
        username: &str,
        patch: &Value,
    ) -> Result<Option<Value>> {
        let Some(user) = self.find_by_username(username).await? else {
            return Ok(None);
        };

        if let Some(new_name) = patch.get("username").and_then(Value::as_str) {
            if new_name != username {
                return Err(guard("不允许修改用户名"));
            }
        }
        if patch.get("role").is_some() {
            if actor.role != Role::SuperAdmin {
                return Err(guard("只有超级管理员可以修改用户角色"));
            }
            if actor.username == username {
                return Err(guard("不能修改自己的角色"));
            }
        }
        if let Some(password) = patch.get("password").and_then(Value::as_str) {
            if password.chars().count() < MIN_PASSWORD_LEN {
                return Err(guard("密码至少需要6位"));
            }
        }

        // Keep the username field out of the stored patch.
        let mut patch = match patch {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        patch.remove("username");

        self.repo
            .update(ResourceKind::Users, &record_id(&user), &Value::Object(patch))
            .await
    }

    /// Delete an account. Never the actor's own, never the last
    /// super_admin. `false` for unknown usernames.
    pub async fn delete_user(&self, actor: &ActiveUser, username: &str) -> Result<bool> {
        if actor.username == username {
            return Err(guard("不能删除当前登录的用户"));
        }
        let Some(user) = self.find_by_username(username).await? else {
            return Ok(false);
        };

        let is_super = user.get("role").and_then(Value::as_str) == Some(Role::SuperAdmin.as_str());
        if is_super {
            let users = self.repo.list(ResourceKind::Users, None).await?;
            let supers = users
                .iter()
                .filter(|u| u.get("role").and_then(Value::as_str) == Some(Role::SuperAdmin.as_str()))
                .count();
            if supers <= 1 {
                return Err(guard("不能删除最后一个超级管理员"));
            }
        }

        self.repo
            .delete(ResourceKind::Users, &record_id(&user))
            .await
    }

    /// Check credentials; no session is issued. Failure messages
    /// distinguish unknown username, disabled account and wrong password.
    pub async fn validate_login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let Some(user) = self.find_by_username(username).await? else {
            return Ok(LoginOutcome {
                success: false,
                message: "用户名不存在".to_string(),
                profile: None,
            });
        };

        let status = user.get("status").and_then(Value::as_str).unwrap_or("active");
        if status != "active" {
            return Ok(LoginOutcome {
                success: false,
                message: "用户已被禁用".to_string(),
                profile: None,
            });
        }

        if user.get("password").and_then(Value::as_str) != Some(password) {
            return Ok(LoginOutcome {
                success: false,
                message: "密码错误".to_string(),
                profile: None,
            });
        }

        tracing::info!(username, "login validated");
        Ok(LoginOutcome {
            success: true,
            message: "登录成功".to_string(),
            profile: Some(profile_of(&user)),
        })
    }

    /// Replace an account's password after the length guard. `None` for
    /// unknown usernames.
    pub async fn change_password(&self, username: &str, new_password: &str) -> Result<Option<Value>> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(guard("新密码至少需要6位"));
        }
        let Some(user) = self.find_by_username(username).await? else {
            return Ok(None);
        };
        self.repo
            .update(
                ResourceKind::Users,
                &record_id(&user),
                &json!({ "password": new_password }),
            )
            .await
    }

    /// Aggregate account counts.
    pub async fn user_stats(&self) -> Result<UserStats> {
        let users = self.repo.list(ResourceKind::Users, None).await?;
        let role_of = |user: &Value| {
            user.get("role")
                .and_then(Value::as_str)
                .and_then(|r| r.parse::<Role>().ok())
        };
        let active = users
            .iter()
            .filter(|u| u.get("status").and_then(Value::as_str).unwrap_or("active") == "active")
            .count();
        Ok(UserStats {
            total: users.len(),
            active,
            inactive: users.len() - active,
            admins: users
                .iter()
                .filter(|u| matches!(role_of(u), Some(Role::SuperAdmin | Role::Admin)))
                .count(),
            editors: users
                .iter()
                .filter(|u| matches!(role_of(u), Some(Role::Editor)))
                .count(),
        })
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Value>> {
        let users = self.repo.list(ResourceKind::Users, None).await?;
        Ok(users
            .into_iter()
            .find(|u| u.get("username").and_then(Value::as_str) == Some(username)))
    }
}

fn guard(reason: &str) -> StoreError {
    StoreError::ValidationFailed {
        kind: ResourceKind::Users.as_str().to_string(),
        reason: reason.to_string(),
    }
}

fn profile_of(user: &Value) -> UserProfile {
    let username = user
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    UserProfile {
        role: user
            .get("role")
            .and_then(Value::as_str)
            .and_then(|r| r.parse().ok())
            .unwrap_or(Role::Viewer),
        display_name: user
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or(&username)
            .to_string(),
        email: user
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string),
        username,
    }
}

#[cfg(test)]
mod tests {
    use crate::environment::BackendMode;
    use crate::snapshot::SnapshotStore;

    use super::*;

    fn manager() -> AccountManager {
        let store = Arc::new(SnapshotStore::open_in_memory().expect("store"));
        AccountManager::new(Arc::new(Repository::new(BackendMode::LocalCache, store)))
    }

    fn actor(name: &str, role: Role) -> ActiveUser {
        ActiveUser {
            username: name.to_string(),
            role,
        }
    }

    async fn seeded() -> AccountManager {
        let manager = manager();
        manager
            .add_user(&json!({
                "username": "admin",
                "password": "admin123",
                "role": "super_admin",
            }))
            .await
            .expect("seed super admin");
        manager
    }

    #[tokio::test]
    async fn add_user_enforces_shape_rules() {
        let manager = manager();

        let err = manager
            .add_user(&json!({"username": "ab", "password": "secret1"}))
            .await
            .expect_err("short username");
        assert!(err.to_string().contains("3-20位"));

        let err = manager
            .add_user(&json!({"username": "li_si", "password": "abc"}))
            .await
            .expect_err("short password");
        assert!(err.to_string().contains("密码至少需要6位"));

        manager
            .add_user(&json!({"username": "li_si", "password": "secret1"}))
            .await
            .expect("valid");
        let err = manager
            .add_user(&json!({"username": "li_si", "password": "secret2"}))
            .await
            .expect_err("duplicate");
        assert!(err.to_string().contains("用户名已存在"));
    }

    #[tokio::test]
    async fn username_is_immutable() {
        let manager = seeded().await;
        let err = manager
            .update_user(
                &actor("admin", Role::SuperAdmin),
                "admin",
                &json!({"username": "root"}),
            )
            .await
            .expect_err("rename attempt");
        assert!(err.to_string().contains("不允许修改用户名"));
    }

    #[tokio::test]
    async fn role_change_guards() {
        let manager = seeded().await;
        manager
            .add_user(&json!({"username": "li_si", "password": "secret1"}))
            .await
            .expect("add editor");

        // Non-super actors cannot change roles at all.
        let err = manager
            .update_user(
                &actor("li_si", Role::Editor),
                "li_si",
                &json!({"role": "admin"}),
            )
            .await
            .expect_err("editor changing role");
        assert!(err.to_string().contains("只有超级管理员"));

        // Even a super_admin cannot change their own role.
        let err = manager
            .update_user(
                &actor("admin", Role::SuperAdmin),
                "admin",
                &json!({"role": "viewer"}),
            )
            .await
            .expect_err("self role change");
        assert!(err.to_string().contains("不能修改自己的角色"));

        // Super admin changing another user works.
        let updated = manager
            .update_user(
                &actor("admin", Role::SuperAdmin),
                "li_si",
                &json!({"role": "admin"}),
            )
            .await
            .expect("update")
            .expect("present");
        assert_eq!(updated["role"], json!("admin"));
    }

    #[tokio::test]
    async fn delete_guards() {
        let manager = seeded().await;
        manager
            .add_user(&json!({"username": "li_si", "password": "secret1"}))
            .await
            .expect("add editor");

        let err = manager
            .delete_user(&actor("admin", Role::SuperAdmin), "admin")
            .await
            .expect_err("self delete");
        assert!(err.to_string().contains("不能删除当前登录的用户"));

        // admin is the only super_admin, so nobody may delete it.
        let err = manager
            .delete_user(&actor("li_si", Role::Editor), "admin")
            .await
            .expect_err("last super admin");
        assert!(err.to_string().contains("最后一个超级管理员"));

        assert!(manager
            .delete_user(&actor("admin", Role::SuperAdmin), "li_si")
            .await
            .expect("delete"));
        assert!(!manager
            .delete_user(&actor("admin", Role::SuperAdmin), "ghost")
            .await
            .expect("absent is false"));
    }

    #[tokio::test]
    async fn login_outcomes() {
        let manager = seeded().await;

        let unknown = manager
            .validate_login("ghost", "whatever")
            .await
            .expect("login");
        assert!(!unknown.success);
        assert_eq!(unknown.message, "用户名不存在");

        let wrong = manager
            .validate_login("admin", "nope")
            .await
            .expect("login");
        assert!(!wrong.success);
        assert_eq!(wrong.message, "密码错误");

        let ok = manager
            .validate_login("admin", "admin123")
            .await
            .expect("login");
        assert!(ok.success);
        let profile = ok.profile.expect("profile");
        assert_eq!(profile.username, "admin");
        assert_eq!(profile.role, Role::SuperAdmin);

        // Disabled accounts cannot log in even with the right password.
        manager
            .update_user(
                &actor("admin", Role::SuperAdmin),
                "admin",
                &json!({"status": "disabled"}),
            )
            .await
            .expect("disable");
        let disabled = manager
            .validate_login("admin", "admin123")
            .await
            .expect("login");
        assert!(!disabled.success);
        assert_eq!(disabled.message, "用户已被禁用");
    }

    #[tokio::test]
    async fn password_change_and_stats() {
        let manager = seeded().await;
        manager
            .add_user(&json!({"username": "li_si", "password": "secret1"}))
            .await
            .expect("add editor");

        let err = manager
            .change_password("li_si", "short")
            .await
            .expect_err("short password");
        assert!(err.to_string().contains("新密码至少需要6位"));

        manager
            .change_password("li_si", "longer-secret")
            .await
            .expect("change")
            .expect("present");
        let login = manager
            .validate_login("li_si", "longer-secret")
            .await
            .expect("login");
        assert!(login.success);

        let stats = manager.user_stats().await.expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.admins, 1);
        assert_eq!(stats.editors, 1);
    }
}
