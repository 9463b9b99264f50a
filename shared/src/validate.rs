//! Payload validation, defaults and string scrubbing.
//!
//! Rules run before any backend I/O. `add` applies the full per-kind rule
//! set plus defaults; `update` validates only the fields present in the
//! patch, so a partial patch never trips a required-field rule.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::errors::{Result, StoreError};
use crate::rbac::Role;
use crate::ResourceKind;

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script>").expect("script block pattern"));
static JS_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript:").expect("javascript scheme pattern"));
static INLINE_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)on\w+\s*=").expect("inline handler pattern"));

/// Validate a create payload, apply per-kind defaults and the string scrub,
/// and stamp `createdAt`. Returns the cleaned payload.
pub fn clean_for_create(kind: ResourceKind, payload: &Value) -> Result<Value> {
    let mut record = as_object(kind, payload)?;
    validate_fields(kind, &record, true)?;
    apply_defaults(kind, &mut record);
    scrub_strings(&mut record);
    record.insert("createdAt".into(), json!(Utc::now().to_rfc3339()));
    Ok(Value::Object(record))
}

/// Validate an update patch (present fields only), scrub it, and stamp
/// `updatedAt`. Returns the cleaned patch.
pub fn clean_for_update(kind: ResourceKind, patch: &Value) -> Result<Value> {
    let mut record = as_object(kind, patch)?;
    validate_fields(kind, &record, false)?;
    scrub_strings(&mut record);
    record.insert("updatedAt".into(), json!(Utc::now().to_rfc3339()));
    Ok(Value::Object(record))
}

/// Today's UTC date as `YYYY-MM-DD`.
pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Default avatar URL derived from a link name.
pub fn default_avatar(name: &str) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}&size=200&background=4fc3f7&color=fff&bold=true",
        urlencoding::encode(name)
    )
}

fn as_object(kind: ResourceKind, payload: &Value) -> Result<Map<String, Value>> {
    match payload {
        Value::Object(map) => Ok(map.clone()),
        _ => Err(invalid(kind, "数据必须是对象")),
    }
}

fn invalid(kind: ResourceKind, reason: &str) -> StoreError {
    StoreError::ValidationFailed {
        kind: kind.as_str().to_string(),
        reason: reason.to_string(),
    }
}

/// Required-field and shape rules. With `require_all` set (create), absent
/// required fields fail; otherwise (update) only present fields are checked.
fn validate_fields(
    kind: ResourceKind,
    record: &Map<String, Value>,
    require_all: bool,
) -> Result<()> {
    let require = |field: &str, message: &str| -> Result<()> {
        match record.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
            Some(_) => Err(invalid(kind, message)),
            None if require_all => Err(invalid(kind, message)),
            None => Ok(()),
        }
    };

    match kind {
        ResourceKind::Articles => {
            require("title", "文章标题不能为空")?;
            require("content", "文章内容不能为空")?;
        }
        ResourceKind::Categories | ResourceKind::Tags => {
            require("name", "名称不能为空")?;
        }
        ResourceKind::Users => {
            // Shape-only here; the account guards own the stricter rules.
            if let Some(role) = record.get("role") {
                let valid = role
                    .as_str()
                    .map(|r| r.parse::<Role>().is_ok())
                    .unwrap_or(false);
                if !valid {
                    return Err(invalid(kind, "无效的用户角色"));
                }
            }
        }
        ResourceKind::Comments => {
            require("content", "评论内容不能为空")?;
        }
        ResourceKind::Guestbook => {
            require("content", "留言内容不能为空")?;
        }
        ResourceKind::Images => {
            require("filename", "文件名不能为空")?;
            require("url", "图片URL不能为空")?;
        }
        ResourceKind::Music => {
            require("title", "音乐标题不能为空")?;
        }
        ResourceKind::Videos => {
            require("title", "视频标题不能为空")?;
        }
        ResourceKind::Links => {
            require("name", "链接名称不能为空")?;
            require("url", "链接URL不能为空")?;
        }
    }
    Ok(())
}

/// Create-time defaults. Zero/absent values are treated as unset, matching
/// the layer this mirrors.
fn apply_defaults(kind: ResourceKind, record: &mut Map<String, Value>) {
    let default = |record: &mut Map<String, Value>, field: &str, value: Value| {
        let unset = match record.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            _ => false,
        };
        if unset {
            record.insert(field.to_string(), value);
        }
    };

    match kind {
        ResourceKind::Articles => {
            default(record, "views", json!(0));
            default(record, "likes", json!(0));
            default(record, "status", json!("draft"));
            default(record, "publishDate", json!(today()));
        }
        ResourceKind::Categories | ResourceKind::Tags => {
            default(record, "count", json!(0));
        }
        ResourceKind::Users => {
            default(record, "role", json!(Role::Editor.as_str()));
            default(record, "status", json!("active"));
            let username = record
                .get("username")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            default(record, "displayName", json!(username));
        }
        ResourceKind::Comments => {
            default(record, "status", json!("pending"));
            default(record, "likes", json!(0));
        }
        ResourceKind::Guestbook => {
            default(record, "likes", json!(0));
            default(record, "isTop", json!(false));
        }
        ResourceKind::Links => {
            default(record, "description", json!(""));
            default(record, "category", json!("默认"));
            default(record, "status", json!("active"));
            let name = record
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Link")
                .to_string();
            default(record, "avatar", json!(default_avatar(&name)));
            default(record, "addedDate", json!(today()));
        }
        ResourceKind::Images | ResourceKind::Music | ResourceKind::Videos => {}
    }
}

/// Strip script blocks, `javascript:` URLs and inline event handlers from
/// every top-level string field.
fn scrub_strings(record: &mut Map<String, Value>) {
    for value in record.values_mut() {
        if let Value::String(s) = value {
            let cleaned = SCRIPT_BLOCK.replace_all(s, "");
            let cleaned = JS_SCHEME.replace_all(&cleaned, "");
            let cleaned = INLINE_HANDLER.replace_all(&cleaned, "");
            *s = cleaned.into_owned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_article_title_and_content() {
        let err = clean_for_create(ResourceKind::Articles, &json!({"content": "正文"}))
            .expect_err("missing title");
        assert!(err.to_string().contains("文章标题不能为空"));

        let err = clean_for_create(ResourceKind::Articles, &json!({"title": "标题"}))
            .expect_err("missing content");
        assert!(err.to_string().contains("文章内容不能为空"));
    }

    #[test]
    fn create_applies_article_defaults() {
        let record = clean_for_create(
            ResourceKind::Articles,
            &json!({"title": "标题", "content": "正文"}),
        )
        .expect("valid article");
        assert_eq!(record["views"], json!(0));
        assert_eq!(record["likes"], json!(0));
        assert_eq!(record["status"], json!("draft"));
        assert_eq!(record["publishDate"], json!(today()));
        assert!(record.get("createdAt").is_some());
    }

    #[test]
    fn update_ignores_absent_required_fields() {
        let patch =
            clean_for_update(ResourceKind::Articles, &json!({"status": "published"}))
                .expect("partial patch");
        assert_eq!(patch["status"], json!("published"));
        assert!(patch.get("updatedAt").is_some());
        assert!(patch.get("title").is_none());
    }

    #[test]
    fn update_still_rejects_present_but_empty_fields() {
        let err = clean_for_update(ResourceKind::Articles, &json!({"title": "  "}))
            .expect_err("blank title");
        assert!(matches!(err, StoreError::ValidationFailed { .. }));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = clean_for_create(
            ResourceKind::Users,
            &json!({"username": "li_si", "password": "secret", "role": "owner"}),
        )
        .expect_err("bad role");
        assert!(err.to_string().contains("无效的用户角色"));
    }

    #[test]
    fn user_defaults_fill_role_and_display_name() {
        let record = clean_for_create(
            ResourceKind::Users,
            &json!({"username": "li_si", "password": "secret"}),
        )
        .expect("valid user");
        assert_eq!(record["role"], json!("editor"));
        assert_eq!(record["status"], json!("active"));
        assert_eq!(record["displayName"], json!("li_si"));
    }

    #[test]
    fn link_defaults_include_generated_avatar() {
        let record = clean_for_create(
            ResourceKind::Links,
            &json!({"name": "友链", "url": "https://example.com"}),
        )
        .expect("valid link");
        assert_eq!(record["category"], json!("默认"));
        assert_eq!(record["status"], json!("active"));
        let avatar = record["avatar"].as_str().unwrap_or_default();
        assert!(avatar.starts_with("https://ui-avatars.com/api/?name="));
        assert_eq!(record["addedDate"], json!(today()));
    }

    #[test]
    fn scrub_removes_dangerous_fragments() {
        let record = clean_for_create(
            ResourceKind::Guestbook,
            &json!({
                "content": "你好<script>alert(1)</script>世界",
                "website": "javascript:alert(2)",
                "author": "x onclick= y",
            }),
        )
        .expect("valid message");
        assert_eq!(record["content"], json!("你好世界"));
        assert_eq!(record["website"], json!("alert(2)"));
        assert_eq!(record["author"], json!("x  y"));
    }
}
