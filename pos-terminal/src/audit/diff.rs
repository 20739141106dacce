//! 审计快照与字段差异
//!
//! 写入 `previous_value` / `new_value` 前按资源类型过滤敏感字段，
//! 更新操作额外生成字段级 diff 放进 `additional_info`。

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Value, json};

/// 字段变更记录
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub from: Value,
    pub to: Value,
}

/// 资源快照过滤配置
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// 永不写入审计的字段
    pub exclude_fields: &'static [&'static str],
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            exclude_fields: &["id"],
        }
    }
}

/// 获取资源的过滤配置
pub fn get_config(resource_type: &str) -> SnapshotConfig {
    match resource_type {
        "user" => SnapshotConfig {
            exclude_fields: &["id", "password_hash"],
        },
        "sensitive_data" => SnapshotConfig {
            exclude_fields: &["id", "encrypted_value"],
        },
        _ => SnapshotConfig::default(),
    }
}

static NULL: Value = Value::Null;

fn diff_json_recursive(from: &Value, to: &Value, path: &str, changes: &mut Vec<FieldChange>) {
    match (from, to) {
        (Value::Object(from_obj), Value::Object(to_obj)) => {
            // BTreeSet 保证输出顺序稳定
            let keys: BTreeSet<&String> = from_obj.keys().chain(to_obj.keys()).collect();

            for key in keys {
                let field_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };

                let f = from_obj.get(key).unwrap_or(&NULL);
                let t = to_obj.get(key).unwrap_or(&NULL);
                diff_json_recursive(f, t, &field_path, changes);
            }
        }
        (f, t) => {
            if f != t {
                changes.push(FieldChange {
                    field: path.to_string(),
                    from: f.clone(),
                    to: t.clone(),
                });
            }
        }
    }
}

fn filter_fields(value: &mut Value, exclude: &[&str]) {
    if let Value::Object(obj) = value {
        for field in exclude {
            obj.remove(*field);
        }
    }
}

fn to_filtered_value<T: Serialize>(value: &T, resource_type: &str) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(mut json) => {
            filter_fields(&mut json, get_config(resource_type).exclude_fields);
            Some(json)
        }
        Err(e) => {
            tracing::error!("Failed to serialize audit snapshot: {:?}", e);
            None
        }
    }
}

/// 过滤后的完整快照 (用于 create / delete)
pub fn create_snapshot<T: Serialize>(value: &T, resource_type: &str) -> Value {
    to_filtered_value(value, resource_type)
        .unwrap_or_else(|| json!({"error": "serialization_failed"}))
}

/// 更新前后的字段差异
///
/// 格式：`{"changes": [{"field": "role", "from": "cashier", "to": "manager"}]}`
pub fn create_diff<T: Serialize>(from: &T, to: &T, resource_type: &str) -> Value {
    let (Some(from_json), Some(to_json)) = (
        to_filtered_value(from, resource_type),
        to_filtered_value(to, resource_type),
    ) else {
        return json!({"error": "serialization_failed"});
    };

    let mut changes = Vec::new();
    diff_json_recursive(&from_json, &to_json, "", &mut changes);

    if changes.is_empty() {
        json!({"changes": [], "note": "no_changes_detected"})
    } else {
        json!({"changes": changes})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct TestUser {
        id: i64,
        username: String,
        password_hash: String,
        role: String,
        is_active: bool,
    }

    fn user(role: &str, active: bool) -> TestUser {
        TestUser {
            id: 1,
            username: "bob".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: role.to_string(),
            is_active: active,
        }
    }

    #[test]
    fn test_snapshot_filters_password_hash() {
        let snapshot = create_snapshot(&user("cashier", true), "user");
        let obj = snapshot.as_object().unwrap();

        assert!(obj.contains_key("username"));
        assert!(!obj.contains_key("id"));
        assert!(!obj.contains_key("password_hash"));
    }

    #[test]
    fn test_diff_lists_changed_fields_only() {
        let diff = create_diff(&user("cashier", true), &user("manager", false), "user");
        let changes = diff["changes"].as_array().unwrap();

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0]["field"], "is_active");
        assert_eq!(changes[1]["field"], "role");
        assert_eq!(changes[1]["from"], "cashier");
        assert_eq!(changes[1]["to"], "manager");
    }

    #[test]
    fn test_diff_no_changes() {
        let diff = create_diff(&user("admin", true), &user("admin", true), "user");
        assert!(diff["changes"].as_array().unwrap().is_empty());
        assert_eq!(diff["note"], "no_changes_detected");
    }

    #[test]
    fn test_nested_paths() {
        let from = json!({"meta": {"a": 1, "b": 2}});
        let to = json!({"meta": {"a": 1, "b": 3, "c": true}});
        let diff = create_diff(&from, &to, "other");
        let fields: Vec<&str> = diff["changes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["meta.b", "meta.c"]);
    }
}
