//! Permission Definitions
//!
//! Static role → permission matrix. Permissions are `"<resource>:<action>"`
//! strings; membership in the role's set is the only authorization fact.
//!
//! ## 角色
//! - admin: 全部权限
//! - manager: 除用户管理、系统设置修改、审计清理、敏感数据写入、恢复外的全部权限
//! - cashier: 收银所需的最小集合

use shared::Role;

/// 全部权限
pub const ALL_PERMISSIONS: &[&str] = &[
    // 商品与库存
    "product:read",
    "product:manage",
    "inventory:read",
    "inventory:manage",
    // 销售
    "sale:create",
    "sale:read",
    "sale:void",
    "sale:refund",
    // 报表
    "report:view",
    "report:generate",
    // 客户
    "customer:read",
    "customer:create",
    "customer:manage",
    // 用户与设置
    "user:manage",
    "setting:read",
    "setting:manage",
    // 审计
    "audit:read",
    "audit:export",
    "audit:purge",
    // 敏感数据
    "sensitive:read",
    "sensitive:write",
    // 备份恢复
    "backup:create",
    "restore:execute",
    // 工作流
    "workflow:configure",
];

/// 经理权限
pub const MANAGER_PERMISSIONS: &[&str] = &[
    "product:read",
    "product:manage",
    "inventory:read",
    "inventory:manage",
    "sale:create",
    "sale:read",
    "sale:void",
    "sale:refund",
    "report:view",
    "report:generate",
    "customer:read",
    "customer:create",
    "customer:manage",
    "setting:read",
    "audit:read",
    "audit:export",
    "sensitive:read",
    "backup:create",
    "workflow:configure",
];

/// 收银员权限
pub const CASHIER_PERMISSIONS: &[&str] = &[
    "product:read",
    "inventory:read",
    "sale:create",
    "sale:read",
    "customer:read",
    "customer:create",
];

/// Permission set granted to a role
pub fn permissions_for(role: Role) -> &'static [&'static str] {
    match role {
        Role::Admin => ALL_PERMISSIONS,
        Role::Manager => MANAGER_PERMISSIONS,
        Role::Cashier => CASHIER_PERMISSIONS,
    }
}

/// Pure set-membership lookup; unknown permissions are simply not granted
pub fn role_has_permission(role: Role, permission: &str) -> bool {
    permissions_for(role).contains(&permission)
}

/// Whether `permission` names a known permission
pub fn is_valid_permission(permission: &str) -> bool {
    ALL_PERMISSIONS.contains(&permission)
}
