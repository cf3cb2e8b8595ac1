//! The identity snapshot exposed to embedding applications.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::TokenClaims;

/// Application role derived from the numeric role level.
///
/// Levels: super_admin=100, admin=80, manager=60, editor=40, member=20,
/// viewer=10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Viewer,
    Member,
    Editor,
    Manager,
    Admin,
    SuperAdmin,
}

impl UserRole {
    /// Map a numeric role level onto the role ladder.
    pub fn from_level(level: i64) -> Self {
        if level >= 100 {
            UserRole::SuperAdmin
        } else if level >= 80 {
            UserRole::Admin
        } else if level >= 60 {
            UserRole::Manager
        } else if level >= 40 {
            UserRole::Editor
        } else if level >= 20 {
            UserRole::Member
        } else {
            UserRole::Viewer
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Viewer => "viewer",
            UserRole::Member => "member",
            UserRole::Editor => "editor",
            UserRole::Manager => "manager",
            UserRole::Admin => "admin",
            UserRole::SuperAdmin => "super_admin",
        }
    }
}

/// Subscription plan tier. Unrecognized plan strings fall back to `Starter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    Starter,
    Professional,
    Business,
    Enterprise,
}

impl SubscriptionPlan {
    pub fn parse(plan: &str) -> Self {
        match plan {
            "professional" => SubscriptionPlan::Professional,
            "business" => SubscriptionPlan::Business,
            "enterprise" => SubscriptionPlan::Enterprise,
            _ => SubscriptionPlan::Starter,
        }
    }
}

/// Subscription billing status. Unrecognized strings fall back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "incomplete" => SubscriptionStatus::Incomplete,
            _ => SubscriptionStatus::Active,
        }
    }
}

/// Authenticated identity built from decoded token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    /// Full name, falling back to the email local part.
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub organization_id: String,
    pub organization_name: String,
    pub organization_slug: String,
    pub role: UserRole,
    pub role_level: i64,
    pub is_owner: bool,
    pub permissions: Vec<String>,
    pub enabled_modules: Vec<String>,
    pub subscription_plan: SubscriptionPlan,
    pub subscription_status: SubscriptionStatus,
    pub plan_features: Vec<String>,
    pub plan_limits: HashMap<String, i64>,
    pub is_platform_admin: bool,
}

impl From<TokenClaims> for AuthUser {
    fn from(claims: TokenClaims) -> Self {
        let display_name = if claims.full_name.trim().is_empty() {
            claims.email.split('@').next().unwrap_or("").to_string()
        } else {
            claims.full_name.clone()
        };
        let avatar_url = if claims.avatar_url.is_empty() {
            None
        } else {
            Some(claims.avatar_url.clone())
        };

        Self {
            id: claims.sub,
            email: claims.email,
            display_name,
            avatar_url,
            organization_id: claims.organization_id,
            organization_name: claims.organization_name,
            organization_slug: claims.organization_slug,
            role: UserRole::from_level(claims.app_role_level),
            role_level: claims.app_role_level,
            is_owner: claims.is_owner,
            permissions: claims.permissions,
            enabled_modules: claims.enabled_modules,
            subscription_plan: SubscriptionPlan::parse(&claims.subscription_plan),
            subscription_status: SubscriptionStatus::parse(&claims.subscription_status),
            plan_features: claims.plan_features,
            plan_limits: claims.plan_limits,
            is_platform_admin: claims.is_platform_admin,
        }
    }
}

impl AuthUser {
    /// Owners and super admins pass every permission and module check.
    fn is_privileged(&self) -> bool {
        self.is_owner || self.role == UserRole::SuperAdmin
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_privileged() || self.permissions.iter().any(|p| p == permission)
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.is_privileged() || self.enabled_modules.iter().any(|m| m == module)
    }

    /// Permission check with an optional module gate on top.
    pub fn can_access(&self, permission: &str, module: Option<&str>) -> bool {
        if !self.has_permission(permission) {
            return false;
        }
        match module {
            Some(module) => self.has_module(module),
            None => true,
        }
    }

    /// Plan features are not subject to the privilege bypass; they gate what
    /// the subscription paid for, not what the user may do.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.plan_features.iter().any(|f| f == feature)
    }

    /// Whether `current` is within the plan's limit for `key`.
    ///
    /// An absent limit or a limit of -1 means unlimited.
    pub fn check_limit(&self, key: &str, current: i64) -> bool {
        match self.plan_limits.get(key) {
            None => true,
            Some(-1) => true,
            Some(limit) => current < *limit,
        }
    }

    pub fn is_admin_level(&self) -> bool {
        self.role >= UserRole::Admin
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == UserRole::SuperAdmin
    }

    /// Active and trialing subscriptions both count as live.
    pub fn subscription_active(&self) -> bool {
        matches!(
            self.subscription_status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }
}
