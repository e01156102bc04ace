//! The package's bridge configuration, read once at startup.

use serde::{Deserialize, Serialize};

/// A permission the package declares. The session's granted-permission bits
/// index into the view info's permission list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PermissionDef {
    pub name: String,
    pub title: String,
    pub description: String,
}

/// Display metadata and permission declarations, returned verbatim to the
/// host on `getViewInfo`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewInfo {
    pub permissions: Vec<PermissionDef>,
}

/// Typed configuration message for one package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub view_info: ViewInfo,
    /// URL path prefix for API sessions. Empty disables API sessions.
    pub api_path: String,
}
