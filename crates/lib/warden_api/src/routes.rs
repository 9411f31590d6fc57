//! Route paths.

pub const GET_HEALTH: &str = "/api/health";

pub const POST_AUTH_LOGIN: &str = "/api/auth/login";
pub const POST_AUTH_REFRESH: &str = "/api/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/api/auth/logout";
pub const GET_AUTH_ME: &str = "/api/auth/me";
pub const POST_AUTH_CHANGE_PASSWORD: &str = "/api/auth/change-password";
pub const POST_AUTH_ADMIN_RESET_PASSWORD: &str = "/api/auth/admin/reset-password";

/// `GET` lists, `POST` creates.
pub const ROLES: &str = "/api/roles";
/// `GET` fetches, `PUT` updates, `DELETE` removes.
pub const ROLE: &str = "/api/roles/{role_id}";
pub const POST_ROLE_PERMISSIONS: &str = "/api/roles/{role_id}/permissions";

/// `GET` lists, `POST` creates.
pub const PERMISSIONS: &str = "/api/permissions";
pub const POST_CHECK_PERMISSION: &str = "/api/check-permission";

/// `GET` lists, `POST` creates.
pub const USERS: &str = "/api/users";
/// `GET` fetches, `PUT` updates, `DELETE` removes.
pub const USER: &str = "/api/users/{user_id}";
/// `GET` lists, `POST` replaces.
pub const USER_ROLES: &str = "/api/users/{user_id}/roles";
