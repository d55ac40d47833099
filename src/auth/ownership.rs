use crate::types::User;

/// Admins may act in every namespace; members only in the one named after them.
#[must_use]
pub fn can_access(user: &User, namespace: &str) -> bool {
    user.is_admin() || user.username == namespace
}
