//! Tunehall // Roles
//!
//! The concrete [`MemberRoles`] collaborator used in this process: a cache
//! fed by whatever chat-platform bridge sits in front of this service (role
//! resolution and authentication are explicitly out of scope here), updated
//! through `POST /roles/sync` and `POST /roles/forget`, and read
//! synchronously by the priority resolver.

use dashmap::DashMap;

use crate::priority::MemberRoles;

#[derive(Debug, Clone, Default)]
pub struct RoleRecord {
    pub roles: Vec<String>,
    pub is_administrator: bool,
    pub is_manager: bool,
}

/// A process-local cache of `(guild, user) -> RoleRecord`. Unknown members
/// default to no roles and no elevated standing, matching the original's
/// "treat unresolved members as the lowest priority class" behavior.
pub struct CachedMemberRoles {
    cache: DashMap<(String, String), RoleRecord>,
}

impl CachedMemberRoles {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    pub fn sync(&self, guild_id: String, user_id: String, record: RoleRecord) {
        self.cache.insert((guild_id, user_id), record);
    }

    pub fn forget(&self, guild_id: &str, user_id: &str) {
        self.cache.remove(&(guild_id.to_owned(), user_id.to_owned()));
    }
}

impl Default for CachedMemberRoles {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberRoles for CachedMemberRoles {
    fn roles(&self, guild_id: &str, user_id: &str) -> Vec<String> {
        self.cache
            .get(&(guild_id.to_owned(), user_id.to_owned()))
            .map(|r| r.roles.clone())
            .unwrap_or_default()
    }

    fn is_administrator(&self, guild_id: &str, user_id: &str) -> bool {
        self.cache
            .get(&(guild_id.to_owned(), user_id.to_owned()))
            .map(|r| r.is_administrator)
            .unwrap_or(false)
    }

    fn is_manager(&self, guild_id: &str, user_id: &str) -> bool {
        self.cache
            .get(&(guild_id.to_owned(), user_id.to_owned()))
            .map(|r| r.is_manager)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_member_defaults_to_no_standing() {
        let roles = CachedMemberRoles::new();
        assert!(roles.roles("g1", "u1").is_empty());
        assert!(!roles.is_administrator("g1", "u1"));
    }

    #[test]
    fn sync_then_forget_round_trip() {
        let roles = CachedMemberRoles::new();
        roles.sync(
            "g1".into(),
            "u1".into(),
            RoleRecord {
                roles: vec!["DJ".into()],
                is_administrator: false,
                is_manager: true,
            },
        );
        assert!(roles.is_manager("g1", "u1"));
        roles.forget("g1", "u1");
        assert!(!roles.is_manager("g1", "u1"));
    }
}
