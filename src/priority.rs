//! Tunehall // Priority
//!
//! Maps `(guild, user)` to an integer weight and the capability flags derived
//! from it. Role lookups are delegated to a [`MemberRoles`] implementation so
//! the resolver never depends on a concrete chat-platform client.

use std::collections::HashMap;

use crate::track::Track;

/// Default per-role weights, overridable via `PRIORITY_ROLE_WEIGHTS`.
const DEFAULT_ADMIN_WEIGHT: i64 = 100;
const DEFAULT_MANAGER_WEIGHT: i64 = 90;
const DEFAULT_ROLE_WEIGHT: i64 = 10;

/// Weight assigned to the configured owner id, dominant over every role.
pub const OWNER_WEIGHT: i64 = 10_000;

/// Per-chat-platform membership facts the resolver needs, kept behind a
/// trait so tests can supply a fake instead of a real gateway client.
pub trait MemberRoles: Send + Sync {
    /// Named roles the user holds in `guild`, in no particular order.
    fn roles(&self, guild_id: &str, user_id: &str) -> Vec<String>;

    fn is_administrator(&self, guild_id: &str, user_id: &str) -> bool;

    fn is_manager(&self, guild_id: &str, user_id: &str) -> bool;
}

/// Resolves weights and authorization decisions for a guild.
pub struct PriorityResolver {
    role_weights: HashMap<String, i64>,
    owner_id: Option<String>,
    per_user_cap: usize,
}

impl PriorityResolver {
    pub fn new(role_weights: HashMap<String, i64>, owner_id: Option<String>, per_user_cap: usize) -> Self {
        Self {
            role_weights,
            owner_id,
            per_user_cap,
        }
    }

    fn role_weight(&self, role: &str) -> Option<i64> {
        self.role_weights.get(role).copied()
    }

    /// Computes a member's weight: owner override, then admin/manager
    /// override (itself raised by any named role that scores higher), then
    /// the best matching named role, falling back to the default weight.
    pub fn weight(&self, roles: &dyn MemberRoles, guild_id: &str, user_id: &str) -> i64 {
        if self.owner_id.as_deref() == Some(user_id) {
            return OWNER_WEIGHT;
        }

        let best_named = roles
            .roles(guild_id, user_id)
            .iter()
            .filter_map(|r| self.role_weight(r))
            .max();

        if roles.is_administrator(guild_id, user_id) {
            return best_named
                .unwrap_or(DEFAULT_ADMIN_WEIGHT)
                .max(DEFAULT_ADMIN_WEIGHT);
        }

        if roles.is_manager(guild_id, user_id) {
            return best_named
                .unwrap_or(DEFAULT_MANAGER_WEIGHT)
                .max(DEFAULT_MANAGER_WEIGHT);
        }

        best_named.unwrap_or(DEFAULT_ROLE_WEIGHT)
    }

    pub fn bypass_quota(&self, roles: &dyn MemberRoles, guild_id: &str, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id)
            || roles.is_administrator(guild_id, user_id)
            || roles.is_manager(guild_id, user_id)
    }

    /// A bump is allowed only if the requester's weight is strictly greater
    /// than the currently playing track's owner-weight, or the requester
    /// bypasses quota outright.
    pub fn can_bump_over(
        &self,
        roles: &dyn MemberRoles,
        guild_id: &str,
        requester_id: &str,
        owner_weight: i64,
    ) -> bool {
        if self.bypass_quota(roles, guild_id, requester_id) {
            return true;
        }
        self.weight(roles, guild_id, requester_id) > owner_weight
    }

    /// A user may edit an item if they own it, are an admin, or outweigh it.
    pub fn can_edit_item(
        &self,
        roles: &dyn MemberRoles,
        guild_id: &str,
        user_id: &str,
        track: &Track,
    ) -> bool {
        if track.requested_by == user_id {
            return true;
        }
        if roles.is_administrator(guild_id, user_id) {
            return true;
        }
        self.weight(roles, guild_id, user_id) > track.priority
    }

    pub fn per_user_cap(&self) -> usize {
        self.per_user_cap
    }

    /// Index of the first queued item in the "normal band" (`priority == 0`).
    pub fn first_non_priority_index(&self, queue: &[Track]) -> usize {
        queue
            .iter()
            .position(|t| t.priority == 0)
            .unwrap_or(queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRoles {
        roles: HashMap<(String, String), Vec<String>>,
        admins: Vec<(String, String)>,
        managers: Vec<(String, String)>,
    }

    impl FakeRoles {
        fn new() -> Self {
            Self {
                roles: HashMap::new(),
                admins: Vec::new(),
                managers: Vec::new(),
            }
        }

        fn with_role(mut self, guild: &str, user: &str, role: &str) -> Self {
            self.roles
                .entry((guild.to_owned(), user.to_owned()))
                .or_default()
                .push(role.to_owned());
            self
        }

        fn with_admin(mut self, guild: &str, user: &str) -> Self {
            self.admins.push((guild.to_owned(), user.to_owned()));
            self
        }
    }

    impl MemberRoles for FakeRoles {
        fn roles(&self, guild_id: &str, user_id: &str) -> Vec<String> {
            self.roles
                .get(&(guild_id.to_owned(), user_id.to_owned()))
                .cloned()
                .unwrap_or_default()
        }

        fn is_administrator(&self, guild_id: &str, user_id: &str) -> bool {
            self.admins.contains(&(guild_id.to_owned(), user_id.to_owned()))
        }

        fn is_manager(&self, guild_id: &str, user_id: &str) -> bool {
            self.managers.contains(&(guild_id.to_owned(), user_id.to_owned()))
        }
    }

    fn default_weights() -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("DJ".to_owned(), 80);
        m.insert("VIP".to_owned(), 60);
        m
    }

    #[test]
    fn owner_outweighs_everyone() {
        let resolver = PriorityResolver::new(default_weights(), Some("owner-1".into()), 10);
        let roles = FakeRoles::new();
        assert_eq!(resolver.weight(&roles, "g1", "owner-1"), OWNER_WEIGHT);
    }

    #[test]
    fn named_role_beats_default() {
        let resolver = PriorityResolver::new(default_weights(), None, 10);
        let roles = FakeRoles::new().with_role("g1", "u1", "DJ");
        assert_eq!(resolver.weight(&roles, "g1", "u1"), 80);
    }

    #[test]
    fn admin_takes_max_with_named_roles() {
        let resolver = PriorityResolver::new(default_weights(), None, 10);
        let roles = FakeRoles::new().with_role("g1", "u1", "DJ").with_admin("g1", "u1");
        // admin default (100) beats DJ (80)
        assert_eq!(resolver.weight(&roles, "g1", "u1"), 100);
    }

    #[test]
    fn can_bump_over_requires_strictly_greater_weight() {
        let resolver = PriorityResolver::new(default_weights(), None, 10);
        let roles = FakeRoles::new().with_role("g1", "u1", "VIP");
        assert!(!resolver.can_bump_over(&roles, "g1", "u1", 60));
        assert!(resolver.can_bump_over(&roles, "g1", "u1", 59));
    }
}
