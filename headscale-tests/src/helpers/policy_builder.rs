//! Builder for ACL policies used in tests

use headscale_e2e::AclPolicy;
use headscale_e2e::policy::{AclRule, AclTest};

/// Fluent construction of an [`AclPolicy`]
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    policy: AclPolicy,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: &str, members: &[&str]) -> Self {
        self.policy.groups.insert(
            format!("group:{}", group.trim_start_matches("group:")),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    pub fn with_host(mut self, name: &str, cidr: &str) -> Self {
        self.policy.hosts.insert(name.to_string(), cidr.to_string());
        self
    }

    pub fn with_tag_owner(mut self, tag: &str, owners: &[&str]) -> Self {
        self.policy.tag_owners.insert(
            format!("tag:{}", tag.trim_start_matches("tag:")),
            owners.iter().map(|o| o.to_string()).collect(),
        );
        self
    }

    pub fn accept(mut self, users: &[&str], ports: &[&str]) -> Self {
        self.policy.acls.push(AclRule::accept(users, ports));
        self
    }

    pub fn with_test(mut self, user: &str, allow: &[&str], deny: &[&str]) -> Self {
        self.policy.tests.push(AclTest {
            user: user.to_string(),
            allow: allow.iter().map(|a| a.to_string()).collect(),
            deny: deny.iter().map(|d| d.to_string()).collect(),
        });
        self
    }

    pub fn build(self) -> AclPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_are_normalized() {
        let policy = PolicyBuilder::new()
            .with_group("admins", &["user1"])
            .with_group("group:ops", &["user2"])
            .with_tag_owner("ci", &["group:admins"])
            .build();

        assert!(policy.groups.contains_key("group:admins"));
        assert!(policy.groups.contains_key("group:ops"));
        assert!(policy.tag_owners.contains_key("tag:ci"));
    }

    #[test]
    fn test_rules_keep_order() {
        let policy = PolicyBuilder::new()
            .accept(&["group:admins"], &["*:*"])
            .accept(&["user1"], &["tag:ci:22"])
            .with_test("user1", &["tag:ci:22"], &["tag:ci:80"])
            .build();

        assert_eq!(policy.acls.len(), 2);
        assert_eq!(policy.acls[1].users, vec!["user1"]);
        assert_eq!(policy.tests[0].deny, vec!["tag:ci:80"]);
    }
}
