use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An authenticated actor as handed over by the RBAC subsystem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub roles: HashSet<String>,
    #[serde(default)]
    pub permissions: HashSet<String>,
    pub department: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_permission(mut self, code: impl Into<String>) -> Self {
        self.permissions.insert(code.into());
        self
    }

    pub fn in_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Permission lookup supplied by the authorization subsystem
pub trait PermissionProvider: Send + Sync {
    fn has_permission(&self, actor: &Actor, code: &str) -> bool;
}

/// Reads the permission set carried on the actor itself
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorPermissions;

impl PermissionProvider for ActorPermissions {
    fn has_permission(&self, actor: &Actor, code: &str) -> bool {
        actor.permissions.contains(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_permissions() {
        let actor = Actor::new("agent-1")
            .with_role("supervisor")
            .with_permission("incident.approve");

        assert!(ActorPermissions.has_permission(&actor, "incident.approve"));
        assert!(!ActorPermissions.has_permission(&actor, "incident.close"));
        assert!(actor.has_role("supervisor"));
    }
}
