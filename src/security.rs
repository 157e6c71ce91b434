//! Security collaborator.

use std::fmt;

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;

use crate::descriptors::InterfaceType;

/// The identity a call runs as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Principal(name.into())
    }

    /// The unauthenticated identity.
    pub fn anonymous() -> Self {
        Principal("guest".to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The method a caller is trying to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRef<'a> {
    pub deployment_id: &'a str,
    pub interface_class: &'a str,
    pub method: &'a str,
}

/// Authorization and identity queries.
pub trait SecurityService: Send + Sync {
    fn is_caller_authorized(&self, method: &MethodRef<'_>, interface_type: InterfaceType) -> bool;
    fn caller_principal(&self) -> Principal;
    fn is_caller_in_role(&self, role: &str) -> bool;
}

/// Authorizes every call as the anonymous principal with no roles.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermitAll;

impl SecurityService for PermitAll {
    fn is_caller_authorized(&self, _method: &MethodRef<'_>, _interface_type: InterfaceType) -> bool {
        true
    }

    fn caller_principal(&self) -> Principal {
        Principal::anonymous()
    }

    fn is_caller_in_role(&self, _role: &str) -> bool {
        false
    }
}

/// Method permissions checked against the current identity's roles.
///
/// Methods listed with [`deny_all`](Self::deny_all) are never callable; methods
/// given roles with [`permit`](Self::permit) require one of them unless also
/// marked [`unchecked`](Self::unchecked); anything else is unchecked.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::{RoleBasedSecurity, SecurityService, MethodRef, InterfaceType, Principal};
///
/// let security = RoleBasedSecurity::new()
///     .permit("Counter", "reset", ["admin"])
///     .deny_all("Counter", "shutdown");
///
/// let reset = MethodRef { deployment_id: "Counter", interface_class: "CounterLocal", method: "reset" };
/// assert!(!security.is_caller_authorized(&reset, InterfaceType::BusinessLocal));
///
/// security.run_as(Principal::new("alice"), ["admin"]);
/// assert!(security.is_caller_authorized(&reset, InterfaceType::BusinessLocal));
/// assert_eq!(security.caller_principal().name(), "alice");
/// ```
#[derive(Debug)]
pub struct RoleBasedSecurity {
    identity: RwLock<Identity>,
    permissions: AHashMap<(String, String), AHashSet<String>>,
    excluded: AHashSet<(String, String)>,
    unchecked: AHashSet<(String, String)>,
}

#[derive(Debug)]
struct Identity {
    principal: Principal,
    roles: AHashSet<String>,
}

impl RoleBasedSecurity {
    pub fn new() -> Self {
        Self {
            identity: RwLock::new(Identity {
                principal: Principal::anonymous(),
                roles: AHashSet::new(),
            }),
            permissions: AHashMap::new(),
            excluded: AHashSet::new(),
            unchecked: AHashSet::new(),
        }
    }

    /// Requires one of `roles` to call `method` on `deployment_id`.
    pub fn permit<I, S>(mut self, deployment_id: &str, method: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .entry((deployment_id.to_string(), method.to_string()))
            .or_default()
            .extend(roles.into_iter().map(Into::into));
        self
    }

    /// Excludes `method` on `deployment_id` from every caller.
    pub fn deny_all(mut self, deployment_id: &str, method: &str) -> Self {
        self.excluded.insert((deployment_id.to_string(), method.to_string()));
        self
    }

    /// Opens `method` on `deployment_id` to every caller, whatever roles it
    /// was given. Exclusion still wins.
    pub fn unchecked(mut self, deployment_id: &str, method: &str) -> Self {
        self.unchecked.insert((deployment_id.to_string(), method.to_string()));
        self
    }

    /// Switches the identity subsequent calls run as.
    ///
    /// The identity belongs to this service, not to a thread: every caller of
    /// every container sharing it sees the switch, including calls already
    /// running on other threads.
    pub fn run_as<I, S>(&self, principal: Principal, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut identity = self.identity.write();
        identity.principal = principal;
        identity.roles = roles.into_iter().map(Into::into).collect();
    }

    /// Drops back to the anonymous identity.
    pub fn logout(&self) {
        self.run_as(Principal::anonymous(), std::iter::empty::<String>());
    }
}

impl Default for RoleBasedSecurity {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityService for RoleBasedSecurity {
    fn is_caller_authorized(&self, method: &MethodRef<'_>, _interface_type: InterfaceType) -> bool {
        let key = (method.deployment_id.to_string(), method.method.to_string());
        if self.excluded.contains(&key) {
            return false;
        }
        if self.unchecked.contains(&key) {
            return true;
        }
        match self.permissions.get(&key) {
            Some(required) => {
                let identity = self.identity.read();
                required.iter().any(|role| identity.roles.contains(role))
            }
            None => true,
        }
    }

    fn caller_principal(&self) -> Principal {
        self.identity.read().principal.clone()
    }

    fn is_caller_in_role(&self, role: &str) -> bool {
        self.identity.read().roles.contains(role)
    }
}
