//! Navigation gating by role
//!
//! The guard owns no state; it reads a [`Session`] snapshot and answers.
//! Its answer is advisory for navigation only, the server still authorizes
//! every operation it receives.

use std::collections::{HashMap, HashSet};

use crate::session::Session;
use crate::types::Role;

pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// Outcome of a navigation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Session still bootstrapping; show a waiting indicator, do not redirect
    Pending,
    Admit,
    RedirectTo(String),
}

/// Decides whether a session may enter a route requiring a capability set
#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_route: String,
    routes: RouteTable,
}

impl RouteGuard {
    pub fn new(login_route: impl Into<String>) -> Self {
        Self {
            login_route: login_route.into(),
            routes: RouteTable::standard(),
        }
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Admit when no roles are required, or when the session is
    /// authenticated with one of `required`; otherwise redirect to login.
    pub fn can_enter(&self, required: Option<&HashSet<Role>>, session: &Session) -> Admission {
        if session.is_initializing {
            return Admission::Pending;
        }

        let required = match required {
            Some(required) if !required.is_empty() => required,
            _ => return Admission::Admit,
        };

        match session.role() {
            Some(role) if required.contains(&role) => Admission::Admit,
            _ => Admission::RedirectTo(self.login_route.clone()),
        }
    }

    /// [`can_enter`](Self::can_enter) for a path looked up in the route table.
    /// Paths missing from the table are treated as public.
    pub fn check_path(&self, path: &str, session: &Session) -> Admission {
        self.can_enter(self.routes.required_roles(path), session)
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_ROUTE)
    }
}

/// Capability sets of the application's routes
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, HashSet<Role>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rental application's routes
    pub fn standard() -> Self {
        let any = [Role::Customer, Role::Admin];
        Self::new()
            .public("/")
            .public("/login")
            .public("/register")
            .restricted("/customer-dashboard", [Role::Customer])
            .restricted("/booking", [Role::Customer])
            .restricted("/payment", [Role::Customer])
            .restricted("/admin-dashboard", [Role::Admin])
            .restricted("/admin/register", [Role::Admin])
            .restricted("/admin/cars", [Role::Admin])
            .restricted("/admin/variants", [Role::Admin])
            .restricted("/admin/list", [Role::Admin])
            .restricted("/change-password", any)
    }

    pub fn public(mut self, path: impl Into<String>) -> Self {
        self.routes.insert(path.into(), HashSet::new());
        self
    }

    pub fn restricted(
        mut self,
        path: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        self.routes.insert(path.into(), roles.into_iter().collect());
        self
    }

    /// Required roles for `path`, matching the longest registered prefix
    /// on a segment boundary (`/admin/cars/7` uses `/admin/cars`).
    pub fn required_roles(&self, path: &str) -> Option<&HashSet<Role>> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        self.routes
            .iter()
            .filter(|(route, _)| {
                path == route.as_str()
                    || (route.as_str() != "/"
                        && path.starts_with(route.as_str())
                        && path[route.len()..].starts_with('/'))
            })
            .max_by_key(|(route, _)| route.len())
            .map(|(_, roles)| roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionUser;

    fn settled(role: Option<Role>) -> Session {
        Session {
            user: role.map(|role| SessionUser {
                email: "u@example.com".to_string(),
                role,
            }),
            is_initializing: false,
        }
    }

    fn roles(list: &[Role]) -> HashSet<Role> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_pending_while_initializing() {
        let guard = RouteGuard::default();
        let session = Session {
            user: None,
            is_initializing: true,
        };
        assert_eq!(guard.can_enter(Some(&roles(&[Role::Admin])), &session), Admission::Pending);
        assert_eq!(guard.can_enter(None, &session), Admission::Pending);
    }

    #[test]
    fn test_role_membership() {
        let guard = RouteGuard::default();
        let customer = settled(Some(Role::Customer));

        assert_eq!(
            guard.can_enter(Some(&roles(&[Role::Admin])), &customer),
            Admission::RedirectTo("/login".to_string())
        );
        assert_eq!(guard.can_enter(Some(&roles(&[Role::Customer])), &customer), Admission::Admit);
        assert_eq!(
            guard.can_enter(Some(&roles(&[Role::Customer, Role::Admin])), &customer),
            Admission::Admit
        );
    }

    #[test]
    fn test_empty_requirement_admits_anyone() {
        let guard = RouteGuard::default();
        let anonymous = settled(None);

        assert_eq!(guard.can_enter(None, &anonymous), Admission::Admit);
        assert_eq!(guard.can_enter(Some(&HashSet::new()), &anonymous), Admission::Admit);
        assert_eq!(
            guard.can_enter(Some(&roles(&[Role::Customer])), &anonymous),
            Admission::RedirectTo("/login".to_string())
        );
    }

    #[test]
    fn test_custom_login_route() {
        let guard = RouteGuard::new("/signin");
        assert_eq!(
            guard.can_enter(Some(&roles(&[Role::Admin])), &settled(None)),
            Admission::RedirectTo("/signin".to_string())
        );
    }

    #[test]
    fn test_route_table_prefix_matching() {
        let table = RouteTable::standard();
        assert_eq!(table.required_roles("/admin/cars/7"), Some(&roles(&[Role::Admin])));
        assert_eq!(table.required_roles("/booking?car=3"), Some(&roles(&[Role::Customer])));
        assert_eq!(table.required_roles("/"), Some(&HashSet::new()));
        assert!(table.required_roles("/admin/carsales").is_none());
        assert!(table.required_roles("/unknown").is_none());
    }

    #[test]
    fn test_check_path() {
        let guard = RouteGuard::default();
        let admin = settled(Some(Role::Admin));
        let customer = settled(Some(Role::Customer));

        assert_eq!(guard.check_path("/admin-dashboard", &admin), Admission::Admit);
        assert_eq!(
            guard.check_path("/admin-dashboard", &customer),
            Admission::RedirectTo("/login".to_string())
        );
        assert_eq!(guard.check_path("/change-password", &customer), Admission::Admit);
        assert_eq!(
            guard.check_path("/change-password", &settled(None)),
            Admission::RedirectTo("/login".to_string())
        );
        assert_eq!(guard.check_path("/", &settled(None)), Admission::Admit);
    }
}
