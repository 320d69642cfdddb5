use sha2::{Digest, Sha256};

/// Closed authorization set. The role string on the user record is the sole
/// authorization signal; anything outside this set resolves to "no role".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Bendahara,
    Guru,
    Parent,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "bendahara" => Some(Role::Bendahara),
            "guru" => Some(Role::Guru),
            "parent" => Some(Role::Parent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Bendahara => "bendahara",
            Role::Guru => "guru",
            Role::Parent => "parent",
        }
    }
}

/// One closed mapping per role: display label, reachable route prefixes, and
/// the IPC method prefixes the router will dispatch for that role. Adding a
/// role is a change here, nowhere else.
pub struct RolePolicy {
    pub label: &'static str,
    pub route_prefixes: &'static [&'static str],
    pub actions: &'static [&'static str],
}

const ADMIN_POLICY: RolePolicy = RolePolicy {
    label: "Administrator",
    route_prefixes: &["/admin"],
    actions: &[
        "users.",
        "students.",
        "classes.",
        "income.",
        "expenses.",
        "schedule.",
        "proofs.",
        "notifications.",
        "contact.",
        "reports.",
        "backup.",
        "auth.changePassword",
    ],
};

const BENDAHARA_POLICY: RolePolicy = RolePolicy {
    label: "Bendahara",
    route_prefixes: &["/admin"],
    actions: &[
        "students.",
        "classes.",
        "income.",
        "expenses.",
        "schedule.",
        "proofs.",
        "notifications.",
        "contact.",
        "reports.",
        "backup.",
        "auth.changePassword",
    ],
};

// Guru has no dashboard in the current routing; self-service only.
const GURU_POLICY: RolePolicy = RolePolicy {
    label: "Guru",
    route_prefixes: &[],
    actions: &["auth.changePassword"],
};

const PARENT_POLICY: RolePolicy = RolePolicy {
    label: "Orang Tua",
    route_prefixes: &["/parent"],
    actions: &[
        "schedule.list",
        "proofs.submit",
        "proofs.list",
        "proofs.options",
        "notifications.list",
        "contact.create",
        "contact.list",
        "auth.changePassword",
    ],
};

pub fn policy(role: Role) -> &'static RolePolicy {
    match role {
        Role::Admin => &ADMIN_POLICY,
        Role::Bendahara => &BENDAHARA_POLICY,
        Role::Guru => &GURU_POLICY,
        Role::Parent => &PARENT_POLICY,
    }
}

pub fn role_allows_method(role: Role, method: &str) -> bool {
    policy(role).actions.iter().any(|prefix| {
        if prefix.ends_with('.') {
            method.starts_with(prefix)
        } else {
            method == *prefix
        }
    })
}

/// The signed-in principal. `role` is None when the user row was missing or
/// carried an unknown role string; such a session is treated as
/// unauthenticated for authorization purposes.
#[derive(Debug, Clone)]
pub struct Session {
    pub principal: String,
    pub email: String,
    pub name: String,
    pub role: Option<Role>,
}

/// Guard input: the resolver may still be in flight, or there may be no
/// principal, or a principal whose role resolved (possibly to nothing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Resolving,
    Anonymous,
    SignedIn(Option<Role>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Wait,
    Allow,
    Redirect(&'static str),
}

const PUBLIC_PATHS: &[&str] = &["/login", "/forgot-password", "/register"];

fn is_protected(path: &str) -> bool {
    path == "/" || path.starts_with("/admin") || path.starts_with("/parent")
}

/// Static decision table, evaluated in order. Note the literal rule for a
/// parent on an /admin path: the target is /login, not /parent.
pub fn route_decision(state: SessionState, path: &str) -> RouteDecision {
    if state == SessionState::Resolving {
        return RouteDecision::Wait;
    }
    if PUBLIC_PATHS.contains(&path) {
        return RouteDecision::Allow;
    }
    let role = match state {
        SessionState::SignedIn(Some(role)) => role,
        _ => {
            if is_protected(path) {
                return RouteDecision::Redirect("/login");
            }
            return RouteDecision::Redirect("/");
        }
    };
    match role {
        Role::Admin | Role::Bendahara => {
            if path.starts_with("/admin") {
                RouteDecision::Allow
            } else if path.starts_with("/parent") || path == "/" {
                RouteDecision::Redirect("/admin")
            } else {
                RouteDecision::Redirect("/")
            }
        }
        Role::Parent => {
            if path.starts_with("/parent") {
                RouteDecision::Allow
            } else if path == "/" {
                RouteDecision::Redirect("/parent")
            } else if path.starts_with("/admin") {
                RouteDecision::Redirect("/login")
            } else {
                RouteDecision::Redirect("/")
            }
        }
        Role::Guru => {
            if is_protected(path) {
                RouteDecision::Redirect("/login")
            } else {
                RouteDecision::Redirect("/")
            }
        }
    }
}

pub fn hash_password(email: &str, password: &str) -> String {
    // Email doubles as the salt; accounts are keyed by unique email.
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b"\x00");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(email: &str, password: &str, stored_hash: &str) -> bool {
    hash_password(email, password) == stored_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolving_makes_no_redirect_decision() {
        assert_eq!(
            route_decision(SessionState::Resolving, "/admin/students"),
            RouteDecision::Wait
        );
    }

    #[test]
    fn anonymous_protected_paths_redirect_to_login() {
        for path in ["/", "/admin", "/admin/students", "/parent/history"] {
            assert_eq!(
                route_decision(SessionState::Anonymous, path),
                RouteDecision::Redirect("/login"),
                "path {}",
                path
            );
        }
    }

    #[test]
    fn public_paths_are_reachable_for_everyone() {
        for state in [
            SessionState::Anonymous,
            SessionState::SignedIn(Some(Role::Admin)),
            SessionState::SignedIn(Some(Role::Parent)),
            SessionState::SignedIn(None),
        ] {
            assert_eq!(route_decision(state, "/login"), RouteDecision::Allow);
            assert_eq!(route_decision(state, "/register"), RouteDecision::Allow);
        }
    }

    #[test]
    fn admin_roles_live_under_admin() {
        for role in [Role::Admin, Role::Bendahara] {
            let state = SessionState::SignedIn(Some(role));
            assert_eq!(route_decision(state, "/admin/income"), RouteDecision::Allow);
            assert_eq!(
                route_decision(state, "/parent/history"),
                RouteDecision::Redirect("/admin")
            );
            assert_eq!(route_decision(state, "/"), RouteDecision::Redirect("/admin"));
        }
    }

    #[test]
    fn parent_on_admin_path_goes_to_login_not_parent() {
        let state = SessionState::SignedIn(Some(Role::Parent));
        assert_eq!(
            route_decision(state, "/admin/students"),
            RouteDecision::Redirect("/login")
        );
        assert_eq!(route_decision(state, "/parent/upload"), RouteDecision::Allow);
        assert_eq!(route_decision(state, "/"), RouteDecision::Redirect("/parent"));
    }

    #[test]
    fn guru_has_no_dashboard() {
        let state = SessionState::SignedIn(Some(Role::Guru));
        assert_eq!(
            route_decision(state, "/admin"),
            RouteDecision::Redirect("/login")
        );
        assert_eq!(
            route_decision(state, "/parent"),
            RouteDecision::Redirect("/login")
        );
    }

    #[test]
    fn null_role_counts_as_unauthenticated() {
        assert_eq!(
            route_decision(SessionState::SignedIn(None), "/admin"),
            RouteDecision::Redirect("/login")
        );
    }

    #[test]
    fn unknown_paths_redirect_to_root() {
        assert_eq!(
            route_decision(SessionState::SignedIn(Some(Role::Admin)), "/nowhere"),
            RouteDecision::Redirect("/")
        );
        assert_eq!(
            route_decision(SessionState::Anonymous, "/nowhere"),
            RouteDecision::Redirect("/")
        );
    }

    #[test]
    fn method_gate_follows_role_policy() {
        assert!(role_allows_method(Role::Admin, "users.create"));
        assert!(!role_allows_method(Role::Bendahara, "users.create"));
        assert!(role_allows_method(Role::Bendahara, "income.create"));
        assert!(role_allows_method(Role::Parent, "proofs.submit"));
        assert!(!role_allows_method(Role::Parent, "students.list"));
        assert!(!role_allows_method(Role::Parent, "schedule.create"));
        assert!(role_allows_method(Role::Parent, "schedule.list"));
        assert!(!role_allows_method(Role::Guru, "students.list"));
        assert!(role_allows_method(Role::Guru, "auth.changePassword"));
    }

    #[test]
    fn password_hash_round_trips_and_is_salted_by_email() {
        let h = hash_password("ibu@contoh.id", "rahasia1");
        assert!(verify_password("ibu@contoh.id", "rahasia1", &h));
        assert!(!verify_password("ibu@contoh.id", "salah", &h));
        assert_ne!(h, hash_password("lain@contoh.id", "rahasia1"));
    }
}
