//! Caller identity scope.
//!
//! A backend turns a user name into a [`UserContext`]; the session installs
//! that context on the calling thread for the duration of each call so that
//! handles can authorize operations against whoever is currently acting.

use std::cell::RefCell;

use crate::config::{self, Configuration};

/// The impersonated principal an operation runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user: String,
    pub groups: Vec<String>,
    pub superuser: bool,
}

impl UserContext {
    /// Build a context from a user name, its groups and the configuration's
    /// superuser settings.
    pub fn resolve(user: &str, groups: Vec<String>, conf: &Configuration, default_superuser: &str) -> Self {
        let superuser_name = conf.get(config::SUPERUSER).unwrap_or(default_superuser);
        let supergroup = conf.get(config::SUPERGROUP).unwrap_or(config::DEFAULT_SUPERGROUP);
        let superuser = user == superuser_name || groups.iter().any(|g| g == supergroup);
        Self {
            user: user.to_string(),
            groups,
            superuser,
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<UserContext>> = const { RefCell::new(None) };
}

/// Restores the previously active identity when dropped.
#[must_use = "the identity is only active while the scope is alive"]
pub struct IdentityScope {
    previous: Option<UserContext>,
}

impl Drop for IdentityScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Make `ctx` the calling thread's identity until the returned scope drops.
pub fn enter(ctx: UserContext) -> IdentityScope {
    let previous = CURRENT.with(|current| current.borrow_mut().replace(ctx));
    IdentityScope { previous }
}

/// Identity active on the calling thread, if any.
pub fn current() -> Option<UserContext> {
    CURRENT.with(|current| current.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(user: &str) -> UserContext {
        UserContext {
            user: user.to_string(),
            groups: vec![],
            superuser: false,
        }
    }

    #[test]
    fn test_nested_scopes_restore() {
        assert!(current().is_none());
        {
            let _outer = enter(ctx("alice"));
            assert_eq!(current().unwrap().user, "alice");
            {
                let _inner = enter(ctx("bob"));
                assert_eq!(current().unwrap().user, "bob");
            }
            assert_eq!(current().unwrap().user, "alice");
        }
        assert!(current().is_none());
    }

    #[test]
    fn test_scope_is_per_thread() {
        let _scope = enter(ctx("alice"));
        let seen = std::thread::spawn(current).join().unwrap();
        assert!(seen.is_none());
    }

    #[test]
    fn test_resolve_superuser() {
        let conf = Configuration::new("memory://").with(config::SUPERGROUP, "admins");
        assert!(UserContext::resolve("hdfs", vec![], &conf, "hdfs").superuser);
        assert!(UserContext::resolve("ops", vec!["admins".to_string()], &conf, "hdfs").superuser);
        assert!(!UserContext::resolve("alice", vec!["staff".to_string()], &conf, "hdfs").superuser);
    }
}
