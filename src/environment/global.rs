//! Process-wide current environment.
//!
//! The registry is single-threaded, so "process-wide" means one current
//! environment per execution context (thread). Hosts call [`init_global`] at
//! startup and [`teardown_global`] at shutdown; tests do the same per test.

use std::cell::RefCell;

use super::Environment;

thread_local! {
    /// The environment installed by [`init_global`], if any.
    static CURRENT: RefCell<Option<Environment>> = const { RefCell::new(None) };
}

/// Make `env` the current environment. Returns the one it replaced, untouched.
pub fn init_global(env: Environment) -> Option<Environment> {
    let previous = CURRENT.with(|cell| cell.borrow_mut().replace(env));
    if previous.is_some() {
        log::warn!("Replacing an existing global environment without teardown");
    }
    previous
}

/// The current environment, if one was initialized.
pub fn global() -> Option<Environment> {
    CURRENT.with(|cell| cell.borrow().clone())
}

/// Remove the current environment and reset it (clear caches, uninstall
/// every provider). Returns it so callers can inspect the final state.
pub fn teardown_global() -> Option<Environment> {
    let env = CURRENT.with(|cell| cell.borrow_mut().take())?;
    env.reset();
    log::debug!("Global environment torn down");
    Some(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::providers::Provider;
    use crate::universe::TypeUniverse;

    #[test]
    fn test_init_and_teardown() {
        assert!(global().is_none());

        let env = Environment::new(TypeUniverse::new());
        assert!(init_global(env.clone()).is_none());
        assert!(global().is_some_and(|current| current.ptr_eq(&env)));

        let provider = Rc::new(Provider::new("core"));
        env.install(Rc::clone(&provider));

        let torn = teardown_global().unwrap();
        assert!(torn.ptr_eq(&env));
        assert!(!env.is_installed(&provider));
        assert!(global().is_none());
        assert!(teardown_global().is_none());
    }

    #[test]
    fn test_init_replaces_previous() {
        let first = Environment::new(TypeUniverse::new());
        let second = Environment::new(TypeUniverse::new());
        init_global(first.clone());
        let previous = init_global(second.clone()).unwrap();
        assert!(previous.ptr_eq(&first));
        assert!(global().unwrap().ptr_eq(&second));
        teardown_global();
    }
}
