//! One-time initialization of freshly obtained backing objects.

use crate::environment::Environment;

/// Run once per backing object, the first time a resolve selects it.
///
/// The hook may call back into the environment (install or uninstall
/// providers, resolve other capabilities, even resolve its own source again,
/// which returns the already-cached backing object).
pub trait Initialize {
    fn initialize(&self, env: &Environment);
}
