//! Observer notifications for mutating archive actions.

use std::fmt;
use std::rc::Rc;

/// What just happened to the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Added,
    Extracted,
    Removed,
    Listed,
    Dumped,
    Compacted,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            ActionType::Added => "add",
            ActionType::Extracted => "extract",
            ActionType::Removed => "remove",
            ActionType::Listed => "list",
            ActionType::Dumped => "dump",
            ActionType::Compacted => "compact",
        };
        f.write_str(word)
    }
}

/// Callback invoked synchronously after each operation, in registration
/// order. `name` is empty for list/dump/compact.
pub trait ArchiveObserver {
    fn on_action(&self, action: ActionType, name: &str, status: bool);
}

/// Handle type used for registration; observers outlive individual
/// notifications and can be unregistered by handle identity.
pub type ObserverHandle = Rc<dyn ArchiveObserver>;

/// Observer that reports every action through the `log` facade.
pub struct LogObserver;

impl ArchiveObserver for LogObserver {
    fn on_action(&self, action: ActionType, name: &str, status: bool) {
        if status {
            log::info!("observed {action} {name}");
        } else {
            log::warn!("observed {action} {name} (failed)");
        }
    }
}
