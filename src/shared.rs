use crate::{ExpiringStore, StoreConfig, StoreError};

use once_cell::sync::OnceCell;

/// Lazily constructed store meant to be owned by an application's composition
/// root and handed to whoever needs it.
///
/// The first successful [`get_or_init`](SharedStore::get_or_init) builds the
/// store; later calls return clones of it for the rest of the process and
/// ignore their `config`.
///
/// # Examples
///
/// ```
/// use ephemera::{SharedStore, StoreConfig};
///
/// static SESSIONS: SharedStore = SharedStore::new();
///
/// let first = SESSIONS.get_or_init(StoreConfig::default()).unwrap();
/// first.insert("token", "abc", None).unwrap();
///
/// let again = SESSIONS.get_or_init(StoreConfig::default()).unwrap();
/// assert_eq!(again.get("token").as_deref(), Some("abc"));
/// ```
#[derive(Debug, Default)]
pub struct SharedStore {
    cell: OnceCell<ExpiringStore>,
}

impl SharedStore {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Returns the shared store, building it with `config` on first use.
    pub fn get_or_init(&self, config: StoreConfig) -> Result<ExpiringStore, StoreError> {
        self.cell
            .get_or_try_init(|| ExpiringStore::new(config))
            .map(ExpiringStore::clone)
    }

    /// Returns the shared store if it has been built.
    pub fn get(&self) -> Option<ExpiringStore> {
        self.cell.get().cloned()
    }
}
