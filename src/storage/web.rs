use super::adapter::{ChangeListener, NoopStorage, StorageAdapter, Unsubscribe};
use crate::platform::{StorageArea, Window};
use crate::scope::Scope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub type Serializer<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;
pub type Deserializer<T> = Arc<dyn Fn(Option<&str>) -> T + Send + Sync>;
pub type Initializer<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

// Serializers may refuse a value (e.g. a map with non-string keys), in which
// case nothing is written.
type Encode<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

/// Options for [`local_storage_with`] and [`session_storage_with`].
///
/// Every field is optional. Defaults: JSON encoding, JSON decoding falling
/// back to the default value on a missing, empty or malformed entry, identity
/// initialization, and no cross-window sync.
///
/// ```
/// use tincan_persist::StorageOptions;
///
/// let options = StorageOptions::<u32>::new()
///     .serialize(|n| n.to_string())
///     .deserialize(|raw| raw.and_then(|s| s.parse().ok()).unwrap_or(0))
///     .initialize(|n| n.min(100))
///     .sync_tabs(true);
/// assert!(options.syncs_tabs());
/// ```
pub struct StorageOptions<T> {
    serialize: Option<Serializer<T>>,
    deserialize: Option<Deserializer<T>>,
    initialize: Option<Initializer<T>>,
    sync_tabs: bool,
}

impl<T> Default for StorageOptions<T> {
    fn default() -> Self {
        Self {
            serialize: None,
            deserialize: None,
            initialize: None,
            sync_tabs: false,
        }
    }
}

impl<T> fmt::Debug for StorageOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageOptions")
            .field("custom_serialize", &self.serialize.is_some())
            .field("custom_deserialize", &self.deserialize.is_some())
            .field("custom_initialize", &self.initialize.is_some())
            .field("sync_tabs", &self.sync_tabs)
            .finish()
    }
}

impl<T> StorageOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serialize(mut self, f: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.serialize = Some(Arc::new(f));
        self
    }

    /// Decode a raw entry; `None` means the entry is absent.
    pub fn deserialize(mut self, f: impl Fn(Option<&str>) -> T + Send + Sync + 'static) -> Self {
        self.deserialize = Some(Arc::new(f));
        self
    }

    /// Transform the value read at creation time. Later reads are not affected.
    pub fn initialize(mut self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.initialize = Some(Arc::new(f));
        self
    }

    /// Expose a change source so bindings follow writes from other windows.
    pub fn sync_tabs(mut self, enabled: bool) -> Self {
        self.sync_tabs = enabled;
        self
    }

    pub fn syncs_tabs(&self) -> bool {
        self.sync_tabs
    }
}

/// Adapter over one key of a window's local or session storage.
pub struct WebStorage<T> {
    key: String,
    area: StorageArea,
    window: Window,
    encode: Encode<T>,
    decode: Deserializer<T>,
    initial_value: T,
    default_value: T,
    sync_tabs: bool,
}

impl<T> fmt::Debug for WebStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebStorage")
            .field("key", &self.key)
            .field("area", &self.area)
            .field("window", &self.window.id())
            .field("sync_tabs", &self.sync_tabs)
            .finish()
    }
}

impl<T> WebStorage<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Read `key` from `area` of `window` and resolve the initial value.
    pub fn new(
        window: &Window,
        area: StorageArea,
        key: impl Into<String>,
        default_value: T,
        options: StorageOptions<T>,
    ) -> Self {
        let key = key.into();
        let StorageOptions {
            serialize,
            deserialize,
            initialize,
            sync_tabs,
        } = options;

        let encode: Encode<T> = match serialize {
            Some(serialize) => Arc::new(move |value: &T| Some(serialize(value))),
            None => json_encoder(key.clone()),
        };
        let decode =
            deserialize.unwrap_or_else(|| json_decoder(key.clone(), default_value.clone()));

        let stored = decode(window.storage(area).get_item(&key).as_deref());
        let initial_value = match initialize {
            Some(initialize) => initialize(stored),
            None => stored,
        };

        debug!(key = %key, ?area, window = window.id(), sync_tabs, "storage adapter created");

        Self {
            key,
            area,
            window: window.clone(),
            encode,
            decode,
            initial_value,
            default_value,
            sync_tabs,
        }
    }
}

impl<T> WebStorage<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn area(&self) -> StorageArea {
        self.area
    }
}

impl<T> StorageAdapter<T> for WebStorage<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn set(&self, value: &T) {
        let Some(raw) = (self.encode)(value) else {
            return;
        };
        if let Err(err) = self.window.storage(self.area).set_item(&self.key, &raw) {
            warn!(key = %self.key, error = %err, "failed to persist value");
        }
    }

    fn initial_value(&self) -> T {
        self.initial_value.clone()
    }

    fn default_value(&self) -> T {
        self.default_value.clone()
    }

    fn subscribe(&self, scope: Scope, on_change: ChangeListener<T>) -> Option<Unsubscribe> {
        if !self.sync_tabs {
            return None;
        }
        let decode = Arc::clone(&self.decode);
        let key = self.key.clone();

        match scope {
            Scope::Wide => {
                let registry = self.window.broadcast_registry(self.area);
                registry.register(
                    key.clone(),
                    Arc::new(move |raw: Option<&str>| on_change(decode(raw))),
                );
                Some(Unsubscribe::new(move || {
                    registry.unregister(&key);
                }))
            }
            Scope::Scoped => {
                let area = self.area;
                let listener_key = key;
                let id = self.window.add_storage_listener(move |event| {
                    if event.area != area || event.key.as_deref() != Some(listener_key.as_str()) {
                        return;
                    }
                    on_change(decode(event.new_value.as_deref()));
                });
                let window = self.window.clone();
                Some(Unsubscribe::new(move || {
                    window.remove_storage_listener(id);
                }))
            }
        }
    }
}

fn json_encoder<T: Serialize + 'static>(key: String) -> Encode<T> {
    Arc::new(move |value: &T| match serde_json::to_string(value) {
        Ok(raw) => Some(raw),
        Err(err) => {
            warn!(key = %key, error = %err, "value is not JSON-encodable; not persisted");
            None
        }
    })
}

fn json_decoder<T>(key: String, default_value: T) -> Deserializer<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    Arc::new(move |raw: Option<&str>| match raw {
        None | Some("") => default_value.clone(),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|err| {
            warn!(key = %key, error = %err, "malformed stored value; using default");
            default_value.clone()
        }),
    })
}

fn create_storage<T>(
    area: StorageArea,
    window: Option<&Window>,
    key: impl Into<String>,
    default_value: T,
    options: StorageOptions<T>,
) -> Arc<dyn StorageAdapter<T>>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let key: String = key.into();
    match window {
        Some(window) => Arc::new(WebStorage::new(window, area, key, default_value, options)),
        None => {
            debug!(key = %key, ?area, "no storage medium available; using noop storage");
            Arc::new(NoopStorage::new(default_value))
        }
    }
}

/// Adapter over `key` in the window's local storage, or a no-op adapter when
/// there is no window.
pub fn local_storage<T>(
    window: Option<&Window>,
    key: impl Into<String>,
    default_value: T,
) -> Arc<dyn StorageAdapter<T>>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    local_storage_with(window, key, default_value, StorageOptions::default())
}

pub fn local_storage_with<T>(
    window: Option<&Window>,
    key: impl Into<String>,
    default_value: T,
    options: StorageOptions<T>,
) -> Arc<dyn StorageAdapter<T>>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    create_storage(StorageArea::Local, window, key, default_value, options)
}

/// Adapter over `key` in the window's session storage, or a no-op adapter
/// when there is no window.
pub fn session_storage<T>(
    window: Option<&Window>,
    key: impl Into<String>,
    default_value: T,
) -> Arc<dyn StorageAdapter<T>>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    session_storage_with(window, key, default_value, StorageOptions::default())
}

pub fn session_storage_with<T>(
    window: Option<&Window>,
    key: impl Into<String>,
    default_value: T,
    options: StorageOptions<T>,
) -> Arc<dyn StorageAdapter<T>>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    create_storage(StorageArea::Session, window, key, default_value, options)
}
