//! Settings blocks.
//!
//! A [`SettingsBlock`] owns an ordered registry of scalar and array fields,
//! one storage namespace, and one edit page at its path. Writes go through
//! a fixed pipeline:
//!
//! ```text
//! Idle -> AuthCheck -> (Rejected | Parsing) -> SanityCheck -> (Rejected | Persisted)
//! ```
//!
//! Authentication failures never touch the fields. A failed sanity check
//! keeps the parsed values in memory but skips the save, and the block
//! reports itself as *diverged* from the store until the next successful
//! load or save.

use std::collections::HashSet;
use std::sync::Arc;

use knobs_storage::{StorageBackend, validate_name};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::array::ArrayField;
use crate::auth::{AuthGate, DisabledGate, GateDecision};
use crate::error::SettingsError;
use crate::field::Field;
use crate::html;
use crate::prefs::Preferences;
use crate::request::FormRequest;
use crate::value::Value;

/// Name of the fallback password form argument.
pub const PASSWORD_ARG: &str = "pw";

/// One registered entry.
#[derive(Debug)]
pub enum Entry {
    Field(Field),
    Array(ArrayField),
}

impl Entry {
    pub fn key(&self) -> &str {
        match self {
            Self::Field(f) => f.key(),
            Self::Array(a) => a.key(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Field(f) => f.label(),
            Self::Array(a) => a.label(),
        }
    }

    /// Storage keys written by this entry.
    pub fn storage_keys(&self) -> Vec<String> {
        match self {
            Self::Field(f) => vec![f.key().to_owned()],
            Self::Array(a) => (0..a.len()).map(|i| a.element_key(i)).collect(),
        }
    }

    pub fn render_input(&self) -> String {
        match self {
            Self::Field(f) => f.render_input(),
            Self::Array(a) => a.render_input(),
        }
    }

    pub fn apply_form(&mut self, request: &FormRequest) {
        match self {
            Self::Field(f) => f.apply_form(request),
            Self::Array(a) => a.apply_form(request),
        }
    }

    async fn load(&mut self, prefs: &Preferences) {
        match self {
            Self::Field(f) => f.load(prefs).await,
            Self::Array(a) => a.load(prefs).await,
        }
    }

    async fn save(&self, prefs: &Preferences) -> Result<(), knobs_storage::StorageError> {
        match self {
            Self::Field(f) => f.save(prefs).await,
            Self::Array(a) => a.save(prefs).await,
        }
    }
}

impl From<Field> for Entry {
    fn from(field: Field) -> Self {
        Self::Field(field)
    }
}

impl From<ArrayField> for Entry {
    fn from(array: ArrayField) -> Self {
        Self::Array(array)
    }
}

/// The ordered entries of one block.
#[derive(Debug)]
pub struct Registry {
    namespace: String,
    entries: Vec<Entry>,
}

impl Registry {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.entries.iter().find_map(|e| match e {
            Entry::Field(f) if f.key() == key => Some(f),
            _ => None,
        })
    }

    pub fn field_mut(&mut self, key: &str) -> Option<&mut Field> {
        self.entries.iter_mut().find_map(|e| match e {
            Entry::Field(f) if f.key() == key => Some(f),
            _ => None,
        })
    }

    pub fn array(&self, key: &str) -> Option<&ArrayField> {
        self.entries.iter().find_map(|e| match e {
            Entry::Array(a) if a.key() == key => Some(a),
            _ => None,
        })
    }

    pub fn array_mut(&mut self, key: &str) -> Option<&mut ArrayField> {
        self.entries.iter_mut().find_map(|e| match e {
            Entry::Array(a) if a.key() == key => Some(a),
            _ => None,
        })
    }

    /// Resize the array `key` to `len` elements, keeping the leading values.
    /// Every new element key must be a valid name that no other entry
    /// writes. Returns `true` if the length changed.
    ///
    /// # Errors
    ///
    /// - [`SettingsError::UnknownKey`] if no array is named `key`.
    /// - [`SettingsError::InvalidName`] if a new element key is not a valid storage key.
    /// - [`SettingsError::DuplicateKey`] if a new element key belongs to another entry.
    pub fn resize_array(&mut self, key: &str, len: usize) -> Result<bool, SettingsError> {
        let array = self.array(key).ok_or_else(|| SettingsError::UnknownKey {
            namespace: self.namespace.clone(),
            key: key.to_owned(),
        })?;
        let added: Vec<String> = (array.len()..len).map(|i| array.element_key(i)).collect();
        let taken: HashSet<String> = self
            .entries
            .iter()
            .filter(|e| e.key() != key)
            .flat_map(Entry::storage_keys)
            .collect();
        for element in &added {
            validate_name(element).map_err(SettingsError::InvalidName)?;
            if taken.contains(element) {
                return Err(SettingsError::DuplicateKey {
                    namespace: self.namespace.clone(),
                    key: element.clone(),
                });
            }
        }
        Ok(self.array_mut(key).is_some_and(|a| a.ensure_size(len)))
    }

    /// Current value of the scalar field `key`.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.field(key).map(Field::value)
    }

    /// Replace the value of the scalar field `key`.
    ///
    /// # Errors
    ///
    /// - [`SettingsError::UnknownKey`] if no scalar field is named `key`.
    /// - [`SettingsError::KindMismatch`] if `value` has another kind.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), SettingsError> {
        let namespace = self.namespace.clone();
        self.field_mut(key)
            .ok_or_else(|| SettingsError::UnknownKey {
                namespace,
                key: key.to_owned(),
            })?
            .set(value)
    }
}

/// Post-parse validation hook.
///
/// Runs after the submitted values have been applied and before they are
/// saved. It may adjust values (for example clamp them into range) and
/// returns whether the registry may be persisted.
pub trait SanityCheck: Send + Sync {
    fn check(&self, registry: &mut Registry) -> bool;
}

impl<F> SanityCheck for F
where
    F: Fn(&mut Registry) -> bool + Send + Sync,
{
    fn check(&self, registry: &mut Registry) -> bool {
        self(registry)
    }
}

/// Result of [`SettingsBlock::handle_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Values applied and saved.
    Persisted,
    /// The fallback password did not match. Nothing changed.
    WrongPassword,
    /// The gate refused the request. Nothing changed.
    Denied { redirect: String },
    /// Values applied in memory but rejected by the sanity check; not saved.
    SanityFailed,
    /// Values applied in memory but the store refused them.
    SaveFailed { reason: String },
}

/// Builds a [`SettingsBlock`]. Registration errors surface here rather
/// than at the first save.
pub struct SettingsBlockBuilder {
    namespace: String,
    path: String,
    title: Option<String>,
    entries: Vec<Entry>,
    storage_keys: HashSet<String>,
    sanity: Option<Box<dyn SanityCheck>>,
    password: Option<String>,
    gate: Arc<dyn AuthGate>,
}

impl SettingsBlockBuilder {
    /// Register a scalar field.
    ///
    /// # Errors
    ///
    /// - [`SettingsError::InvalidName`] if the key is not a valid storage key.
    /// - [`SettingsError::DuplicateKey`] if the key is already taken.
    pub fn field(self, field: Field) -> Result<Self, SettingsError> {
        self.entry(Entry::Field(field))
    }

    /// Register an array field. Every element key (`key_0`, `key_1`, ...)
    /// must be a valid, unused storage key.
    ///
    /// # Errors
    ///
    /// Same as [`field`](Self::field), checked per element key.
    pub fn array(self, array: ArrayField) -> Result<Self, SettingsError> {
        self.entry(Entry::Array(array))
    }

    fn entry(mut self, entry: Entry) -> Result<Self, SettingsError> {
        validate_name(entry.key()).map_err(SettingsError::InvalidName)?;
        let keys = entry.storage_keys();
        for key in &keys {
            validate_name(key).map_err(SettingsError::InvalidName)?;
            if self.storage_keys.contains(key) {
                return Err(SettingsError::DuplicateKey {
                    namespace: self.namespace.clone(),
                    key: key.clone(),
                });
            }
        }
        if self.entries.iter().any(|e| e.key() == entry.key()) {
            return Err(SettingsError::DuplicateKey {
                namespace: self.namespace.clone(),
                key: entry.key().to_owned(),
            });
        }
        self.storage_keys.extend(keys);
        self.entries.push(entry);
        Ok(self)
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn sanity_check(mut self, check: impl SanityCheck + 'static) -> Self {
        self.sanity = Some(Box::new(check));
        self
    }

    /// Fallback password required in the `pw` argument while the gate is
    /// inactive. With no password, such writes are always refused.
    #[must_use]
    pub fn password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    #[must_use]
    pub fn gate(mut self, gate: Arc<dyn AuthGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Finish the block on top of `storage`. Values are not loaded yet; call
    /// [`SettingsBlock::load`].
    ///
    /// # Errors
    ///
    /// - [`SettingsError::InvalidName`] if the namespace is invalid.
    /// - [`SettingsError::InvalidPath`] if the path is not routable.
    pub fn build(self, storage: Arc<dyn StorageBackend>) -> Result<SettingsBlock, SettingsError> {
        validate_name(&self.namespace).map_err(SettingsError::InvalidName)?;
        validate_path(&self.path)?;

        Ok(SettingsBlock {
            title: self.title.unwrap_or_else(|| self.namespace.clone()),
            state: Mutex::new(BlockState {
                registry: Registry {
                    namespace: self.namespace.clone(),
                    entries: self.entries,
                },
                diverged: false,
            }),
            namespace: self.namespace,
            path: self.path,
            storage,
            gate: self.gate,
            password: self.password,
            sanity: self.sanity,
        })
    }
}

fn validate_path(path: &str) -> Result<(), SettingsError> {
    let reason = if !path.starts_with('/') {
        "must start with '/'"
    } else if path == "/" {
        "must not be the root path"
    } else if path.ends_with('/') {
        "must not end with '/'"
    } else if path.contains(['?', '#', ' ', '{', '}', '*', ':']) || path.contains("//") {
        "must be a plain path"
    } else {
        return Ok(());
    };
    Err(SettingsError::InvalidPath {
        path: path.to_owned(),
        reason: reason.to_owned(),
    })
}

#[derive(Debug)]
struct BlockState {
    registry: Registry,
    diverged: bool,
}

/// A group of settings persisted in one namespace and edited on one page.
pub struct SettingsBlock {
    namespace: String,
    path: String,
    title: String,
    storage: Arc<dyn StorageBackend>,
    gate: Arc<dyn AuthGate>,
    password: Option<String>,
    sanity: Option<Box<dyn SanityCheck>>,
    state: Mutex<BlockState>,
}

impl std::fmt::Debug for SettingsBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsBlock")
            .field("namespace", &self.namespace)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SettingsBlock {
    pub fn builder(namespace: impl Into<String>, path: impl Into<String>) -> SettingsBlockBuilder {
        SettingsBlockBuilder {
            namespace: namespace.into(),
            path: path.into(),
            title: None,
            entries: Vec::new(),
            storage_keys: HashSet::new(),
            sanity: None,
            password: None,
            gate: Arc::new(DisabledGate),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Form action: `{path}/update`.
    pub fn update_path(&self) -> String {
        format!("{}/update", self.path)
    }

    pub fn gate(&self) -> &Arc<dyn AuthGate> {
        &self.gate
    }

    fn prefs(&self) -> Preferences {
        Preferences::open(Arc::clone(&self.storage), self.namespace.clone())
    }

    /// Load every entry from the store. Missing or unreadable keys keep
    /// their current values.
    pub async fn load(&self) {
        let mut state = self.state.lock().await;
        let prefs = self.prefs();
        for entry in state.registry.iter_mut() {
            entry.load(&prefs).await;
        }
        state.diverged = false;
        debug!(namespace = %self.namespace, "settings loaded");
    }

    /// Save every entry to the store.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Storage`] on the first failed write; earlier
    /// writes are not rolled back.
    pub async fn save(&self) -> Result<(), SettingsError> {
        let mut state = self.state.lock().await;
        self.save_locked(&mut state).await
    }

    async fn save_locked(&self, state: &mut BlockState) -> Result<(), SettingsError> {
        let prefs = self.prefs();
        for entry in state.registry.iter() {
            entry.save(&prefs).await?;
        }
        state.diverged = false;
        info!(namespace = %self.namespace, "settings saved");
        Ok(())
    }

    /// Whether the in-memory values differ from the store because the last
    /// write was not persisted.
    pub async fn is_diverged(&self) -> bool {
        self.state.lock().await.diverged
    }

    /// Render the edit form.
    pub async fn generate_form(&self) -> String {
        let state = self.state.lock().await;
        let mut out = format!(
            "<form method='POST' action='{}'>\n",
            html::escape(&self.update_path())
        );
        for entry in state.registry.iter() {
            out.push_str(&html::escape(entry.label()));
            out.push_str(": ");
            out.push_str(&entry.render_input());
            out.push_str("<br>\n");
        }
        if !self.gate.is_active() {
            out.push_str("Password: <input type='password' name='pw'><br><br>\n");
        }
        out.push_str("<input type='submit' value='Save'></form>\n");
        out
    }

    fn password_matches(&self, request: &FormRequest) -> bool {
        let Some(expected) = &self.password else {
            warn!(namespace = %self.namespace, "no settings password configured, refusing write");
            return false;
        };
        let given = request.arg(PASSWORD_ARG).unwrap_or_default();
        bool::from(expected.as_bytes().ct_eq(given.as_bytes()))
    }

    /// Run the write pipeline for a submitted form.
    pub async fn handle_update(&self, request: &FormRequest) -> UpdateOutcome {
        let mut state = self.state.lock().await;

        if self.gate.is_active() {
            if let GateDecision::Deny { redirect } = self.gate.require(request) {
                info!(namespace = %self.namespace, "settings write denied by gate");
                return UpdateOutcome::Denied { redirect };
            }
        } else if !self.password_matches(request) {
            warn!(namespace = %self.namespace, "settings write with wrong password");
            return UpdateOutcome::WrongPassword;
        }

        for entry in state.registry.iter_mut() {
            entry.apply_form(request);
        }

        if let Some(check) = &self.sanity {
            if !check.check(&mut state.registry) {
                state.diverged = true;
                warn!(
                    namespace = %self.namespace,
                    "sanity check rejected submitted values, not saving"
                );
                return UpdateOutcome::SanityFailed;
            }
        }

        match self.save_locked(&mut state).await {
            Ok(()) => UpdateOutcome::Persisted,
            Err(e) => {
                state.diverged = true;
                error!(namespace = %self.namespace, error = %e, "failed to persist settings");
                UpdateOutcome::SaveFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Current value of the scalar field `key`.
    pub async fn value(&self, key: &str) -> Option<Value> {
        self.state.lock().await.registry.value(key).cloned()
    }

    /// Element `index` of the array `key`.
    pub async fn element(&self, key: &str, index: usize) -> Option<Value> {
        self.state
            .lock()
            .await
            .registry
            .array(key)
            .map(|a| a.get(index))
    }

    /// Resize the array `key` in memory; see [`Registry::resize_array`].
    /// The store is not touched until the next [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Same as [`Registry::resize_array`].
    pub async fn resize_array(&self, key: &str, len: usize) -> Result<bool, SettingsError> {
        self.state.lock().await.registry.resize_array(key, len)
    }

    /// Run `f` with shared access to the registry.
    pub async fn with_registry<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        f(&self.state.lock().await.registry)
    }

    /// Run `f` with exclusive access to the registry. Changes are not saved.
    pub async fn with_registry_mut<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        f(&mut self.state.lock().await.registry)
    }
}
