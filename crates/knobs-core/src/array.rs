//! Array fields: a run of same-kind values under one key prefix.
//!
//! Element `i` of an array keyed `lvl` is stored and submitted as `lvl_i`.
//! Indexing outside the array never panics: reads return the default fill
//! value, writes are refused, and both are logged and counted so that the
//! misuse stays visible.

use std::sync::atomic::{AtomicUsize, Ordering};

use knobs_storage::StorageError;
use tracing::warn;

use crate::error::SettingsError;
use crate::field::DEFAULT_FLOAT_STEP;
use crate::html;
use crate::prefs::Preferences;
use crate::request::FormRequest;
use crate::value::{self, Value, ValueKind};

/// An ordered, resizable sequence of values of one kind.
#[derive(Debug)]
pub struct ArrayField {
    key: String,
    label: String,
    step: f32,
    precision: u32,
    default: Value,
    values: Vec<Value>,
    out_of_range: AtomicUsize,
}

impl ArrayField {
    /// Create an array of `len` copies of `default`. The element kind is the
    /// kind of `default`.
    #[must_use]
    pub fn new(key: impl Into<String>, label: impl Into<String>, default: Value, len: usize) -> Self {
        let step = match default.kind() {
            ValueKind::Float => DEFAULT_FLOAT_STEP,
            _ => 1.0,
        };
        Self {
            key: key.into(),
            label: label.into(),
            step,
            precision: value::precision_from_step(step),
            values: vec![default.clone(); len],
            default,
            out_of_range: AtomicUsize::new(0),
        }
    }

    /// Replace the initial elements (and the length) with `values`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::KindMismatch`] if any value has another kind
    /// than the array.
    pub fn with_values(mut self, values: impl IntoIterator<Item = Value>) -> Result<Self, SettingsError> {
        let values: Vec<Value> = values.into_iter().collect();
        if let Some(bad) = values.iter().find(|v| v.kind() != self.kind()) {
            return Err(SettingsError::KindMismatch {
                key: self.key.clone(),
                expected: self.kind(),
                actual: bad.kind(),
            });
        }
        self.values = values;
        Ok(self)
    }

    /// Set the display step for float elements. Ignored for other kinds.
    #[must_use]
    pub fn with_step(mut self, step: f32) -> Self {
        if self.kind() == ValueKind::Float {
            self.step = step;
            self.precision = value::precision_from_step(step);
        }
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn precision(&self) -> u32 {
        if self.kind() == ValueKind::Float {
            self.precision
        } else {
            0
        }
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Storage and form name of element `index`.
    pub fn element_key(&self, index: usize) -> String {
        format!("{}_{index}", self.key)
    }

    /// Number of out-of-range accesses seen so far.
    pub fn out_of_range_count(&self) -> usize {
        self.out_of_range.load(Ordering::Relaxed)
    }

    fn record_out_of_range(&self, index: usize) {
        self.out_of_range.fetch_add(1, Ordering::Relaxed);
        warn!(key = %self.key, index, len = self.values.len(), "array index out of range");
    }

    /// Element `index`, or the default fill value when out of range.
    pub fn get(&self, index: usize) -> Value {
        if let Some(v) = self.values.get(index) {
            v.clone()
        } else {
            self.record_out_of_range(index);
            self.default.clone()
        }
    }

    /// Replace element `index`.
    ///
    /// # Errors
    ///
    /// - [`SettingsError::IndexOutOfRange`] if `index >= len()`.
    /// - [`SettingsError::KindMismatch`] if `value` has another kind.
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), SettingsError> {
        if value.kind() != self.kind() {
            return Err(SettingsError::KindMismatch {
                key: self.element_key(index),
                expected: self.kind(),
                actual: value.kind(),
            });
        }
        let len = self.values.len();
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => {
                self.record_out_of_range(index);
                Err(SettingsError::IndexOutOfRange {
                    key: self.key.clone(),
                    index,
                    len,
                })
            }
        }
    }

    /// Resize to `len` elements. Elements below the smaller of the two
    /// lengths keep their values and positions; new slots get the default.
    ///
    /// Returns `true` if the length changed. Arrays registered in a block
    /// are resized through [`Registry::resize_array`](crate::block::Registry::resize_array),
    /// which checks the new element keys first.
    pub(crate) fn ensure_size(&mut self, len: usize) -> bool {
        if self.values.len() == len {
            return false;
        }
        warn!(
            key = %self.key,
            from = self.values.len(),
            to = len,
            "resizing array field"
        );
        self.values.resize(len, self.default.clone());
        true
    }

    /// Text form of element `index` (the default's text when out of range).
    pub fn element_text(&self, index: usize) -> String {
        self.get(index).to_text(self.precision())
    }

    pub async fn load(&mut self, prefs: &Preferences) {
        for index in 0..self.values.len() {
            let key = self.element_key(index);
            let loaded = prefs.get_value(&key, &self.values[index]).await;
            self.values[index] = loaded;
        }
    }

    /// Write every element. Stops at the first storage failure.
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub async fn save(&self, prefs: &Preferences) -> Result<(), StorageError> {
        for (index, value) in self.values.iter().enumerate() {
            prefs.put_value(&self.element_key(index), value).await?;
        }
        Ok(())
    }

    /// One input control per element, separated by spaces.
    pub fn render_input(&self) -> String {
        let precision = self.precision();
        self.values
            .iter()
            .enumerate()
            .map(|(index, value)| html::input_control(&self.element_key(index), value, precision))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Apply `key_i` arguments element by element. Missing boolean elements
    /// turn off; missing elements of other kinds keep their value.
    pub fn apply_form(&mut self, request: &FormRequest) {
        let kind = self.kind();
        for index in 0..self.values.len() {
            let key = self.element_key(index);
            if let Some(text) = request.arg(&key) {
                self.values[index] = Value::parse(kind, text);
            } else if kind == ValueKind::Boolean {
                self.values[index] = Value::Boolean(false);
            }
        }
    }
}
