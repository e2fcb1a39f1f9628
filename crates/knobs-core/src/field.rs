//! Scalar settings fields.
//!
//! A [`Field`] is one named, typed value. Its key doubles as the storage key
//! inside the owning block's namespace and as the HTML form field name.

use knobs_storage::StorageError;

use crate::error::SettingsError;
use crate::html;
use crate::prefs::Preferences;
use crate::request::FormRequest;
use crate::value::{self, Value, ValueKind};

/// Step used by float fields constructed without an explicit one.
pub const DEFAULT_FLOAT_STEP: f32 = 0.01;

/// One named, typed setting.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    key: String,
    label: String,
    step: f32,
    precision: u32,
    value: Value,
}

impl Field {
    /// Create a field whose kind is the kind of `default`.
    ///
    /// Float fields start with [`DEFAULT_FLOAT_STEP`]; see
    /// [`with_step`](Self::with_step).
    #[must_use]
    pub fn new(key: impl Into<String>, label: impl Into<String>, default: Value) -> Self {
        let step = match default.kind() {
            ValueKind::Float => DEFAULT_FLOAT_STEP,
            _ => 1.0,
        };
        Self {
            key: key.into(),
            label: label.into(),
            step,
            precision: value::precision_from_step(step),
            value: default,
        }
    }

    #[must_use]
    pub fn float(key: impl Into<String>, label: impl Into<String>, default: f32, step: f32) -> Self {
        Self::new(key, label, Value::Float(default)).with_step(step)
    }

    #[must_use]
    pub fn integer(key: impl Into<String>, label: impl Into<String>, default: i32) -> Self {
        Self::new(key, label, Value::Integer(default))
    }

    #[must_use]
    pub fn boolean(key: impl Into<String>, label: impl Into<String>, default: bool) -> Self {
        Self::new(key, label, Value::Boolean(default))
    }

    #[must_use]
    pub fn text(
        key: impl Into<String>,
        label: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self::new(key, label, Value::Text(default.into()))
    }

    /// Set the display step. The precision is derived from it once, here.
    /// Ignored for non-float fields.
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
        self.value.kind()
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    /// Decimal places used when rendering; always 0 for non-float fields.
    pub fn precision(&self) -> u32 {
        if self.kind() == ValueKind::Float {
            self.precision
        } else {
            0
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Replace the value.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::KindMismatch`] if `value` has another kind.
    pub fn set(&mut self, value: Value) -> Result<(), SettingsError> {
        if value.kind() != self.kind() {
            return Err(SettingsError::KindMismatch {
                key: self.key.clone(),
                expected: self.kind(),
                actual: value.kind(),
            });
        }
        self.value = value;
        Ok(())
    }

    /// Parse `text` into the value. Never fails; see [`Value::parse`].
    pub fn from_text(&mut self, text: &str) {
        self.value = Value::parse(self.kind(), text);
    }

    pub fn to_text(&self) -> String {
        self.value.to_text(self.precision())
    }

    /// Load the stored value, keeping the current one if nothing is stored.
    pub async fn load(&mut self, prefs: &Preferences) {
        self.value = prefs.get_value(&self.key, &self.value).await;
    }

    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub async fn save(&self, prefs: &Preferences) -> Result<(), StorageError> {
        prefs.put_value(&self.key, &self.value).await
    }

    pub fn render_input(&self) -> String {
        html::input_control(&self.key, &self.value, self.precision())
    }

    /// Apply this field's argument from a submitted form.
    ///
    /// A missing argument turns a boolean off (browsers omit unchecked
    /// checkboxes) and leaves every other kind untouched.
    pub fn apply_form(&mut self, request: &FormRequest) {
        if let Some(text) = request.arg(&self.key) {
            self.from_text(text);
        } else if self.kind() == ValueKind::Boolean {
            self.value = Value::Boolean(false);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::sync::Arc;

    use knobs_storage::MemoryBackend;

    use super::*;

    #[test]
    fn precision_derived_from_step() {
        let temp = Field::float("temp", "Temperature", 20.0, 0.1);
        assert_eq!(temp.precision(), 1);
        assert_eq!(temp.to_text(), "20.0");

        let ec = Field::new("targetEC", "Target EC", Value::Float(1.2));
        assert_eq!(ec.precision(), 2);
        assert_eq!(ec.to_text(), "1.20");
    }

    #[test]
    fn half_tie_rounds_up_on_display() {
        let mut temp = Field::float("temp", "Temperature", 20.0, 0.1);
        temp.from_text("21.25");
        assert_eq!(temp.value(), &Value::Float(21.25));
        assert_eq!(temp.to_text(), "21.3");
    }

    #[test]
    fn step_is_ignored_for_integers() {
        let days = Field::integer("dayLength", "Day length [h]", 16).with_step(0.5);
        assert_eq!(days.precision(), 0);
        assert_eq!(days.step(), 1.0);
    }

    #[test]
    fn malformed_numbers_degrade_to_zero() {
        let mut days = Field::integer("dayLength", "Day length [h]", 16);
        days.from_text("soon");
        assert_eq!(days.value(), &Value::Integer(0));

        let mut ec = Field::float("targetEC", "Target EC", 1.2, 0.01);
        ec.from_text("high");
        assert_eq!(ec.value(), &Value::Float(0.0));
    }

    #[test]
    fn set_rejects_other_kinds() {
        let mut dry = Field::boolean("dryRun", "Dry-run mode", true);
        let err = dry.set(Value::Integer(1)).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::KindMismatch {
                expected: ValueKind::Boolean,
                actual: ValueKind::Integer,
                ..
            }
        ));
        dry.set(Value::Boolean(false)).unwrap();
        assert_eq!(dry.value().as_bool(), Some(false));
    }

    #[test]
    fn absent_checkbox_means_false() {
        let mut dry = Field::boolean("dryRun", "Dry-run mode", true);
        dry.apply_form(&FormRequest::post("/hydro/update"));
        assert_eq!(dry.value(), &Value::Boolean(false));

        dry.apply_form(&FormRequest::post("/hydro/update").with_arg("dryRun", "on"));
        assert_eq!(dry.value(), &Value::Boolean(true));
    }

    #[test]
    fn absent_argument_keeps_other_kinds() {
        let request = FormRequest::post("/hydro/update");
        let mut ec = Field::float("targetEC", "Target EC", 1.2, 0.01);
        let mut days = Field::integer("dayLength", "Day length [h]", 16);
        let mut name = Field::text("name", "Name", "tank");

        ec.apply_form(&request);
        days.apply_form(&request);
        name.apply_form(&request);

        assert_eq!(ec.value(), &Value::Float(1.2));
        assert_eq!(days.value(), &Value::Integer(16));
        assert_eq!(name.value(), &Value::Text("tank".to_owned()));
    }

    #[tokio::test]
    async fn load_keeps_default_until_saved() {
        let prefs = Preferences::open(Arc::new(MemoryBackend::new()), "hydro");
        let mut ec = Field::float("targetEC", "Target EC", 1.2, 0.01);

        ec.load(&prefs).await;
        assert_eq!(ec.value(), &Value::Float(1.2));

        ec.from_text("1.45");
        ec.save(&prefs).await.unwrap();

        let mut fresh = Field::float("targetEC", "Target EC", 1.2, 0.01);
        fresh.load(&prefs).await;
        assert_eq!(fresh.to_text(), "1.45");
    }

    #[test]
    fn render_uses_key_as_name() {
        let name = Field::text("name", "Name", "a'b");
        assert_eq!(
            name.render_input(),
            "<input type='text' name='name' value='a&#39;b'>"
        );
    }
}
