//! HTML fragments for the edit form.

use crate::value::Value;

/// Escape text for use inside HTML element content or a quoted attribute.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render one input control named `name` showing `value`.
///
/// Booleans become checkboxes submitting `1` when checked; an unchecked box
/// submits nothing, which the form parser treats as `false`.
#[must_use]
pub fn input_control(name: &str, value: &Value, precision: u32) -> String {
    let name = escape(name);
    match value {
        Value::Boolean(checked) => format!(
            "<input type='checkbox' name='{name}' value='1'{}>",
            if *checked { " checked" } else { "" }
        ),
        Value::Float(_) => format!(
            "<input type='text' inputmode='decimal' name='{name}' value='{}'>",
            value.to_text(precision)
        ),
        Value::Integer(_) => format!(
            "<input type='text' inputmode='numeric' name='{name}' value='{}'>",
            value.to_text(precision)
        ),
        Value::Text(text) => {
            format!("<input type='text' name='{name}' value='{}'>", escape(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_and_quotes() {
        assert_eq!(
            escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn checkbox_reflects_state() {
        assert_eq!(
            input_control("dryRun", &Value::Boolean(true), 0),
            "<input type='checkbox' name='dryRun' value='1' checked>"
        );
        assert_eq!(
            input_control("dryRun", &Value::Boolean(false), 0),
            "<input type='checkbox' name='dryRun' value='1'>"
        );
    }

    #[test]
    fn numeric_inputs_use_precision() {
        assert_eq!(
            input_control("targetEC", &Value::Float(1.2), 2),
            "<input type='text' inputmode='decimal' name='targetEC' value='1.20'>"
        );
        assert_eq!(
            input_control("dayLength", &Value::Integer(16), 0),
            "<input type='text' inputmode='numeric' name='dayLength' value='16'>"
        );
    }

    #[test]
    fn text_values_are_escaped() {
        assert_eq!(
            input_control("name", &Value::Text("it's <b>".to_owned()), 0),
            "<input type='text' name='name' value='it&#39;s &lt;b&gt;'>"
        );
    }
}
