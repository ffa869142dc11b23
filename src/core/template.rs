//! Minimal `{placeholder}` substitution for reminder messages.
//!
//! Placeholders without a matching value are left verbatim so a template
//! typo is visible in the delivered message instead of silently vanishing.
//! Deliberately not a template engine.

use std::collections::HashMap;

/// Substitute `{name}` placeholders with the given values.
pub fn render(template: &str, values: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let out = render(
            "Hi {patientName}, see you at {appointmentTime}.",
            &values(&[("patientName", "Ana"), ("appointmentTime", "14:00")]),
        );
        assert_eq!(out, "Hi Ana, see you at 14:00.");
    }

    #[test]
    fn test_render_leaves_unresolved_placeholders_verbatim() {
        let out = render("Hi {patientName}, {missing}!", &values(&[("patientName", "Ana")]));
        assert_eq!(out, "Hi Ana, {missing}!");
    }

    #[test]
    fn test_render_repeated_placeholder() {
        let out = render("{name} {name}", &values(&[("name", "x")]));
        assert_eq!(out, "x x");
    }

    #[test]
    fn test_render_no_placeholders() {
        let out = render("plain text", &values(&[("unused", "x")]));
        assert_eq!(out, "plain text");
    }
}
