use std::sync::LazyLock;

use mailmerge_common::Recipient;
use regex::{Captures, Regex};

#[allow(clippy::unwrap_used, reason = "The pattern is a valid constant")]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").unwrap());

/// Substitute every `{{name}}` with the recipient's `name` column.
///
/// Whitespace inside the braces is ignored, so `{{ name }}` works too.
/// Placeholders naming a column the recipient does not have are left as
/// they are.
#[must_use]
pub fn render(template: &str, recipient: &Recipient) -> String {
    PLACEHOLDER
        .replace_all(template, |captures: &Captures<'_>| {
            let name = captures[1].trim();
            recipient
                .get(name)
                .map_or_else(|| captures[0].to_string(), str::to_string)
        })
        .into_owned()
}

/// Names of the placeholders still present in `text`, in order of
/// appearance, duplicates included.
#[must_use]
pub fn unresolved_variables(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|captures| captures[1].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use ahash::AHashMap;
    use pretty_assertions::assert_eq;

    use super::*;

    fn recipient() -> Recipient {
        let fields = AHashMap::from_iter([
            ("first name".to_string(), "Grace".to_string()),
            ("company".to_string(), "Navy".to_string()),
        ]);
        Recipient::new("grace@example.com", fields)
    }

    #[test]
    fn test_substitutes_known_fields() {
        assert_eq!(
            render("Hi {{first name}} from {{ company }}", &recipient()),
            "Hi Grace from Navy"
        );
        assert_eq!(render("{{email}}", &recipient()), "grace@example.com");
    }

    #[test]
    fn test_unknown_placeholders_are_left_verbatim() {
        assert_eq!(
            render("Hi {{nickname}}, {{first name}}", &recipient()),
            "Hi {{nickname}}, Grace"
        );
    }

    #[test]
    fn test_malformed_braces_are_untouched() {
        assert_eq!(render("{{}} {first name} {{{", &recipient()), "{{}} {first name} {{{");
    }

    #[test]
    fn test_unresolved_variables() {
        let rendered = render("{{a}} {{first name}} {{b}} {{a}}", &recipient());
        assert_eq!(unresolved_variables(&rendered), vec!["a", "b", "a"]);
        assert!(unresolved_variables("nothing here").is_empty());
    }
}
