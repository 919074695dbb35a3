//! `{key}` template rendering for greeting, mistake and idle texts

use std::collections::HashMap;

/// Substitute `{key}` placeholders with values from the conversation args.
/// Unknown placeholders are left as written so a misconfigured template stays
/// visible instead of silently disappearing.
pub fn render_template(template: &str, args: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match args.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_simple_substitution() {
        assert_eq!(
            render_template("Hi {name}!", &args(&[("name", "Sam")])),
            "Hi Sam!"
        );
    }

    #[test]
    fn test_multiple_keys() {
        assert_eq!(
            render_template(
                "{greeting}, {name}. Welcome to {company}.",
                &args(&[("greeting", "Hello"), ("name", "Sam"), ("company", "Acme")])
            ),
            "Hello, Sam. Welcome to Acme."
        );
    }

    #[test]
    fn test_unknown_keys_kept() {
        assert_eq!(
            render_template("Hi {name}!", &HashMap::new()),
            "Hi {name}!"
        );
    }

    #[test]
    fn test_unclosed_brace() {
        assert_eq!(
            render_template("Hi {name", &args(&[("name", "Sam")])),
            "Hi {name"
        );
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(render_template("plain text", &HashMap::new()), "plain text");
    }
}
