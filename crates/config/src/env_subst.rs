/// Replace `${ENV_VAR}` and `${ENV_VAR:-default}` placeholders in config text.
///
/// Unresolvable variables without a default are left as-is so validation
/// can point at them.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated, emit the remainder literally.
            result.push_str(&rest[start..]);
            return result;
        };

        let body = &after[..end];
        let (name, default) = match body.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };

        match lookup(name).filter(|v| !v.is_empty()) {
            Some(value) if !name.is_empty() => result.push_str(&value),
            _ => match default {
                Some(default) if !name.is_empty() => result.push_str(default),
                _ => result.push_str(&rest[start..start + 2 + end + 1]),
            },
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "CLOUDMON_TEST_PROJECT" => Some("proj-1".to_string()),
            "CLOUDMON_TEST_EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with("project = \"${CLOUDMON_TEST_PROJECT}\"", lookup),
            "project = \"proj-1\""
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_env_with("${CLOUDMON_NONEXISTENT_XYZ}", lookup),
            "${CLOUDMON_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(
            substitute_env_with("${CLOUDMON_NONEXISTENT_XYZ:-global}", lookup),
            "global"
        );
        assert_eq!(
            substitute_env_with("${CLOUDMON_TEST_EMPTY:-fallback}", lookup),
            "fallback"
        );
        assert_eq!(
            substitute_env_with("${CLOUDMON_TEST_PROJECT:-unused}", lookup),
            "proj-1"
        );
    }

    #[test]
    fn multiple_placeholders_on_one_line() {
        assert_eq!(
            substitute_env_with("${CLOUDMON_TEST_PROJECT}/${NOPE:-x}/${NOPE}", lookup),
            "proj-1/x/${NOPE}"
        );
    }

    #[test]
    fn malformed_placeholders_are_literal() {
        assert_eq!(substitute_env_with("${}", lookup), "${}");
        assert_eq!(substitute_env_with("cost: ${5", lookup), "cost: ${5");
        assert_eq!(substitute_env_with("plain $text", lookup), "plain $text");
    }
}
