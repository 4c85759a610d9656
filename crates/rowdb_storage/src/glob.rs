//! Glob pattern matching for scan queries.
//!
//! The supported syntax is pinned to two metacharacters: `*` matches
//! any run of characters (including the empty run) and `?` matches
//! exactly one character. There are no character classes and no
//! escaping; every other character matches itself.

/// Matches `text` against a glob `pattern`.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    // Backtracking point for the most recent `*`.
    let (mut star, mut mark) = (None::<usize>, 0usize);

    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            // Extend the last `*` by one more character.
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn literal_match() {
        assert!(glob_match("hello", "hello"));
        assert!(!glob_match("hello", "hell"));
        assert!(!glob_match("hell", "hello"));
    }

    #[test]
    fn star_matches_any_run() {
        assert!(glob_match("*", ""));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("*Company", "TestCompany"));
        assert!(glob_match("Undefstr*", "Undefstr 7"));
        assert!(glob_match("*str*", "Nullstr 5"));
        assert!(!glob_match("*Company", "TestCompanyX"));
    }

    #[test]
    fn question_matches_one_char() {
        assert!(glob_match("h?llo", "hello"));
        assert!(!glob_match("h?llo", "hllo"));
        assert!(!glob_match("?", ""));
    }

    #[test]
    fn composite_index_field_match() {
        // Secondary index fields are `<id>\0<value>`; lookups prepend `*\0`.
        let field = format!("row-1{}Ann", '\0');
        assert!(glob_match(&format!("*{}Ann", '\0'), &field));
        assert!(!glob_match(&format!("*{}Anne", '\0'), &field));
    }

    proptest! {
        #[test]
        fn text_always_matches_itself(s in "[a-zA-Z0-9 /._-]{0,40}") {
            prop_assert!(glob_match(&s, &s));
        }

        #[test]
        fn star_prefix_matches_any_suffix(
            prefix in "[a-z]{0,10}",
            suffix in "[a-z]{0,10}",
        ) {
            let pattern = format!("{prefix}*");
            let text = format!("{prefix}{suffix}");
            prop_assert!(glob_match(&pattern, &text));
        }
    }
}
