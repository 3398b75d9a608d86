/// Remove the common leading whitespace of all non-blank lines and trim
/// surrounding blank lines.
///
/// The first line is ignored when computing the indent if it is not itself
/// indented, so `"Summary.\n    Details."` dedents like a docstring.
pub fn dedent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    // Counted in chars: indentation may use multibyte whitespace.
    let indent_of = |l: &str| l.chars().take_while(|c| c.is_whitespace()).count();

    let candidates = lines
        .iter()
        .enumerate()
        .filter(|(i, l)| !l.trim().is_empty() && !(*i == 0 && indent_of(l) == 0));
    let common = candidates.map(|(_, l)| indent_of(l)).min().unwrap_or(0);

    let out: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| {
            if l.trim().is_empty() {
                ""
            } else if i == 0 && indent_of(l) < common {
                l.trim_start()
            } else {
                strip_indent(l, common)
            }
        })
        .collect();

    out.join("\n").trim_matches('\n').trim_end().to_string()
}

/// Drop up to `n` leading whitespace chars.
fn strip_indent(line: &str, n: usize) -> &str {
    let start = line
        .char_indices()
        .take_while(|(_, c)| c.is_whitespace())
        .nth(n)
        .map_or_else(|| line.len() - line.trim_start().len(), |(i, _)| i);
    &line[start..]
}

/// Convert `snake_case` into `PascalCase`, title-casing each word.
pub fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect()
}

/// Whether `name` is a valid identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedent_strips_common_indent() {
        let text = "\n    SYSTEM: You are a librarian.\n      Be brief.\n    USER: Hi\n";
        assert_eq!(
            dedent(text),
            "SYSTEM: You are a librarian.\n  Be brief.\nUSER: Hi"
        );
    }

    #[test]
    fn test_dedent_docstring_first_line() {
        let text = "Summary line.\n\n    Args:\n        x: a value.";
        assert_eq!(dedent(text), "Summary line.\n\nArgs:\n    x: a value.");
    }

    #[test]
    fn test_dedent_multibyte_indent() {
        let text = "Title\n  USER: a\n\u{3000}b";
        assert_eq!(dedent(text), "Title\n USER: a\nb");

        let text = "\n\u{3000}\u{3000}first\n\u{3000}\u{3000}  second";
        assert_eq!(dedent(text), "first\n  second");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("format_book"), "FormatBook");
        assert_eq!(pascal_case("get_HTML_page"), "GetHtmlPage");
        assert_eq!(pascal_case("search"), "Search");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("FormatBook"));
        assert!(is_identifier("_private1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("has space"));
        assert!(!is_identifier(""));
    }
}
