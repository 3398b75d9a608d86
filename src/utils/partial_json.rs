//! Best-effort completion of truncated JSON, used while tool arguments are
//! still streaming in.

use serde_json::Value;

/// Close whatever is open in `partial` and parse it.
///
/// An unterminated string is closed in place. If the closed text still does not
/// parse (dangling key, `:` without a value, half a literal), the input is cut back
/// to the last container boundary and closed again. Returns `None` when nothing
/// parseable remains.
pub fn repair_partial_json(partial: &str) -> Option<Value> {
    let trimmed = partial.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    // (byte offset to cut at, closers valid for that prefix)
    let mut cut_points: Vec<(usize, String)> = Vec::new();

    for (i, c) in trimmed.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => {
                stack.push(c);
                cut_points.push((i + 1, closers(&stack)));
            }
            '}' | ']' => {
                stack.pop();
            }
            ',' => cut_points.push((i, closers(&stack))),
            _ => {}
        }
    }

    let mut full = trimmed.to_string();
    if in_string {
        if escaped {
            full.pop();
        }
        full.push('"');
    }
    full.push_str(&closers(&stack));
    if let Ok(v) = serde_json::from_str::<Value>(&full) {
        return Some(v);
    }

    cut_points.iter().rev().find_map(|(cut, close)| {
        let candidate = format!("{}{}", &trimmed[..*cut], close);
        serde_json::from_str::<Value>(&candidate).ok()
    })
}

fn closers(stack: &[char]) -> String {
    stack
        .iter()
        .rev()
        .map(|c| if *c == '{' { '}' } else { ']' })
        .collect()
}
