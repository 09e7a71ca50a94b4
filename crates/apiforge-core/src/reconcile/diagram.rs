//! Bounded search for ASCII diagrams in an arbitrary JSON graph.

use serde_json::Value;

/// Default recursion limit for [`find_ascii_diagram`].
pub const MAX_DIAGRAM_DEPTH: usize = 5;

/// A diagram must be longer than this many characters.
pub const MIN_DIAGRAM_CHARS: usize = 50;

/// Property names checked before any other property.
pub const DIAGRAM_KEYS: [&str; 5] = ["asciiDiagram", "diagram", "content", "result", "output"];

fn is_box_drawing(c: char) -> bool {
    ('\u{2500}'..='\u{257F}').contains(&c)
}

/// Byte offset of the first box-drawing character, if `text` is long enough
/// to count as a diagram.
pub(crate) fn first_box_drawing(text: &str) -> Option<usize> {
    if text.chars().count() <= MIN_DIAGRAM_CHARS {
        return None;
    }
    text.char_indices()
        .find(|(_, c)| is_box_drawing(*c))
        .map(|(pos, _)| pos)
}

pub fn is_ascii_diagram(text: &str) -> bool {
    first_box_drawing(text).is_some()
}

/// Find a diagram string anywhere within `max_depth` levels of `value`.
///
/// At each object the [`DIAGRAM_KEYS`] are tried first (in order), then
/// every other property. Each object or array level adds one to the depth;
/// the root is depth 0.
pub fn find_ascii_diagram(value: &Value, max_depth: usize) -> Option<String> {
    search(value, 0, max_depth)
}

fn search(value: &Value, depth: usize, max_depth: usize) -> Option<String> {
    if depth > max_depth {
        return None;
    }
    match value {
        Value::String(s) => is_ascii_diagram(s).then(|| s.clone()),
        Value::Array(items) => items
            .iter()
            .find_map(|item| search(item, depth + 1, max_depth)),
        Value::Object(map) => {
            let named = DIAGRAM_KEYS
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(|v| search(v, depth + 1, max_depth));
            named.or_else(|| {
                map.iter()
                    .filter(|(key, _)| !DIAGRAM_KEYS.contains(&key.as_str()))
                    .find_map(|(_, v)| search(v, depth + 1, max_depth))
            })
        }
        _ => None,
    }
}
