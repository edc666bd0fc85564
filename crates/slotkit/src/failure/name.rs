/// Trims a type or function path down to the segment worth showing in a log
/// line.
///
/// Generic arguments are dropped and only the last path segment is kept. A
/// closure keeps the name of the item that defines it, so
/// `app::jobs::resize::{{closure}}` becomes `resize::{{closure}}`.
///
/// ```
/// use slotkit::short_type_name;
///
/// assert_eq!(short_type_name("app::jobs::resize"), "resize");
/// assert_eq!(short_type_name("app::jobs::resize::{{closure}}"), "resize::{{closure}}");
/// assert_eq!(short_type_name("alloc::sync::Arc<app::Job>"), "Arc");
/// ```
pub fn short_type_name(full: &str) -> String {
    let mut plain = String::with_capacity(full.len());
    let mut depth = 0_usize;
    for ch in full.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => plain.push(ch),
            _ => {}
        }
    }

    let segments: Vec<&str> = plain.split("::").filter(|s| !s.is_empty()).collect();
    let closure = segments.last().is_some_and(|s| is_closure(s));
    let Some(item) = segments.iter().rev().find(|s| !is_closure(s)) else {
        return plain;
    };

    if closure {
        format!("{item}::{{{{closure}}}}")
    } else {
        (*item).to_string()
    }
}

fn is_closure(segment: &str) -> bool {
    segment.starts_with("{{closure") || segment.starts_with("{closure")
}
