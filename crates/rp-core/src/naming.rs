//! Stage labels
//!
//! Helpers that render the arrow notation used by the built-in stages, e.g.
//! `  => lookup(["customer"]) => ["order"] =>`.

/// Full label for a stage.
///
/// `uses_input` adds the leading arrow, `ctx_deps` are the context keys the
/// stage reads, `ctx_outputs` the keys it writes, and `returns_value` adds
/// the trailing arrow.
pub fn stage_name(
    uses_input: bool,
    name: &str,
    ctx_deps: &[&str],
    ctx_outputs: &[&str],
    returns_value: bool,
) -> String {
    let in_arrow = if uses_input { "  => " } else { "" };
    let out_arrow = if returns_value { " =>" } else { "" };

    format!(
        "{}{}{}{}",
        in_arrow,
        func_str(name, ctx_deps),
        ctx_out_str(ctx_outputs),
        out_arrow
    )
}

/// `name(["dep1"], ["dep2"])`
pub fn func_str(name: &str, ctx_deps: &[&str]) -> String {
    format!("{}({})", name, key_list(ctx_deps))
}

/// ` => ["out1"], ["out2"]`, or nothing when there are no outputs.
pub fn ctx_out_str(ctx_outputs: &[&str]) -> String {
    if ctx_outputs.is_empty() {
        return String::new();
    }
    format!(" => {}", key_list(ctx_outputs))
}

fn key_list(keys: &[&str]) -> String {
    keys.iter()
        .map(|key| format!("[\"{}\"]", key))
        .collect::<Vec<_>>()
        .join(", ")
}
