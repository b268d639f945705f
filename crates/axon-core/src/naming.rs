//! Functional group names derived from command class codes

/// Prefix every driver command class code carries
pub const COMMAND_CLASS_PREFIX: &str = "COMMAND_CLASS_";

/// Name used when a code has no words left after the prefix
const FALLBACK_NAME: &str = "unknown";

/// Derive the tree name of a functional group
///
/// `COMMAND_CLASS_SWITCH_BINARY` with instance 1 becomes `switchBinary`,
/// with instance 2 `switchBinary2`. The same inputs always give the same
/// name, so repeated value notifications land in the same group.
pub fn derive_group_name(command_class: &str, instance: u8) -> String {
    let body = command_class
        .strip_prefix(COMMAND_CLASS_PREFIX)
        .unwrap_or(command_class);

    let camel: String = body
        .split('_')
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect();

    let mut name = lower_first(&camel);
    if name.is_empty() {
        name = FALLBACK_NAME.to_string();
    }
    if instance > 1 {
        name.push_str(&instance.to_string());
    }
    name
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
