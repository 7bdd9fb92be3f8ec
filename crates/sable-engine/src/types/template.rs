//! Parsing of templated type specifications like `Map<string, Track>`.
//!
//! The same depth-aware comma splitter serves container specifications and
//! method argument lists, so nested specs (`Array<Map<int, string>>`) split
//! correctly.

/// Remove all whitespace so `Map<string, int>` and `Map<string,int>` name
/// the same class.
pub fn strip_spaces(spec: &str) -> String {
    spec.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Split a comma-separated list at angle-bracket depth zero.
///
/// Empty input yields an empty list. Items are space-stripped.
pub fn split_type_list(list: &str) -> Vec<String> {
    let list = strip_spaces(list);
    if list.is_empty() {
        return Vec::new();
    }
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in list.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                items.push(list[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(list[start..].to_string());
    items
}

/// Parse `Base<Arg, ...>` into the base name and the argument specs.
///
/// Returns `None` when `spec` is not a template instantiation (no angle
/// brackets) or is malformed (unbalanced brackets, empty argument list).
pub fn parse_template_spec(spec: &str) -> Option<(String, Vec<String>)> {
    let spec = strip_spaces(spec);
    let open = spec.find('<')?;
    if !spec.ends_with('>') || open == 0 {
        return None;
    }
    let base = spec[..open].to_string();
    let args = split_type_list(&spec[open + 1..spec.len() - 1]);
    if args.is_empty() || args.iter().any(|a| a.is_empty()) {
        return None;
    }
    Some((base, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_depth_zero_only() {
        assert_eq!(
            split_type_list("int, Map<string, int>, double"),
            vec!["int", "Map<string,int>", "double"]
        );
    }

    #[test]
    fn empty_list_is_empty() {
        assert!(split_type_list("").is_empty());
        assert!(split_type_list("   ").is_empty());
    }

    #[test]
    fn parses_nested_spec() {
        let (base, args) = parse_template_spec("Array<Map<int, string>>").unwrap();
        assert_eq!(base, "Array");
        assert_eq!(args, vec!["Map<int,string>"]);
    }

    #[test]
    fn parses_two_parameter_spec() {
        let (base, args) = parse_template_spec("Map< string , Track >").unwrap();
        assert_eq!(base, "Map");
        assert_eq!(args, vec!["string", "Track"]);
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(parse_template_spec("int").is_none());
        assert!(parse_template_spec("Array<>").is_none());
        assert!(parse_template_spec("<int>").is_none());
        assert!(parse_template_spec("Array<int").is_none());
    }
}
