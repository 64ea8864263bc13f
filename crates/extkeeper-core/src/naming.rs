use std::collections::BTreeMap;

/// Return `name` if unused, otherwise the first free `name (2)`, `name (3)`, ...
pub fn unique_name<V>(taken: &BTreeMap<String, V>, name: &str) -> String {
    if !taken.contains_key(name) {
        return name.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{} ({})", name, counter);
        if !taken.contains_key(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}
