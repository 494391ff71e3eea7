//! Node-address list handling.
//!
//! Bridge node lists and cache server lists travel as comma-joined strings
//! at the registry boundary (`"10.0.0.1,10.0.0.2"`), but every in-memory
//! representation is an ordered, de-duplicated `Vec<String>`. Parsing and
//! joining happen here so no other module does string surgery on member
//! lists.
//!
//! Addresses themselves stay opaque: `"host"` and `"host:port"` forms are
//! both accepted and passed through to the connectors unchanged.

/// Split a comma-separated address list into an ordered list.
///
/// Entries are trimmed; empty entries are dropped, so `""`, `","` and
/// `"a,,b"` all behave as expected.
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join an address list into its comma-separated boundary form.
pub fn join_list(addresses: &[String]) -> String {
    addresses.join(",")
}

/// Append an address to an ordered list if not already present.
///
/// Returns `false` (list unchanged) when the address is already a member.
pub fn add_member(addresses: &mut Vec<String>, address: &str) -> bool {
    if addresses.iter().any(|a| a == address) {
        return false;
    }
    addresses.push(address.to_string());
    true
}

/// Remove an address from an ordered list.
///
/// Returns `false` (list unchanged) when the address was not a member.
pub fn remove_member(addresses: &mut Vec<String>, address: &str) -> bool {
    let before = addresses.len();
    addresses.retain(|a| a != address);
    addresses.len() != before
}

/// The members of `addresses` that are not `excluded`.
pub fn peers_of(addresses: &[String], excluded: &str) -> Vec<String> {
    addresses
        .iter()
        .filter(|a| a.as_str() != excluded)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_drops_empties() {
        assert_eq!(split_list("10.0.0.1, 10.0.0.2"), vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(split_list(""), Vec::<String>::new());
        assert_eq!(split_list("a,,b,"), vec!["a", "b"]);
    }

    #[test]
    fn test_split_list_keeps_host_port_forms() {
        assert_eq!(split_list("10.0.0.1:8250"), vec!["10.0.0.1:8250"]);
    }

    #[test]
    fn test_join_round_trip() {
        let nodes = vec!["nodeA".to_string(), "nodeB".to_string()];
        assert_eq!(join_list(&nodes), "nodeA,nodeB");
        assert_eq!(split_list(&join_list(&nodes)), nodes);
    }

    #[test]
    fn test_add_member_rejects_duplicates() {
        let mut nodes = vec!["nodeA".to_string()];
        assert!(add_member(&mut nodes, "nodeB"));
        assert!(!add_member(&mut nodes, "nodeA"));
        assert_eq!(nodes, vec!["nodeA", "nodeB"]);
    }

    #[test]
    fn test_remove_member() {
        let mut nodes = vec!["nodeA".to_string(), "nodeB".to_string()];
        assert!(remove_member(&mut nodes, "nodeA"));
        assert!(!remove_member(&mut nodes, "nodeC"));
        assert_eq!(nodes, vec!["nodeB"]);
    }

    #[test]
    fn test_peers_of() {
        let nodes = vec!["nodeA".to_string(), "nodeB".to_string()];
        assert_eq!(peers_of(&nodes, "nodeA"), vec!["nodeB"]);
        assert_eq!(peers_of(&nodes, "nodeC"), nodes);
    }
}
