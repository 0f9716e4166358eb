//! TQ-016: Deterministic ids for tasks and result items (BLAKE3).

/// Hex characters kept from the digest.
pub const ID_LEN: usize = 16;

/// Well-known id of the plan root node and the root task.
pub const ROOT_ID: &str = "ROOT";

/// Short id from ordered components. Components are NUL-separated before hashing so
/// `("ab", "c")` and `("a", "bc")` differ.
pub fn composite_id(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..ID_LEN].to_string()
}

/// Id of the task spawned from `parent_item` along a link to `target_node`.
pub fn task_id(parent_item: &str, target_node: &str) -> String {
    composite_id(&["task", parent_item, target_node])
}

/// Id of the result item for `identifier` read under `profile` inside group `group_id`.
/// Identifiers are only unique per profile.
pub fn item_id(group_id: &str, profile: &str, identifier: &str) -> String {
    composite_id(&["item", group_id, profile, identifier])
}
