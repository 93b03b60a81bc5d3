//! Small accessors over `kdl` nodes.
//!
//! Configuration blocks are written as child nodes with a single argument,
//! e.g. `email "admin@example.com"`, so most lookups go through
//! [`child_arg`].

use kdl::{KdlNode, KdlValue};

/// First positional argument of a child node named `name`
fn child_arg<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)?
        .entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(|entry| entry.value())
}

/// Get a string value from a child node, e.g. `email "a@example.com"`
pub fn get_string_entry(node: &KdlNode, name: &str) -> Option<String> {
    child_arg(node, name)
        .and_then(KdlValue::as_string)
        .map(str::to_string)
}

/// Get an integer value from a child node, e.g. `timeout-secs 30`
pub fn get_int_entry(node: &KdlNode, name: &str) -> Option<i128> {
    child_arg(node, name).and_then(KdlValue::as_integer)
}

/// Get a boolean value from a child node, e.g. `staging #true`
pub fn get_bool_entry(node: &KdlNode, name: &str) -> Option<bool> {
    child_arg(node, name).and_then(KdlValue::as_bool)
}

/// Get the first positional argument of the node itself as a string,
/// e.g. the `"primary"` in `account "primary" { ... }`
pub fn get_first_arg_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .and_then(|entry| entry.value().as_string())
        .map(str::to_string)
}

/// Find a child block by name, e.g. `external-account-binding { ... }`
pub fn get_child_block<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlNode> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)
}
