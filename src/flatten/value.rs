use serde_json::Value;

use super::Node;
use crate::constants::MAX_TREE_DEPTH;
use crate::utils::path;
use crate::FlattenError;

/// Converts a decoded document into a node tree rooted at `key`.
///
/// Objects and arrays become directories (array children are keyed by
/// position), scalars become leaves. `null` values contribute nothing.
pub fn value_to_node(
    key: &str,
    value: &Value,
) -> Result<Option<Node>, FlattenError> {
    convert(key, value, 0)
}

fn convert(
    key: &str,
    value: &Value,
    depth: usize,
) -> Result<Option<Node>, FlattenError> {
    if depth > MAX_TREE_DEPTH {
        return Err(FlattenError::DepthExceeded {
            key: key.to_string(),
            max_depth: MAX_TREE_DEPTH,
        });
    }

    let node = match value {
        Value::Null => return Ok(None),
        Value::String(s) => Node::leaf(key, s.clone()),
        Value::Bool(b) => Node::leaf(key, b.to_string()),
        Value::Number(n) => Node::leaf(key, n.to_string()),
        Value::Array(items) => {
            let mut nodes = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let child_key = path::join([key, i.to_string().as_str()]);
                if let Some(child) = convert(&child_key, item, depth + 1)? {
                    nodes.push(child);
                }
            }
            Node::dir(key, nodes)
        }
        Value::Object(map) => {
            let mut nodes = Vec::with_capacity(map.len());
            for (k, v) in map {
                let child_key = path::join([key, k.as_str()]);
                if let Some(child) = convert(&child_key, v, depth + 1)? {
                    nodes.push(child);
                }
            }
            Node::dir(key, nodes)
        }
    };
    Ok(Some(node))
}
