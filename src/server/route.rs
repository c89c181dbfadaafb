use crate::models::ServiceNode;

/// Dotted check path of `node` below `parent_path`. Parser-produced ids of
/// nested nodes are already dotted and are used as they are.
pub fn check_path(parent_path: Option<&str>, node: &ServiceNode) -> String {
    match parent_path {
        Some(parent) if !node.id.contains('.') => format!("{parent}.{}", node.id),
        _ => node.id.clone(),
    }
}

/// URL-style route for `node` given its ancestors, root first.
///
/// The root of the chain is a container when it has children, and its own
/// path never contributes.
pub fn full_route(ancestors: &[&ServiceNode], node: &ServiceNode) -> String {
    let skip = match ancestors.first() {
        Some(root) if !root.children.is_empty() => 1,
        _ => 0,
    };
    let parts: Vec<&str> = ancestors[skip..]
        .iter()
        .chain(std::iter::once(&node))
        .filter_map(|n| n.path.as_deref())
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        node.path.clone().unwrap_or_else(|| "/".to_string())
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Whether one of the parent's exclude rules matches the node's own path.
pub fn is_excluded(parent: Option<&ServiceNode>, node: &ServiceNode) -> bool {
    parent.is_some_and(|p| {
        p.excludes
            .iter()
            .any(|rule| rule.matches(node.path.as_deref()))
    })
}
