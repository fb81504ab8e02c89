//! `--graphviz`/`--graphviz-filter` (§6): dumps the staged graph to a dot file on every
//! compile, for diagnostic use. Best-effort — a write failure is logged, not fatal.

use std::path::Path;

use mgmt_rgraph::ResourceGraph;

/// Renders `graph` as a dot digraph, keeping only vertices whose `kind/name` id contains
/// `filter` as a substring when one is given.
pub fn render(graph: &ResourceGraph, filter: Option<&str>) -> String {
    let mut out = String::from("digraph mgmt {\n");
    for (_, vertex) in graph.vertices() {
        let id = vertex.id.to_string();
        if filter.is_some_and(|f| !id.contains(f)) {
            continue;
        }
        out.push_str(&format!("  \"{id}\";\n"));
    }
    for (_, from, to, edge) in graph.edges() {
        let from_id = graph.vertex(from).map(|v| v.id.to_string()).unwrap_or_default();
        let to_id = graph.vertex(to).map(|v| v.id.to_string()).unwrap_or_default();
        if let Some(f) = filter {
            if !from_id.contains(f) && !to_id.contains(f) {
                continue;
            }
        }
        let style = if edge.notify { " [style=bold]" } else { "" };
        out.push_str(&format!("  \"{from_id}\" -> \"{to_id}\"{style};\n"));
    }
    out.push_str("}\n");
    out
}

pub async fn dump(graph: &ResourceGraph, path: &Path, filter: Option<&str>) {
    let dot = render(graph, filter);
    if let Err(e) = tokio::fs::write(path, dot).await {
        log::warn!("failed to write graphviz dump to {}: {e}", path.display());
    }
}
