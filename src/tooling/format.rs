//! Text rendering for collections and trees.

use crate::collection::{CollectionRoot, Layout};
use crate::tree::{EntryKind, NodeView, TreeView};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn layout_label(layout: Layout) -> &'static str {
    match layout {
        Layout::Flat => "flat",
        Layout::Partitioned => "partitioned",
    }
}

/// Collections as a table, in display order.
pub fn format_collections_text(collections: &[CollectionRoot]) -> String {
    if collections.is_empty() {
        return "No collections.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Order", "Id", "Name", "Layout", "Expanded"]);
    for collection in collections {
        table.add_row(vec![
            collection.order.to_string(),
            collection.id.to_string(),
            collection.name.clone(),
            layout_label(collection.layout).to_string(),
            if collection.expanded { "yes" } else { "no" }.to_string(),
        ]);
    }
    table.to_string()
}

/// Indented outline of a tree. Collapsed directories still list their
/// contents; the marker shows the stored state.
pub fn format_tree_text(root: &CollectionRoot, view: &TreeView) -> String {
    let mut out = format!("{}\n", format_section_heading(&root.name));
    if view.child_nodes.is_empty() {
        out.push_str("  (empty)\n");
        return out;
    }
    for node in &view.child_nodes {
        push_node(&mut out, node, 1);
    }
    out
}

fn push_node(out: &mut String, node: &NodeView, depth: usize) {
    let indent = "  ".repeat(depth);
    match node.kind {
        EntryKind::Dir => {
            let marker = if node.expanded { "▾" } else { "▸" };
            out.push_str(&format!(
                "{}{} {}/  {}\n",
                indent,
                marker,
                node.name.blue().bold(),
                format!("#{} {}", node.order, node.id).dimmed()
            ));
            for child in &node.child_nodes {
                push_node(out, child, depth + 1);
            }
        }
        EntryKind::Item => {
            let protocol = node
                .protocol
                .as_deref()
                .map(|p| format!("[{}] ", p.to_uppercase()))
                .unwrap_or_default();
            out.push_str(&format!(
                "{}  {}{}  {}\n",
                indent,
                protocol.yellow(),
                node.name,
                format!("#{} {}", node.order, node.id).dimmed()
            ));
        }
    }
}
