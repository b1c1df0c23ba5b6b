use std::fmt::Write;

use debugger::render_value;
use transport::{DataResponse, ResponseBody, StateNode};

/// The line printed for a response that arrives on its own, if any
pub fn describe(body: &ResponseBody) -> Option<String> {
    match body {
        ResponseBody::Break { call } => Some(format!("Break on {call}.")),
        ResponseBody::BreakEvent { call, event } => Some(format!("{event} in {call}.")),
        ResponseBody::Running { .. } => Some("Running.".to_string()),
        ResponseBody::Error { message, .. } => Some(format!("Error: {message}")),
        ResponseBody::Ans { .. } | ResponseBody::StateTree(_) | ResponseBody::Data(_) => None,
    }
}

fn label(node: &StateNode) -> String {
    if !node.name.is_empty() {
        node.name.clone()
    } else if node.enum_name != 0 {
        format!("{:#06x}", node.enum_name)
    } else {
        node.numeric_name.to_string()
    }
}

fn write_node(out: &mut String, node: &StateNode, depth: usize) {
    let value = render_value(&node.value);
    let _ = write!(out, "{:indent$}{}", "", label(node), indent = depth * 2);
    if !value.is_empty() {
        let _ = write!(out, " = {value}");
    }
    out.push('\n');
    for child in &node.children {
        write_node(out, child, depth + 1);
    }
}

/// Indented text rendering; an unnamed root is not printed itself
pub fn format_tree(node: &StateNode) -> String {
    let mut out = String::new();
    if node.name.is_empty() && node.numeric_name == 0 && node.enum_name == 0 {
        for child in &node.children {
            write_node(&mut out, child, 0);
        }
    } else {
        write_node(&mut out, node, 0);
    }
    out
}

pub fn format_tree_json(node: &StateNode) -> eyre::Result<String> {
    Ok(serde_json::to_string_pretty(node)?)
}

/// Size and dimensions of fetched object data, followed by the text of
/// shaders and info logs
pub fn format_data(data: &DataResponse) -> String {
    let size = data.data().len();
    match data {
        DataResponse::Texture {
            width,
            height,
            depth,
            ..
        } => format!("texture: {size} bytes, {width}x{height}x{depth}"),
        DataResponse::Framebuffer { width, height, .. } => {
            format!("framebuffer: {size} bytes, {width}x{height}")
        }
        DataResponse::Shader { data: text } | DataResponse::InfoLog { data: text } => {
            let text = String::from_utf8_lossy(text);
            format!("{}: {size} bytes\n{}", data.kind(), text.trim_end())
        }
        DataResponse::Buffer { .. } => format!("buffer: {size} bytes"),
    }
}
