//! Retained document tree the map draws into.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; removed nodes stay
//! in the arena detached from the tree so stale ids never alias new nodes,
//! but nothing walks them again.
//! Transitions are recorded on nodes and either completed with
//! [`Document::settle`] or serialized as `<animate>` children.

use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Attr(String),
    Style(String),
}

impl Property {
    pub fn attr(name: &str) -> Self {
        Property::Attr(name.to_string())
    }

    pub fn style(name: &str) -> Self {
        Property::Style(name.to_string())
    }

    fn name(&self) -> &str {
        match self {
            Property::Attr(name) | Property::Style(name) => name,
        }
    }
}

/// Default duration of a transition when none is given.
pub const DEFAULT_TRANSITION_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub property: Property,
    pub to: String,
    pub delay_ms: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    attrs: BTreeMap<String, String>,
    styles: BTreeMap<String, String>,
    classes: Vec<String>,
    text: Option<String>,
    html: Option<String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    transitions: Vec<Transition>,
    exiting: bool,
}

impl Node {
    fn new(tag: &str) -> Self {
        Node {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            styles: BTreeMap::new(),
            classes: Vec::new(),
            text: None,
            html: None,
            children: Vec::new(),
            parent: None,
            transitions: Vec::new(),
            exiting: false,
        }
    }
}

/// Host document: a `head` for shared styles and the host element the map is
/// mounted in.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    head: NodeId,
    host: NodeId,
    host_size: Size,
}

impl Default for Document {
    fn default() -> Self {
        Document::new(0.0, 0.0)
    }
}

impl Document {
    /// A document whose host element measures `width` x `height`.
    pub fn new(width: f64, height: f64) -> Self {
        let mut doc = Document {
            nodes: vec![Node::new("head"), Node::new("div")],
            head: NodeId(0),
            host: NodeId(1),
            host_size: Size { width, height },
        };
        doc.set_attr(doc.host, "id", "container");
        doc
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn host_size(&self) -> Size {
        self.host_size
    }

    pub fn set_host_size(&mut self, size: Size) {
        self.host_size = size;
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn append(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.insert_before(parent, tag, None)
    }

    /// Insert a new child before `before`, or at the end when `before` is
    /// `None` or not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, tag: &str, before: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut node = Node::new(tag);
        node.parent = Some(parent);
        self.nodes.push(node);

        let children = &mut self.node_mut(parent).children;
        match before.and_then(|b| children.iter().position(|c| *c == b)) {
            Some(index) => children.insert(index, id),
            None => children.push(id),
        }
        id
    }

    /// Detach a node (and with it, its subtree) from the tree. Pending
    /// transitions in the subtree are dropped.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.node_mut(parent).children.retain(|c| *c != id);
        }
        for node in self.subtree(id) {
            let node = self.node_mut(node);
            node.transitions.clear();
            node.exiting = false;
        }
    }

    /// `id` and its descendants, parents before children.
    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.node(next).children.iter().rev());
        }
        out
    }

    /// Move a node to the end of its parent's children (top of paint order).
    pub fn raise(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            let children = &mut self.node_mut(parent).children;
            children.retain(|c| *c != id);
            children.push(id);
        }
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.host || current == self.head {
                return true;
            }
            match self.node(current).parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn tag(&self, id: NodeId) -> &str {
        &self.node(id).tag
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id).attrs.get(name).map(String::as_str)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl ToString) {
        self.node_mut(id).attrs.insert(name.to_string(), value.to_string());
    }

    pub fn style(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id).styles.get(name).map(String::as_str)
    }

    pub fn set_style(&mut self, id: NodeId, name: &str, value: impl ToString) {
        self.node_mut(id).styles.insert(name.to_string(), value.to_string());
    }

    pub fn remove_style(&mut self, id: NodeId, name: &str) {
        self.node_mut(id).styles.remove(name);
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        let classes = &mut self.node_mut(id).classes;
        for token in class.split_whitespace() {
            if !classes.iter().any(|c| c == token) {
                classes.push(token.to_string());
            }
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.node(id).classes.iter().any(|c| c == class)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id).text.as_deref()
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        self.node_mut(id).text = Some(text.into());
    }

    pub fn html(&self, id: NodeId) -> Option<&str> {
        self.node(id).html.as_deref()
    }

    /// Raw markup content, written unescaped.
    pub fn set_html(&mut self, id: NodeId, html: impl Into<String>) {
        self.node_mut(id).html = Some(html.into());
    }

    /// Attached descendants of `root` in document order, `root` excluded.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn select_all(&self, root: NodeId, tag: Option<&str>, class: Option<&str>) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| tag.map_or(true, |t| self.tag(*id) == t))
            .filter(|id| class.map_or(true, |c| self.has_class(*id, c)))
            .collect()
    }

    pub fn select(&self, root: NodeId, tag: Option<&str>, class: Option<&str>) -> Option<NodeId> {
        self.select_all(root, tag, class).into_iter().next()
    }

    pub fn child_by_tag(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|c| self.tag(*c) == tag)
    }

    pub fn transition(
        &mut self,
        id: NodeId,
        property: Property,
        to: impl ToString,
        delay_ms: u64,
        duration_ms: u64,
    ) {
        self.node_mut(id).transitions.push(Transition {
            property,
            to: to.to_string(),
            delay_ms,
            duration_ms,
        });
    }

    /// Remove the node once its pending transitions have run.
    pub fn exit(&mut self, id: NodeId) {
        self.node_mut(id).exiting = true;
    }

    pub fn is_exiting(&self, id: NodeId) -> bool {
        self.node(id).exiting
    }

    pub fn pending_transitions(&self, id: NodeId) -> &[Transition] {
        &self.node(id).transitions
    }

    /// Run every pending transition to completion and drop exiting nodes.
    /// Only nodes still in the tree are visited.
    pub fn settle(&mut self) {
        let mut attached = self.subtree(self.head);
        attached.extend(self.subtree(self.host));
        for id in attached {
            let transitions = std::mem::take(&mut self.node_mut(id).transitions);
            for transition in transitions {
                match transition.property {
                    Property::Attr(name) => self.set_attr(id, &name, transition.to),
                    Property::Style(name) => self.set_style(id, &name, transition.to),
                }
            }
            if self.node(id).exiting {
                self.node_mut(id).exiting = false;
                self.remove(id);
            }
        }
    }

    /// Append a `<style>` block to the head unless one carrying `marker`
    /// already exists. Returns whether a block was added.
    pub fn inject_style_once(&mut self, marker: &str, css: &str) -> bool {
        if self.select(self.head, Some("style"), Some(marker)).is_some() {
            return false;
        }
        let style = self.append(self.head, "style");
        self.add_class(style, marker);
        self.set_text(style, css);
        true
    }

    /// Serialize one node and its subtree.
    pub fn markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(&mut out, id);
        out
    }

    /// Full HTML page with the head styles and the host element.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        for style in self.children(self.head) {
            self.write_node(&mut out, *style);
            out.push('\n');
        }
        out.push_str("</head>\n<body>\n");
        self.write_node(&mut out, self.host);
        out.push_str("\n</body>\n</html>\n");
        out
    }

    fn write_node(&self, out: &mut String, id: NodeId) {
        let node = self.node(id);
        let _ = write!(out, "<{}", node.tag);
        if !node.classes.is_empty() {
            let _ = write!(out, " class=\"{}\"", xml_escape(&node.classes.join(" ")));
        }
        for (name, value) in &node.attrs {
            let _ = write!(out, " {}=\"{}\"", name, xml_escape(value));
        }
        if !node.styles.is_empty() {
            let style: Vec<String> = node.styles.iter().map(|(k, v)| format!("{k}: {v}")).collect();
            let _ = write!(out, " style=\"{}\"", xml_escape(&style.join("; ")));
        }

        let empty = node.children.is_empty()
            && node.text.is_none()
            && node.html.is_none()
            && node.transitions.is_empty();
        if empty && !is_html_container(&node.tag) {
            out.push_str("/>");
            return;
        }
        out.push('>');

        for transition in &node.transitions {
            let attribute_type = match transition.property {
                Property::Attr(_) => "XML",
                Property::Style(_) => "CSS",
            };
            let _ = write!(
                out,
                "<animate attributeName=\"{}\" attributeType=\"{}\" to=\"{}\" begin=\"{}ms\" dur=\"{}ms\" fill=\"freeze\"/>",
                transition.property.name(),
                attribute_type,
                xml_escape(&transition.to),
                transition.delay_ms,
                transition.duration_ms.max(1),
            );
        }
        if let Some(text) = &node.text {
            out.push_str(&xml_escape(text));
        }
        if let Some(html) = &node.html {
            out.push_str(html);
        }
        for child in &node.children {
            self.write_node(out, *child);
        }
        let _ = write!(out, "</{}>", node.tag);
    }
}

fn is_html_container(tag: &str) -> bool {
    matches!(tag, "div" | "dl" | "dt" | "dd" | "h2" | "style" | "svg" | "g" | "text")
}

/// Escape the XML special characters for attribute values and text.
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
