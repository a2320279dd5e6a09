#![forbid(unsafe_code)]

//! Markup serialization.
//!
//! Renders the live tree as compact HTML-like text. Template content is
//! inert and is not rendered; a template prints as an empty
//! `<template ...></template>` marker. Properties are not rendered.

use std::fmt::Write;

use crate::node::{Node, NodeData};

impl Node {
    /// Serialize this node and its live descendants.
    #[must_use]
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        write_node(self, &mut out);
        out
    }

    /// Serialize only the children.
    #[must_use]
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for child in self.children() {
            write_node(&child, &mut out);
        }
        out
    }
}

fn write_node(node: &Node, out: &mut String) {
    let element = {
        let data = node.0.data.borrow();
        match &*data {
            NodeData::Text(text) => {
                escape_into(text, false, out);
                return;
            }
            NodeData::Fragment => None,
            NodeData::Element(el) | NodeData::Template(el, _) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attributes {
                    let _ = write!(out, " {name}=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                Some((el.tag.clone(), matches!(&*data, NodeData::Template(..))))
            }
        }
    };

    match element {
        None => {
            for child in node.children() {
                write_node(&child, out);
            }
        }
        Some((tag, is_template)) => {
            if !is_template {
                for child in node.children() {
                    write_node(&child, out);
                }
            }
            let _ = write!(out, "</{tag}>");
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
