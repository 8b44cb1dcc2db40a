//! Local node source backed by a directory of markdown files.
//!
//! Each node lives in `<id>.md` somewhere under the root. The file starts
//! with a TOML frontmatter block fenced by `+++` lines holding `id`, `type`
//! and a `[properties]` table; the markdown body after the fence is the
//! node's `content` property, byte for byte. An empty or non-string
//! `content` stays in the frontmatter so the file reads back unchanged.
//!
//! ```text
//! +++
//! id = "TASK-42"
//! type = "Task"
//!
//! [properties]
//! title = "Login form"
//! status = "todo"
//! +++
//! The form posts to `/api/session`.
//! ```
//!
//! Files without frontmatter are still read: the id comes from the file
//! name, the type from the id prefix and the title from the first heading.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use tracing::{debug, warn};

use devgraph_core::{DevgraphError, DevgraphResult, Node, NodeType, Properties};

use super::{LocalNode, LocalNodeSource, LocalSnapshot, SkippedEntry};

const FENCE: &str = "+++";
const CONTENT: &str = "content";

pub struct MarkdownDirSource {
    root: PathBuf,
}

impl MarkdownDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All `.md` files under the root, sorted by path.
    async fn markdown_files(&self) -> DevgraphResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(files);
        }

        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "md") {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn read_node(path: &Path) -> DevgraphResult<LocalNode> {
        let text = tokio::fs::read_to_string(path).await?;
        let modified = tokio::fs::metadata(path).await?.modified()?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        parse_document(&stem, &text, DateTime::<Utc>::from(modified))
    }

    async fn existing_path(&self, id: &str) -> DevgraphResult<Option<PathBuf>> {
        let file_name = format!("{}.md", id);
        Ok(self
            .markdown_files()
            .await?
            .into_iter()
            .find(|p| p.file_name().is_some_and(|n| n.to_str() == Some(file_name.as_str()))))
    }
}

#[async_trait]
impl LocalNodeSource for MarkdownDirSource {
    async fn load(&self) -> DevgraphResult<LocalSnapshot> {
        let mut snapshot = LocalSnapshot::default();
        for path in self.markdown_files().await? {
            match Self::read_node(&path).await {
                Ok(node) => snapshot.nodes.push(node),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable node file");
                    snapshot.skipped.push(SkippedEntry {
                        id: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        debug!(
            root = %self.root.display(),
            nodes = snapshot.nodes.len(),
            skipped = snapshot.skipped.len(),
            "Loaded local nodes"
        );
        Ok(snapshot)
    }

    async fn write(&self, node: &Node) -> DevgraphResult<()> {
        let path = match self.existing_path(&node.id).await? {
            Some(path) => path,
            None => self
                .root
                .join(node.node_type.label().to_lowercase())
                .join(format!("{}.md", node.id)),
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, render_document(node)?).await?;
        debug!(node_id = %node.id, path = %path.display(), "Wrote node file");
        Ok(())
    }
}

/// Split `+++` frontmatter from the body. `None` when the file has none.
fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("+++\n")
        .or_else(|| text.strip_prefix("+++\r\n"))?;
    if let Some(body) = rest.strip_prefix(FENCE) {
        return Some(("", strip_newline(body)));
    }
    let close = rest.find("\n+++")?;
    Some((&rest[..close], strip_newline(&rest[close + 1 + FENCE.len()..])))
}

fn strip_newline(s: &str) -> &str {
    s.strip_prefix("\r\n")
        .or_else(|| s.strip_prefix('\n'))
        .unwrap_or(s)
}

fn parse_document(stem: &str, text: &str, updated_at: DateTime<Utc>) -> DevgraphResult<LocalNode> {
    let (front, body, plain) = match split_frontmatter(text) {
        Some((front, body)) => {
            let table: toml::Table = front
                .parse()
                .map_err(|e| DevgraphError::validation(format!("Invalid frontmatter: {}", e)))?;
            (table, body, false)
        }
        None => (toml::Table::new(), text, true),
    };

    let id = match front.get("id") {
        Some(toml::Value::String(id)) => id.clone(),
        Some(_) => return Err(DevgraphError::validation("Frontmatter 'id' must be a string")),
        None => stem.to_string(),
    };

    let node_type = match front.get("type") {
        Some(toml::Value::String(t)) => t.parse::<NodeType>()?,
        Some(_) => return Err(DevgraphError::validation("Frontmatter 'type' must be a string")),
        None => type_from_prefix(&id)?,
    };

    let mut properties = Properties::new();
    if let Some(value) = front.get("properties") {
        let toml::Value::Table(table) = value else {
            return Err(DevgraphError::validation("Frontmatter 'properties' must be a table"));
        };
        for (key, value) in table {
            properties.insert(key.clone(), toml_to_json(value));
        }
    }

    // An empty body leaves a `content` kept in the frontmatter untouched.
    if !body.is_empty() {
        properties.insert(CONTENT.to_string(), serde_json::Value::String(body.to_string()));
    }
    // Only hand-written files get an inferred title; frontmatter is authoritative.
    if plain {
        if let Some(title) = first_heading(body) {
            properties.insert("title".to_string(), serde_json::Value::String(title));
        }
    }

    Ok(LocalNode {
        id,
        node_type,
        properties,
        updated_at,
    })
}

/// `TASK-42` is a Task, `ADR-004` an ADR.
fn type_from_prefix(id: &str) -> DevgraphResult<NodeType> {
    let prefix = id.split(['-', '_']).next().unwrap_or_default();
    prefix.parse::<NodeType>().map_err(|_| {
        DevgraphError::validation(format!(
            "Cannot infer node type of '{}'; add a 'type' to the frontmatter",
            id
        ))
    })
}

fn first_heading(markdown: &str) -> Option<String> {
    let mut in_heading = false;
    let mut title = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { .. }) => in_heading = true,
            Event::End(TagEnd::Heading(_)) => {
                let title = title.trim();
                return (!title.is_empty()).then(|| title.to_string());
            }
            Event::Text(text) | Event::Code(text) if in_heading => title.push_str(&text),
            _ => {}
        }
    }
    None
}

fn render_document(node: &Node) -> DevgraphResult<String> {
    let mut properties = toml::Table::new();
    let mut body = "";
    for (key, value) in &node.properties {
        match (key.as_str(), value) {
            (CONTENT, serde_json::Value::String(content)) if !content.is_empty() => body = content,
            _ => {
                if let Some(value) = json_to_toml(value) {
                    properties.insert(key.clone(), value);
                }
            }
        }
    }

    let mut front = toml::Table::new();
    front.insert("id".to_string(), toml::Value::String(node.id.clone()));
    front.insert(
        "type".to_string(),
        toml::Value::String(node.node_type.label().to_string()),
    );
    front.insert("properties".to_string(), toml::Value::Table(properties));

    let front = toml::to_string(&front)
        .map_err(|e| DevgraphError::internal(format!("Failed to render frontmatter: {}", e)))?;
    Ok(format!("{}\n{}{}\n{}", FENCE, front, FENCE, body))
}

fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::from(*i),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        toml::Value::Boolean(b) => serde_json::Value::Bool(*b),
        toml::Value::Datetime(d) => serde_json::Value::String(d.to_string()),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect(),
        ),
    }
}

/// TOML has no null; null properties are dropped.
fn json_to_toml(value: &serde_json::Value) -> Option<toml::Value> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(toml::Value::Boolean(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(toml::Value::Integer(i)),
            None => n.as_f64().map(toml::Value::Float),
        },
        serde_json::Value::String(s) => Some(toml::Value::String(s.clone())),
        serde_json::Value::Array(items) => Some(toml::Value::Array(
            items.iter().filter_map(json_to_toml).collect(),
        )),
        serde_json::Value::Object(map) => Some(toml::Value::Table(
            map.iter()
                .filter_map(|(k, v)| json_to_toml(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
    }
}
