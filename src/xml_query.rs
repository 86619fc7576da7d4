//! Compiled field queries for XML nodes.
//!
//! An XML field locates its value inside a node element with a small path
//! expression, compiled once per field and memoized on the descriptor.
//!
//! Supported syntax, always relative to the node element:
//!
//! | Expression | Meaning |
//! |------------|---------|
//! | `name` | text of the first child element `name` |
//! | `a/b` | nested child elements |
//! | `@id`, `a/@id` | attribute value |
//! | `.`, `./name` | the node itself |
//! | `text()` | text of the current element |
//! | `//name` | first descendant element `name` at any depth |

use indexmap::IndexMap;

use crate::error::{RecfmtError, Result};

/// One step of a compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `.`
    SelfNode,
    /// Child element by name
    Child(String),
    /// Descendant element by name
    Descendant(String),
    /// Attribute by name; always the last step
    Attribute(String),
    /// Text content; always the last step
    Text,
}

/// A parsed query expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    expression: String,
    steps: Vec<Step>,
}

/// In-memory XML element used when evaluating queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Element name as written (including any prefix)
    pub name: String,
    /// Attributes in document order
    pub attributes: IndexMap<String, String>,
    /// Concatenated text and CDATA content
    pub text: String,
    /// Child elements in document order
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Create an element with no content.
    pub fn new(name: impl Into<String>) -> Self {
        XmlNode {
            name: name.into(),
            ..XmlNode::default()
        }
    }

    fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    fn is_named(&self, name: &str) -> bool {
        self.name == name || (!name.contains(':') && self.local_name() == name)
    }

    fn find_descendant(&self, name: &str) -> Option<&XmlNode> {
        for child in &self.children {
            if child.is_named(name) {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| {
                key.as_str() == name
                    || (!name.contains(':') && key.rsplit(':').next() == Some(name))
            })
            .map(|(_, value)| value.as_str())
    }
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

impl CompiledQuery {
    /// Parse `expression`.
    ///
    /// # Errors
    ///
    /// Returns [`RecfmtError::Configuration`] for blank or malformed expressions.
    pub fn compile(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(RecfmtError::Configuration(
                "Missing query expression.".to_string(),
            ));
        }
        let invalid = |reason: &str| {
            RecfmtError::Configuration(format!("Invalid query expression '{trimmed}': {reason}"))
        };

        let (mut rest, mut descendant) = match trimmed.strip_prefix("//") {
            Some(rest) => (rest, true),
            None if trimmed.starts_with('/') => return Err(invalid("absolute paths are not supported")),
            None => (trimmed, false),
        };

        let mut steps = Vec::new();
        loop {
            let (segment, tail) = match rest.find('/') {
                Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
                None => (rest, None),
            };
            if matches!(steps.last(), Some(Step::Attribute(_) | Step::Text)) {
                return Err(invalid("attribute and text() must be the last step"));
            }

            let step = if segment == "." {
                if descendant {
                    return Err(invalid("'.' cannot follow '//'"));
                }
                Step::SelfNode
            } else if segment == "text()" {
                Step::Text
            } else if let Some(attr) = segment.strip_prefix('@') {
                if !is_valid_name(attr) {
                    return Err(invalid("bad attribute name"));
                }
                Step::Attribute(attr.to_string())
            } else if is_valid_name(segment) {
                if descendant {
                    Step::Descendant(segment.to_string())
                } else {
                    Step::Child(segment.to_string())
                }
            } else {
                return Err(invalid("bad step"));
            };
            steps.push(step);

            match tail {
                None => break,
                Some(tail) => {
                    descendant = tail.starts_with('/');
                    rest = tail.strip_prefix('/').unwrap_or(tail);
                },
            }
        }

        Ok(CompiledQuery {
            expression: trimmed.to_string(),
            steps,
        })
    }

    /// The source expression.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Parsed steps.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Evaluate against `node`, returning the located text.
    ///
    /// Returns `None` when the path does not exist, which the reader treats
    /// as a missing value source.
    #[must_use]
    pub fn evaluate<'n>(&self, node: &'n XmlNode) -> Option<&'n str> {
        let mut current = node;
        for step in &self.steps {
            match step {
                Step::SelfNode => {},
                Step::Child(name) => {
                    current = current.children.iter().find(|c| c.is_named(name))?;
                },
                Step::Descendant(name) => {
                    current = current.find_descendant(name)?;
                },
                Step::Attribute(name) => return current.attribute(name),
                Step::Text => return Some(&current.text),
            }
        }
        Some(&current.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node() -> XmlNode {
        let mut node = XmlNode::new("Employee");
        node.attributes.insert("id".to_string(), "7".to_string());
        let mut name = XmlNode::new("name");
        name.text = "Ada".to_string();
        let mut address = XmlNode::new("address");
        address
            .attributes
            .insert("kind".to_string(), "home".to_string());
        let mut city = XmlNode::new("ns:city");
        city.text = "London".to_string();
        address.children.push(city);
        node.children.push(name);
        node.children.push(address);
        node
    }

    #[test]
    fn test_compile_steps() {
        let query = CompiledQuery::compile("./address/@kind").unwrap();
        assert_eq!(
            query.steps(),
            &[
                Step::SelfNode,
                Step::Child("address".to_string()),
                Step::Attribute("kind".to_string()),
            ]
        );
        let query = CompiledQuery::compile("//city").unwrap();
        assert_eq!(query.steps(), &[Step::Descendant("city".to_string())]);
    }

    #[test]
    fn test_compile_rejects_bad_expressions() {
        assert!(CompiledQuery::compile("   ").is_err());
        assert!(CompiledQuery::compile("/abs").is_err());
        assert!(CompiledQuery::compile("@id/name").is_err());
        assert!(CompiledQuery::compile("a//").is_err());
        assert!(CompiledQuery::compile("1abc").is_err());
    }

    #[test]
    fn test_evaluate() {
        let node = sample_node();
        let eval = |expr: &str| {
            CompiledQuery::compile(expr)
                .unwrap()
                .evaluate(&node)
                .map(str::to_string)
        };
        assert_eq!(eval("name"), Some("Ada".to_string()));
        assert_eq!(eval("@id"), Some("7".to_string()));
        assert_eq!(eval("address/@kind"), Some("home".to_string()));
        assert_eq!(eval("address/city"), Some("London".to_string()));
        assert_eq!(eval("//city"), Some("London".to_string()));
        assert_eq!(eval("name/text()"), Some("Ada".to_string()));
        assert_eq!(eval("missing"), None);
        assert_eq!(eval("@missing"), None);
    }
}
