//! Scope paths: addressing a sub-value inside a structured value.
//!
//! Two spellings are accepted:
//! - dotted paths, `address.street` or `items.0.name`
//! - RFC 6901 JSON Pointers, `/address/street` (with `~0` and `~1` escapes)
//!
//! The empty string is the root (the whole value). Containment is decided on
//! parsed components, so `address` contains `address.street` but not
//! `addressing`.

use serde_json::Value;
use std::fmt;

use crate::error::{CoreError, Result};

/// How a path was written. Derived paths keep the syntax of their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSyntax {
    Dotted,
    Pointer,
}

/// A parsed scope path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePath {
    components: Vec<String>,
    syntax: PathSyntax,
}

impl ScopePath {
    /// The root path (`""`).
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
            syntax: PathSyntax::Dotted,
        }
    }

    /// Parse a scope string.
    pub fn parse(scope: &str) -> Result<Self> {
        if scope.is_empty() {
            return Ok(Self::root());
        }

        if let Some(rest) = scope.strip_prefix('/') {
            let components = rest
                .split('/')
                .map(|c| unescape_pointer(c).ok_or_else(|| CoreError::InvalidScope(scope.into())))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self {
                components,
                syntax: PathSyntax::Pointer,
            });
        }

        let components: Vec<String> = scope.split('.').map(str::to_owned).collect();
        if components.iter().any(String::is_empty) {
            return Err(CoreError::InvalidScope(scope.into()));
        }
        Ok(Self {
            components,
            syntax: PathSyntax::Dotted,
        })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn syntax(&self) -> PathSyntax {
        self.syntax
    }

    /// Whether `self` equals `ancestor` or lies below it.
    pub fn is_within(&self, ancestor: &ScopePath) -> bool {
        self.components.starts_with(&ancestor.components)
    }

    /// `self` re-rooted at `ancestor`, or `None` if `self` isn't within it.
    ///
    /// `address.street` relative to `address` is `street`; `address`
    /// relative to itself is the root.
    pub fn relative_to(&self, ancestor: &ScopePath) -> Option<ScopePath> {
        if !self.is_within(ancestor) {
            return None;
        }
        Some(Self {
            components: self.components[ancestor.components.len()..].to_vec(),
            syntax: self.syntax,
        })
    }

    /// Prepend a component, e.g. to nest a path under an array slot.
    pub fn prefixed(&self, component: &str) -> ScopePath {
        let mut components = Vec::with_capacity(self.components.len() + 1);
        components.push(component.to_owned());
        components.extend(self.components.iter().cloned());
        Self {
            components,
            syntax: self.syntax,
        }
    }

    /// Navigate `value` along this path.
    ///
    /// Object members are looked up by name, array elements by decimal index.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for component in &self.components {
            current = match current {
                Value::Object(map) => map.get(component)?,
                Value::Array(items) => items.get(component.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for ScopePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.syntax {
            _ if self.components.is_empty() => Ok(()),
            PathSyntax::Dotted => f.write_str(&self.components.join(".")),
            PathSyntax::Pointer => {
                for component in &self.components {
                    write!(f, "/{}", escape_pointer(component))?;
                }
                Ok(())
            }
        }
    }
}

fn unescape_pointer(component: &str) -> Option<String> {
    let mut out = String::with_capacity(component.len());
    let mut chars = component.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next()? {
                '0' => out.push('~'),
                '1' => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn escape_pointer(component: &str) -> String {
    component.replace('~', "~0").replace('/', "~1")
}
