/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

/// One step of an [`AttributePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A top-level attribute or a map key.
    Name(String),
    /// A list position.
    Index(usize),
}

/// A path to a (possibly nested) attribute, e.g. `address.lines[0]`.
///
/// Parsing from a string splits on `.` and `[n]`. Use [`AttributePath::name`] for a
/// top-level attribute whose name itself contains those characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath {
    segments: Vec<PathSegment>,
}

impl AttributePath {
    /// A top-level attribute, taken literally.
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Name(name.into())],
        }
    }

    /// Parses a dotted path with list indexes.
    ///
    /// Malformed bracket groups are kept as part of the name rather than rejected.
    pub fn parse(path: &str) -> Self {
        let mut segments = Vec::new();
        for part in path.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(idx) => (&part[..idx], &part[idx..]),
                None => (part, ""),
            };
            let mut indexes = Vec::new();
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(end) = stripped.find(']') else {
                    break;
                };
                let Ok(index) = stripped[..end].parse::<usize>() else {
                    break;
                };
                indexes.push(PathSegment::Index(index));
                rest = &stripped[end + 1..];
            }
            if rest.is_empty() {
                segments.push(PathSegment::Name(name.to_string()));
                segments.extend(indexes);
            } else {
                segments.push(PathSegment::Name(part.to_string()));
            }
        }
        Self { segments }
    }

    /// Appends a map key.
    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Name(name.into()));
        self
    }

    /// Appends a list index.
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(PathSegment::Index(index));
        self
    }

    /// The path segments, outermost first.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The top-level attribute this path starts at.
    pub fn root(&self) -> &str {
        match self.segments.first() {
            Some(PathSegment::Name(name)) => name,
            _ => "",
        }
    }

    /// The innermost named segment, used to derive value placeholder names.
    pub fn leaf_name(&self) -> &str {
        self.segments
            .iter()
            .rev()
            .find_map(|segment| match segment {
                PathSegment::Name(name) => Some(name.as_str()),
                PathSegment::Index(_) => None,
            })
            .unwrap_or("")
    }

    /// Returns `true` if the path is a single top-level attribute.
    pub fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Name(name) if idx == 0 => f.write_str(name)?,
                PathSegment::Name(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for AttributePath {
    fn from(path: &str) -> Self {
        AttributePath::parse(path)
    }
}

impl From<String> for AttributePath {
    fn from(path: String) -> Self {
        AttributePath::parse(&path)
    }
}

impl From<&String> for AttributePath {
    fn from(path: &String) -> Self {
        AttributePath::parse(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_paths() {
        let path = AttributePath::parse("address.lines[0][2].zip");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Name("address".into()),
                PathSegment::Name("lines".into()),
                PathSegment::Index(0),
                PathSegment::Index(2),
                PathSegment::Name("zip".into()),
            ]
        );
        assert_eq!(path.root(), "address");
        assert_eq!(path.leaf_name(), "zip");
        assert_eq!(path.to_string(), "address.lines[0][2].zip");
    }

    #[test]
    fn malformed_brackets_stay_in_the_name() {
        let path = AttributePath::parse("weird[x]");
        assert_eq!(path.segments(), &[PathSegment::Name("weird[x]".into())]);
        assert!(AttributePath::name("a.b").is_top_level());
    }
}
