//! Generic attribute tree: named nodes, ordered children, string attributes
//! and an optional typed payload.

use crate::error::{MetadataError, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Binary payload carried by a node alongside its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum UserObject {
    Bytes(Vec<u8>),
    /// 64 quantization coefficients in natural (row-major) order.
    QuantizationTable(Vec<u16>),
    HuffmanTable { lengths: Vec<u8>, values: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_object: Option<UserObject>,
}

impl TreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            user_object: None,
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl ToString) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_child(mut self, child: TreeNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_user_object(mut self, object: UserObject) -> Self {
        self.user_object = Some(object);
        self
    }

    pub fn set_attribute(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn append_child(&mut self, child: TreeNode) {
        self.children.push(child);
    }

    pub fn first_child(&self) -> Option<&TreeNode> {
        self.children.first()
    }

    pub fn last_child(&self) -> Option<&TreeNode> {
        self.children.last()
    }

    pub fn find_child(&self, name: &str) -> Option<&TreeNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn invalid(&self, message: impl Into<String>) -> MetadataError {
        MetadataError::invalid_tree(self.name.clone(), message)
    }

    pub fn expect_name(&self, name: &str) -> Result<()> {
        if self.name != name {
            return Err(self.invalid(format!("expected node \"{}\"", name)));
        }
        Ok(())
    }

    pub fn required_attribute(&self, name: &str) -> Result<&str> {
        self.attribute(name)
            .ok_or_else(|| self.invalid(format!("missing attribute \"{}\"", name)))
    }

    /// Reads an integer attribute and checks it against `range`.
    pub fn required_int(&self, name: &str, range: RangeInclusive<u32>) -> Result<u32> {
        let text = self.required_attribute(name)?;
        let value: u32 = text.trim().parse().map_err(|_| {
            self.invalid(format!("attribute \"{}\" is not an integer: {}", name, text))
        })?;
        if !range.contains(&value) {
            return Err(self.invalid(format!(
                "attribute \"{}\" = {} outside {}..={}",
                name,
                value,
                range.start(),
                range.end()
            )));
        }
        Ok(value)
    }

    pub fn optional_int(
        &self,
        name: &str,
        range: RangeInclusive<u32>,
        default: u32,
    ) -> Result<u32> {
        match self.attribute(name) {
            Some(_) => self.required_int(name, range),
            None => Ok(default),
        }
    }

    pub fn required_f32(&self, name: &str) -> Result<f32> {
        let text = self.required_attribute(name)?;
        text.trim()
            .parse()
            .map_err(|_| self.invalid(format!("attribute \"{}\" is not a number: {}", name, text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_range_checks() {
        let node = TreeNode::new("dri")
            .with_attribute("interval", 70000)
            .with_attribute("ok", 12);
        assert!(node.required_int("interval", 0..=65535).unwrap_err().is_invalid_tree());
        assert_eq!(node.required_int("ok", 0..=15).unwrap(), 12);
        assert_eq!(node.optional_int("absent", 0..=3, 2).unwrap(), 2);
        assert!(node.required_int("absent", 0..=3).is_err());
    }

    #[test]
    fn test_set_attribute_replaces() {
        let mut node = TreeNode::new("x").with_attribute("a", 1);
        node.set_attribute("a", 2);
        assert_eq!(node.attributes.len(), 1);
        assert_eq!(node.attribute("a"), Some("2"));
    }

    #[test]
    fn test_json_shape() {
        let node = TreeNode::new("com")
            .with_attribute("comment", "hi")
            .with_user_object(UserObject::Bytes(vec![104, 105]));
        let json = serde_json::to_string(&node).unwrap();
        let back: TreeNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
        assert!(!json.contains("children"));
    }
}
