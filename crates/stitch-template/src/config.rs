#![forbid(unsafe_code)]

//! Binding configuration.
//!
//! Names the engine treats specially: which bound names are written as
//! attributes, the property a text binding targets, the attribute prefix
//! that declares an event handler, and the reserved region attributes.

/// Binding configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BindingConfig {
    /// Bound names written through `set_attribute` instead of as properties.
    /// Default: `["style", "class"]`
    pub attribute_names: Vec<String>,

    /// Name recorded for a text-node binding.
    /// Default: `"textContent"`
    pub text_property: String,

    /// Attribute prefix declaring an event handler (`on-click="save"`).
    /// Default: `"on-"`
    pub event_prefix: String,

    /// Default: `"if"`
    pub if_attribute: String,

    /// Default: `"bind"`
    pub bind_attribute: String,

    /// Default: `"repeat"`
    pub repeat_attribute: String,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            attribute_names: vec!["style".to_owned(), "class".to_owned()],
            text_property: "textContent".to_owned(),
            event_prefix: "on-".to_owned(),
            if_attribute: "if".to_owned(),
            bind_attribute: "bind".to_owned(),
            repeat_attribute: "repeat".to_owned(),
        }
    }
}

impl BindingConfig {
    /// Add a host-specific name to the attribute set.
    #[must_use]
    pub fn with_attribute_name(mut self, name: impl Into<String>) -> Self {
        self.attribute_names.push(name.into());
        self
    }

    /// Fill empty names with defaults and drop blank or duplicate attribute
    /// names.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let pick = |value: &str, fallback: String| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                fallback
            } else {
                trimmed.to_owned()
            }
        };

        let mut attribute_names: Vec<String> = Vec::with_capacity(self.attribute_names.len());
        for name in &self.attribute_names {
            let name = name.trim();
            if !name.is_empty() && !attribute_names.iter().any(|n| n == name) {
                attribute_names.push(name.to_owned());
            }
        }

        Self {
            attribute_names,
            text_property: pick(&self.text_property, defaults.text_property),
            event_prefix: pick(&self.event_prefix, defaults.event_prefix),
            if_attribute: pick(&self.if_attribute, defaults.if_attribute),
            bind_attribute: pick(&self.bind_attribute, defaults.bind_attribute),
            repeat_attribute: pick(&self.repeat_attribute, defaults.repeat_attribute),
        }
    }

    #[must_use]
    pub fn is_attribute_name(&self, name: &str) -> bool {
        self.attribute_names.iter().any(|n| n == name)
    }

    /// Event name declared by `attribute`, if it carries the handler prefix.
    #[must_use]
    pub fn event_name<'a>(&self, attribute: &'a str) -> Option<&'a str> {
        attribute
            .strip_prefix(self.event_prefix.as_str())
            .filter(|event| !event.is_empty())
    }
}
