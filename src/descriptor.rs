//! # Component Descriptors
//!
//! A component is declared either with a `@Component({...})` decorator in
//! source or with the explicit [`ComponentConfig`] builder. Both paths end in
//! [`extract_descriptor`], which normalizes the options into a
//! [`ComponentDescriptor`].
//!
//! ## Invariants
//!
//! 1. **Tag**: a descriptor always has a non-empty, trimmed tag. Configs with a
//!    missing, non-string or blank tag produce no descriptor at all.
//! 2. **Encapsulation**: `shadow` wins over `scoped`; neither means `none`.
//! 3. **Assets**: `assetsDirs` followed by `assetsDir`, deduplicated, first
//!    occurrence wins.
//! 4. **Static members**: the member list is emitted in a fixed order and only
//!    contains fields that carry information.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use crate::error::InvalidComponentConfig;
use crate::literal::LiteralValue;

// ═══════════════════════════════════════════════════════════════════════════════
// DESCRIPTOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encapsulation {
    #[default]
    None,
    Shadow,
    Scoped,
}

impl Encapsulation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encapsulation::None => "none",
            Encapsulation::Shadow => "shadow",
            Encapsulation::Scoped => "scoped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Encapsulation::None),
            "shadow" => Some(Encapsulation::Shadow),
            "scoped" => Some(Encapsulation::Scoped),
            _ => None,
        }
    }
}

/// One mode's style source: a single url or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModeStyle {
    Url(String),
    Urls(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleUrls {
    List(Vec<String>),
    /// Mode name to style source, in declaration order.
    ByMode(Vec<(String, ModeStyle)>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    pub tag: String,
    pub encapsulation: Encapsulation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_urls: Option<StyleUrls>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub assets_dirs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styles: Option<String>,
}

impl ComponentDescriptor {
    pub fn new(tag: &str) -> Self {
        ComponentDescriptor {
            tag: tag.to_string(),
            encapsulation: Encapsulation::None,
            style_url: None,
            style_urls: None,
            assets_dirs: Vec::new(),
            styles: None,
        }
    }

    /// The static class members carrying this descriptor, in emission order.
    pub fn static_members(&self) -> Vec<(&'static str, LiteralValue)> {
        let mut members = vec![("is", LiteralValue::string(self.tag.as_str()))];

        if self.encapsulation != Encapsulation::None {
            members.push((
                "encapsulation",
                LiteralValue::string(self.encapsulation.as_str()),
            ));
        }
        if let Some(url) = &self.style_url {
            members.push(("styleUrl", LiteralValue::string(url.as_str())));
        }
        if let Some(urls) = &self.style_urls {
            members.push(("styleUrls", style_urls_to_literal(urls)));
        }
        if !self.assets_dirs.is_empty() {
            members.push(("assetsDirs", LiteralValue::strings(self.assets_dirs.iter())));
        }
        if let Some(styles) = &self.styles {
            members.push(("styles", LiteralValue::string(styles.as_str())));
        }
        members
    }

    /// Rebuild a descriptor from static members read back out of a lowered
    /// class. Returns `None` when the class carries no `is` member.
    pub fn from_static_members(members: &[(String, LiteralValue)]) -> Option<Self> {
        let find = |name: &str| members.iter().find(|(k, _)| k == name).map(|(_, v)| v);

        let tag = find("is")?.as_str()?.to_string();
        let mut descriptor = ComponentDescriptor::new(&tag);

        if let Some(enc) = find("encapsulation").and_then(|v| v.as_str()) {
            descriptor.encapsulation = Encapsulation::parse(enc).unwrap_or_default();
        }
        descriptor.style_url = find("styleUrl").and_then(|v| v.as_str()).map(String::from);
        descriptor.style_urls = find("styleUrls").and_then(style_urls_from_literal);
        if let Some(LiteralValue::Array(items)) = find("assetsDirs") {
            descriptor.assets_dirs = items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
        }
        descriptor.styles = find("styles").and_then(|v| v.as_str()).map(String::from);

        Some(descriptor)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECLARATIVE CONFIG (BUILDER)
// ═══════════════════════════════════════════════════════════════════════════════

/// The options block of a component declaration.
///
/// Values are kept as literals so that wrongly typed options coming from source
/// can be represented and rejected the same way as in the builder path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComponentConfig {
    pub tag: Option<LiteralValue>,
    pub shadow: Option<LiteralValue>,
    pub scoped: Option<LiteralValue>,
    pub style_url: Option<LiteralValue>,
    pub style_urls: Option<LiteralValue>,
    pub styles: Option<LiteralValue>,
    pub assets_dir: Option<LiteralValue>,
    pub assets_dirs: Option<LiteralValue>,
    /// Option names whose value is not a literal.
    pub dynamic_keys: Vec<String>,
}

impl ComponentConfig {
    pub fn new(tag: &str) -> Self {
        ComponentConfig {
            tag: Some(LiteralValue::string(tag)),
            ..Default::default()
        }
    }

    pub fn shadow(mut self, shadow: bool) -> Self {
        self.shadow = Some(LiteralValue::Bool(shadow));
        self
    }

    pub fn scoped(mut self, scoped: bool) -> Self {
        self.scoped = Some(LiteralValue::Bool(scoped));
        self
    }

    pub fn style_url(mut self, url: &str) -> Self {
        self.style_url = Some(LiteralValue::string(url));
        self
    }

    pub fn style_urls(mut self, urls: &[&str]) -> Self {
        self.style_urls = Some(LiteralValue::strings(urls.iter().copied()));
        self
    }

    pub fn styles(mut self, styles: &str) -> Self {
        self.styles = Some(LiteralValue::string(styles));
        self
    }

    pub fn assets_dir(mut self, dir: &str) -> Self {
        self.assets_dir = Some(LiteralValue::string(dir));
        self
    }

    pub fn assets_dirs(mut self, dirs: &[&str]) -> Self {
        self.assets_dirs = Some(LiteralValue::strings(dirs.iter().copied()));
        self
    }

    /// Build from an object literal's `(key, value)` entries.
    pub fn from_entries(entries: Vec<(String, LiteralValue)>) -> Self {
        let mut config = ComponentConfig::default();
        for (key, value) in entries {
            if value == LiteralValue::Dynamic {
                config.dynamic_keys.push(key.clone());
            }
            let slot = match key.as_str() {
                "tag" => &mut config.tag,
                "shadow" => &mut config.shadow,
                "scoped" => &mut config.scoped,
                "styleUrl" => &mut config.style_url,
                "styleUrls" => &mut config.style_urls,
                "styles" => &mut config.styles,
                "assetsDir" => &mut config.assets_dir,
                "assetsDirs" => &mut config.assets_dirs,
                _ => continue,
            };
            *slot = Some(value);
        }
        config
    }

    /// Build from a JSON object, as handed over by the Node bindings. Keys
    /// keep their order, so `styleUrls` modes stay in declaration order.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match LiteralValue::from(value) {
            LiteralValue::Object(entries) => Self::from_entries(entries),
            _ => ComponentConfig::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTRACTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate a config object and return the descriptor as JSON.
#[cfg(feature = "napi")]
#[napi]
pub fn extract_descriptor_native(config: serde_json::Value) -> napi::Result<serde_json::Value> {
    let descriptor = extract_descriptor(&ComponentConfig::from_json(&config))
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(&descriptor).map_err(|e| napi::Error::from_reason(e.to_string()))
}

pub fn extract_descriptor(
    config: &ComponentConfig,
) -> Result<ComponentDescriptor, InvalidComponentConfig> {
    let tag = match &config.tag {
        None => return Err(InvalidComponentConfig::MissingTag),
        Some(LiteralValue::String(tag)) => tag.trim(),
        Some(other) => {
            return Err(InvalidComponentConfig::TagNotString {
                found: other.type_name().to_string(),
            })
        }
    };
    if tag.is_empty() {
        return Err(InvalidComponentConfig::EmptyTag);
    }

    let mut descriptor = ComponentDescriptor::new(tag);

    descriptor.encapsulation = if config.shadow.as_ref().map_or(false, |v| v.is_truthy()) {
        Encapsulation::Shadow
    } else if config.scoped.as_ref().map_or(false, |v| v.is_truthy()) {
        Encapsulation::Scoped
    } else {
        Encapsulation::None
    };

    descriptor.style_url = config
        .style_url
        .as_ref()
        .and_then(|v| v.as_str())
        .filter(|url| !url.is_empty())
        .map(String::from);

    descriptor.style_urls = config.style_urls.as_ref().and_then(style_urls_from_literal);

    let mut assets_dirs: Vec<String> = Vec::new();
    let declared = config
        .assets_dirs
        .iter()
        .flat_map(|v| match v {
            LiteralValue::Array(items) => items.iter().collect::<Vec<_>>(),
            single => vec![single],
        })
        .chain(config.assets_dir.iter());
    for dir in declared.filter_map(|v| v.as_str()) {
        if !dir.is_empty() && !assets_dirs.iter().any(|d| d == dir) {
            assets_dirs.push(dir.to_string());
        }
    }
    descriptor.assets_dirs = assets_dirs;

    descriptor.styles = config
        .styles
        .as_ref()
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(descriptor)
}

fn style_urls_from_literal(value: &LiteralValue) -> Option<StyleUrls> {
    match value {
        LiteralValue::Array(items) => Some(StyleUrls::List(
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
        )),
        LiteralValue::Object(entries) => {
            let modes = entries
                .iter()
                .filter_map(|(mode, v)| match v {
                    LiteralValue::String(url) => Some((mode.clone(), ModeStyle::Url(url.clone()))),
                    LiteralValue::Array(items) => Some((
                        mode.clone(),
                        ModeStyle::Urls(
                            items
                                .iter()
                                .filter_map(|i| i.as_str().map(String::from))
                                .collect(),
                        ),
                    )),
                    _ => None,
                })
                .collect();
            Some(StyleUrls::ByMode(modes))
        }
        _ => None,
    }
}

fn style_urls_to_literal(urls: &StyleUrls) -> LiteralValue {
    match urls {
        StyleUrls::List(list) => LiteralValue::strings(list.iter()),
        StyleUrls::ByMode(modes) => LiteralValue::Object(
            modes
                .iter()
                .map(|(mode, style)| {
                    let value = match style {
                        ModeStyle::Url(url) => LiteralValue::string(url.as_str()),
                        ModeStyle::Urls(list) => LiteralValue::strings(list.iter()),
                    };
                    (mode.clone(), value)
                })
                .collect(),
        ),
    }
}
