//! Funnel domain model.
//!
//! A funnel is an ordered sequence of pages, each holding an ordered sequence
//! of blocks. Pages and blocks are held behind `Arc` so that an update copies
//! only the path from the root to the edited node; untouched siblings are
//! shared by reference between the old and the new funnel value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Opaque renderer properties of a block.
pub type BlockProperties = Map<String, Value>;

/// The kind of step a page represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Intro,
    Question,
    Transition,
    Result,
    Offer,
    #[default]
    Custom,
}

/// A content unit inside a page.
///
/// `block_type` and `properties` belong to the renderer and are never
/// interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub properties: BlockProperties,
}

impl Block {
    pub fn new(id: impl Into<String>, block_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            block_type: block_type.into(),
            properties: BlockProperties::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Display settings of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSettings {
    #[serde(default = "default_true")]
    pub show_progress: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<String>,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            show_progress: true,
            background_color: None,
            text_color: None,
            max_width: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A named step of the funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub page_type: PageType,
    /// Position within the funnel; always equal to the list index.
    pub order: usize,
    #[serde(default)]
    pub blocks: Vec<Arc<Block>>,
    #[serde(default)]
    pub settings: PageSettings,
}

impl Page {
    /// Finds a block by id.
    pub fn block(&self, block_id: &str) -> Option<&Arc<Block>> {
        self.blocks.iter().find(|b| b.id == block_id)
    }

    pub(crate) fn block_index(&self, block_id: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == block_id)
    }
}

/// Input for a new page; id and order are assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDraft {
    pub name: String,
    #[serde(rename = "type", default)]
    pub page_type: PageType,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub settings: PageSettings,
}

impl PageDraft {
    pub fn new(name: impl Into<String>, page_type: PageType) -> Self {
        Self {
            name: name.into(),
            page_type,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeConfig {
    pub primary_color: String,
    pub secondary_color: String,
    pub background_color: String,
    pub text_color: String,
    pub font_family: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            primary_color: "#8B5CF6".to_string(),
            secondary_color: "#F3E8FF".to_string(),
            background_color: "#FFFFFF".to_string(),
            text_color: "#1F2937".to_string(),
            font_family: "Inter".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_id: Option<String>,
}

/// Behavioural switches of the published funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelSettings {
    pub show_progress_bar: bool,
    pub auto_advance: bool,
    pub enable_history: bool,
    pub analytics_enabled: bool,
}

impl Default for FunnelSettings {
    fn default() -> Self {
        Self {
            show_progress_bar: true,
            auto_advance: false,
            enable_history: true,
            analytics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelConfig {
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub seo: SeoConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub settings: FunnelSettings,
}

/// The top-level document being edited.
///
/// `version` is the number of the last persisted state this value descends
/// from. It only changes when a save succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Funnel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub config: FunnelConfig,
    #[serde(default)]
    pub pages: Vec<Arc<Page>>,
    pub version: u64,
    #[serde(default)]
    pub is_published: bool,
    pub last_modified: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Funnel {
    /// Finds a page by id.
    pub fn page(&self, page_id: &str) -> Option<&Arc<Page>> {
        self.pages.iter().find(|p| p.id == page_id)
    }

    pub(crate) fn page_index(&self, page_id: &str) -> Option<usize> {
        self.pages.iter().position(|p| p.id == page_id)
    }

    /// Returns true if any page holds the block id.
    pub fn contains_block(&self, block_id: &str) -> bool {
        self.pages.iter().any(|p| p.block(block_id).is_some())
    }

    /// Copy of this funnel stamped with a new persisted version.
    pub fn with_version(&self, version: u64, at: DateTime<Utc>) -> Self {
        Self {
            version,
            last_modified: at,
            ..self.clone()
        }
    }

    /// Compares everything but the version stamp and `last_modified`.
    pub fn same_content(&self, other: &Funnel) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.config == other.config
            && self.pages == other.pages
            && self.is_published == other.is_published
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_serializes_type_tag() {
        let block = Block::new("b-1", "heading").with_property("text", "Hello");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "heading");
        assert_eq!(json["properties"]["text"], "Hello");
    }

    #[test]
    fn test_page_type_snake_case() {
        let json = serde_json::to_string(&PageType::Offer).unwrap();
        assert_eq!(json, "\"offer\"");
    }

    #[test]
    fn test_funnel_round_trips_through_json() {
        let now = Utc::now();
        let funnel = Funnel {
            id: "f-1".to_string(),
            name: "Quiz".to_string(),
            config: FunnelConfig::default(),
            pages: vec![Arc::new(Page {
                id: "p-1".to_string(),
                name: "Intro".to_string(),
                page_type: PageType::Intro,
                order: 0,
                blocks: vec![Arc::new(Block::new("b-1", "button"))],
                settings: PageSettings::default(),
            })],
            version: 3,
            is_published: false,
            last_modified: now,
            created_at: now,
        };

        let json = serde_json::to_string(&funnel).unwrap();
        let back: Funnel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, funnel);
        assert!(json.contains("\"lastModified\""));
    }

    #[test]
    fn test_same_content_ignores_version_stamp() {
        let funnel = crate::funnel::default_funnel("Quiz");
        let later = funnel.with_version(7, Utc::now());
        assert!(later.same_content(&funnel));

        let mut renamed = later.clone();
        Arc::make_mut(&mut renamed.pages[0]).name = "Other".to_string();
        assert!(!renamed.same_content(&funnel));
    }
}
