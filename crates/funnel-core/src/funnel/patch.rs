//! Partial updates applied by the document store.
//!
//! Every field is optional; `None` leaves the target untouched.

use super::model::{
    AnalyticsConfig, Block, BlockProperties, FunnelConfig, FunnelSettings, Page, PageSettings,
    PageType, SeoConfig, ThemeConfig,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub page_type: Option<PageType>,
    pub settings: Option<SettingsPatch>,
}

impl PagePatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.page_type.is_none() && self.settings.is_none()
    }

    pub(crate) fn apply(&self, page: &Page) -> Page {
        let mut next = page.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(page_type) = self.page_type {
            next.page_type = page_type;
        }
        if let Some(settings) = &self.settings {
            next.settings = settings.apply(&page.settings);
        }
        next
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub show_progress: Option<bool>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub max_width: Option<String>,
}

impl SettingsPatch {
    pub(crate) fn apply(&self, settings: &PageSettings) -> PageSettings {
        PageSettings {
            show_progress: self.show_progress.unwrap_or(settings.show_progress),
            background_color: self
                .background_color
                .clone()
                .or_else(|| settings.background_color.clone()),
            text_color: self.text_color.clone().or_else(|| settings.text_color.clone()),
            max_width: self.max_width.clone().or_else(|| settings.max_width.clone()),
        }
    }
}

/// Block update. `properties` keys are merged into the existing map; a JSON
/// `null` value removes the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPatch {
    #[serde(rename = "type")]
    pub block_type: Option<String>,
    pub properties: Option<BlockProperties>,
}

impl BlockPatch {
    /// Patch setting a single property.
    pub fn property(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let mut properties = BlockProperties::new();
        properties.insert(key.into(), value.into());
        Self {
            block_type: None,
            properties: Some(properties),
        }
    }

    pub(crate) fn apply(&self, block: &Block) -> Block {
        let mut next = block.clone();
        if let Some(block_type) = &self.block_type {
            next.block_type = block_type.clone();
        }
        if let Some(properties) = &self.properties {
            for (key, value) in properties {
                if value.is_null() {
                    next.properties.remove(key);
                } else {
                    next.properties.insert(key.clone(), value.clone());
                }
            }
        }
        next
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub theme: Option<ThemeConfig>,
    pub seo: Option<SeoConfig>,
    pub analytics: Option<AnalyticsConfig>,
    pub settings: Option<FunnelSettings>,
}

impl ConfigPatch {
    pub(crate) fn apply(&self, config: &FunnelConfig) -> FunnelConfig {
        FunnelConfig {
            theme: self.theme.clone().unwrap_or_else(|| config.theme.clone()),
            seo: self.seo.clone().unwrap_or_else(|| config.seo.clone()),
            analytics: self
                .analytics
                .clone()
                .unwrap_or_else(|| config.analytics.clone()),
            settings: self
                .settings
                .clone()
                .unwrap_or_else(|| config.settings.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_patch_merges_and_removes_keys() {
        let block = Block::new("b-1", "text")
            .with_property("text", "Old")
            .with_property("align", "left");

        let mut properties = BlockProperties::new();
        properties.insert("text".to_string(), json!("New"));
        properties.insert("align".to_string(), serde_json::Value::Null);
        let patch = BlockPatch {
            block_type: None,
            properties: Some(properties),
        };

        let next = patch.apply(&block);
        assert_eq!(next.properties["text"], json!("New"));
        assert!(!next.properties.contains_key("align"));
        assert_eq!(block.properties["text"], json!("Old"));
    }

    #[test]
    fn test_settings_patch_keeps_unset_fields() {
        let settings = PageSettings {
            show_progress: false,
            background_color: Some("#fff".to_string()),
            text_color: None,
            max_width: Some("640px".to_string()),
        };
        let patch = SettingsPatch {
            text_color: Some("#111".to_string()),
            ..Default::default()
        };

        let next = patch.apply(&settings);
        assert!(!next.show_progress);
        assert_eq!(next.background_color.as_deref(), Some("#fff"));
        assert_eq!(next.text_color.as_deref(), Some("#111"));
        assert_eq!(next.max_width.as_deref(), Some("640px"));
    }
}
