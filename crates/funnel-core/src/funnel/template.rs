//! Starter templates for new funnels.

use super::model::{Block, Funnel, FunnelConfig, Page, PageSettings, PageType};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Generates a fresh entity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builds the default funnel: one intro page with a heading and a start button.
///
/// The returned funnel has version 0; it becomes version 1 on its first save.
pub fn default_funnel(name: impl Into<String>) -> Funnel {
    let now = Utc::now();

    let heading = Block::new(new_id(), "heading")
        .with_property("text", "Welcome to your quiz!")
        .with_property("level", 1)
        .with_property("alignment", "center");
    let button = Block::new(new_id(), "button")
        .with_property("text", "Start")
        .with_property("variant", "primary")
        .with_property("size", "large")
        .with_property("alignment", "center");

    let intro = Page {
        id: new_id(),
        name: "Intro".to_string(),
        page_type: PageType::Intro,
        order: 0,
        blocks: vec![Arc::new(heading), Arc::new(button)],
        settings: PageSettings {
            background_color: Some("#ffffff".to_string()),
            ..PageSettings::default()
        },
    };

    Funnel {
        id: new_id(),
        name: name.into(),
        config: FunnelConfig::default(),
        pages: vec![Arc::new(intro)],
        version: 0,
        is_published: false,
        last_modified: now,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_funnel_shape() {
        let funnel = default_funnel("New funnel");

        assert_eq!(funnel.name, "New funnel");
        assert_eq!(funnel.version, 0);
        assert!(!funnel.is_published);
        assert_eq!(funnel.pages.len(), 1);

        let intro = &funnel.pages[0];
        assert_eq!(intro.page_type, PageType::Intro);
        assert_eq!(intro.order, 0);
        assert_eq!(intro.blocks.len(), 2);
        assert_eq!(intro.blocks[0].block_type, "heading");
        assert_eq!(intro.blocks[1].block_type, "button");
        assert_eq!(funnel.config.theme.primary_color, "#8B5CF6");
    }

    #[test]
    fn test_default_funnels_get_distinct_ids() {
        let a = default_funnel("a");
        let b = default_funnel("b");
        assert_ne!(a.id, b.id);
        assert_ne!(a.pages[0].id, b.pages[0].id);
    }
}
