//! Funnel document: model, partial updates, templates and the in-memory store.

pub mod model;
pub mod patch;
pub mod store;
pub mod template;

pub use model::{
    AnalyticsConfig, Block, BlockProperties, Funnel, FunnelConfig, FunnelSettings, Page,
    PageDraft, PageSettings, PageType, SeoConfig, ThemeConfig,
};
pub use patch::{BlockPatch, ConfigPatch, PagePatch, SettingsPatch};
pub use store::{DocumentEvent, DocumentStore, PageRemoval, SaveSnapshot};
pub use template::{default_funnel, new_id};
