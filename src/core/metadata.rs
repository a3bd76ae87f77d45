use async_trait::async_trait;

/// Descriptive metadata for an instrument. Best effort: comparisons render
/// fine without it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InstrumentMeta {
    pub name: String,
    pub category: Option<String>,
}

#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, identifier: &str) -> anyhow::Result<InstrumentMeta>;
}
