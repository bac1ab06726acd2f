//! Provider configuration.
//!
//! Settings are persisted by the host and handed to the engine as-is. They
//! are validated before any run starts.

use crate::{
    discovery::DiscoveryOptions,
    error::Result,
    extract::{DefaultStrategy, ExtractionStrategy},
    tagged::{TaggedFieldDecoder, DEFAULT_PAYLOAD_FIELD},
    Error, Filter, Namespace, SchemaOrder,
};
use serde::{Deserialize, Serialize};

/// Which extraction strategy reads the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReaderKind {
    /// Structural paths only
    #[default]
    Generic,
    /// Structural paths plus a tagged-field record array
    TaggedFields,
}

/// Persisted settings of one document store connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub connection_string: String,
    pub database: String,
    pub collection: String,
    /// Store filter expression; empty matches every document
    pub document_filter: String,
    /// Number of newest documents sampled for schema discovery
    pub schema_discovery_max_rows: usize,
    /// Use sampled value types instead of String for scalar columns
    pub use_schema_data_types: bool,
    /// Items per store call for adds and deletes; 1 processes item by item
    pub update_batch_size: usize,
    pub schema_order: SchemaOrder,
    pub reader: ReaderKind,
    /// Field holding the tagged-field records
    pub payload_field: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            database: String::new(),
            collection: String::new(),
            document_filter: String::new(),
            schema_discovery_max_rows: 10,
            use_schema_data_types: false,
            update_batch_size: 1,
            schema_order: SchemaOrder::default(),
            reader: ReaderKind::default(),
            payload_field: DEFAULT_PAYLOAD_FIELD.to_string(),
        }
    }
}

impl ProviderConfig {
    /// Create a configuration for one collection with default settings.
    pub fn new(
        connection_string: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            connection_string: connection_string.into(),
            database: database.into(),
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Check every setting a run depends on.
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(Error::MissingSetting("ConnectionString".into()));
        }
        if self.database.trim().is_empty() {
            return Err(Error::MissingSetting("Database".into()));
        }
        if self.collection.trim().is_empty() {
            return Err(Error::MissingSetting("Collection".into()));
        }
        if self.update_batch_size == 0 {
            return Err(Error::Config("update batch size must be at least 1".into()));
        }
        if self.reader == ReaderKind::TaggedFields && self.payload_field.trim().is_empty() {
            return Err(Error::MissingSetting("PayloadField".into()));
        }
        self.filter()?;
        Ok(())
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.database.as_str(), self.collection.as_str())
    }

    /// The parsed document filter.
    pub fn filter(&self) -> Result<Filter> {
        Filter::parse(&self.document_filter)
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            sample_size: self.schema_discovery_max_rows,
            infer_types: self.use_schema_data_types,
            order: self.schema_order,
        }
    }

    /// The configured extraction strategy.
    pub fn strategy(&self) -> Box<dyn ExtractionStrategy> {
        match self.reader {
            ReaderKind::Generic => Box::new(DefaultStrategy),
            ReaderKind::TaggedFields => {
                Box::new(TaggedFieldDecoder::new(self.payload_field.as_str()))
            }
        }
    }
}
