//! # DocSync Engine
//!
//! Flattens schema-less nested documents into tabular rows and applies
//! tabular change sets back to the document store.
//!
//! The engine is synchronous and talks to the store only through the
//! [`DocumentStore`] trait. It owns no connections and spawns no threads.
//!
//! ## Core Concepts
//!
//! ### Paths
//!
//! A column addresses a nested field by its [`ColumnPath`]: the field
//! names from the root joined with `|`. Resolving a path that does not
//! exist is never an error, it yields no value.
//!
//! ### Schema discovery
//!
//! [`SchemaDiscovery`] samples the newest documents of a collection and
//! classifies every field into a [`ColumnDef`]: nested documents become
//! structured columns (and are recursed into), arrays are typed by their
//! first element, store identifiers become read-only identifier columns.
//!
//! ### Extraction
//!
//! [`extract()`] resolves a column against a document and coerces the
//! value to the column's [`SemanticType`]. An [`ExtractionStrategy`] can
//! compute values that are not reachable by path; the
//! [`TaggedFieldDecoder`] decodes arrays of labelled, typed field records.
//!
//! ### Synchronization
//!
//! [`SyncEngine`] applies a [`ChangeSet`] in add, update, delete order,
//! item by item or in batches, reporting progress to a [`SyncStatus`] and
//! honouring its cancellation flag and failure policy.
//!
//! ## Quick Start
//!
//! ```rust
//! use docsync_engine::{
//!     ChangeItem, ChangeSet, DefaultStrategy, Document, Filter, MemoryStore, ProviderConfig,
//!     RowReader, RunStatus, SchemaDiscovery, SyncEngine, Value,
//! };
//! use serde_json::json;
//!
//! let config = ProviderConfig::new("memory://", "crm", "contacts");
//! let mut store = MemoryStore::new();
//!
//! // 1. Write a change set
//! let mut changes = ChangeSet::new();
//! changes.adds.push(ChangeItem::add([
//!     ("name", Value::from("Alice")),
//!     ("address|city", Value::from("Oslo")),
//! ]));
//! let report = SyncEngine::connect(&mut store, &config)
//!     .unwrap()
//!     .execute(&mut changes, &mut RunStatus::new())
//!     .unwrap();
//! assert_eq!(report.added, 1);
//!
//! // 2. Discover the schema
//! let outcome = SchemaDiscovery::new(config.discovery_options(), &DefaultStrategy)
//!     .discover(&store, &config.namespace(), &Filter::All)
//!     .unwrap();
//! assert!(outcome.schema.get("address|city").is_some());
//!
//! // 3. Read rows
//! let rows = RowReader::new(Filter::All, &DefaultStrategy)
//!     .read_all(&store, &config.namespace(), &outcome.schema)
//!     .unwrap();
//! assert_eq!(rows[0].get("address|city"), Some(&Value::from("Oslo")));
//! ```

pub mod change;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod filter;
pub mod memory;
pub mod object_id;
pub mod path;
pub mod row;
pub mod schema;
pub mod status;
pub mod store;
pub mod sync;
pub mod tagged;
pub mod value;

// Re-export main types at crate root
pub use change::{ChangeItem, ChangeKind, ChangeSet};
pub use config::{ProviderConfig, ReaderKind};
pub use discovery::{Diagnostics, DiscoveryOptions, DiscoveryOutcome, SchemaDiscovery};
pub use error::{Error, Result};
pub use extract::{extract, DefaultStrategy, ExtractionStrategy};
pub use filter::Filter;
pub use memory::{MemoryStore, StoreOp};
pub use object_id::ObjectId;
pub use path::{ColumnPath, PATH_DELIMITER};
pub use row::{materialize, Row, RowReader};
pub use schema::{ColumnDef, Schema, SchemaOrder, SemanticType};
pub use status::{CancelHandle, RunStatus, SyncStatus};
pub use store::{DocumentCursor, DocumentStore, FieldSet, FindOptions, Namespace, SortOrder};
pub use sync::{Automation, NoAutomation, SyncEngine, SyncPhase, SyncReport};
pub use tagged::TaggedFieldDecoder;
pub use value::{Document, Value};
