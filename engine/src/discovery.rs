//! Schema discovery over sampled documents.
//!
//! The newest documents of a collection are classified field by field into
//! column definitions. Discovery is best-effort: fields that cannot be
//! classified are skipped and recorded as diagnostics, never reported as
//! errors.

use crate::{
    error::Result, extract::ExtractionStrategy, ColumnDef, ColumnPath, Document, DocumentStore,
    Filter, FindOptions, Namespace, Schema, SchemaOrder, SemanticType, SortOrder, Value,
};
use tracing::debug;

/// Sampling and classification options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Number of newest documents to sample; zero samples the whole collection
    pub sample_size: usize,
    /// Infer scalar column types from sampled values instead of using String
    pub infer_types: bool,
    pub order: SchemaOrder,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            sample_size: 10,
            infer_types: false,
            order: SchemaOrder::default(),
        }
    }
}

/// Notes about fields discovery skipped or downgraded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    messages: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a note and emit it at debug level.
    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(target: "docsync_engine::discovery", "{}", message);
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

/// Result of a discovery pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOutcome {
    pub schema: Schema,
    pub diagnostics: Vec<String>,
    /// Number of documents sampled
    pub sampled: usize,
}

/// Derives a column schema from sample documents.
pub struct SchemaDiscovery<'a> {
    options: DiscoveryOptions,
    strategy: &'a dyn ExtractionStrategy,
}

impl<'a> SchemaDiscovery<'a> {
    pub fn new(options: DiscoveryOptions, strategy: &'a dyn ExtractionStrategy) -> Self {
        Self { options, strategy }
    }

    /// Sample the newest documents of a collection and classify them.
    ///
    /// Store errors while fetching propagate. A cursor entry that fails to
    /// decode is skipped with a diagnostic.
    pub fn discover<S>(
        &self,
        store: &S,
        namespace: &Namespace,
        filter: &Filter,
    ) -> Result<DiscoveryOutcome>
    where
        S: DocumentStore + ?Sized,
    {
        let options = match self.options.sample_size {
            0 => FindOptions {
                sort: Some(SortOrder::IdDescending),
                limit: None,
            },
            n => FindOptions::latest(n),
        };

        let mut schema = Schema::new();
        let mut diagnostics = Diagnostics::new();
        let mut sampled = 0;

        for entry in store.find(namespace, filter, &options)? {
            match entry {
                Ok(document) => {
                    self.classify_document(&mut schema, &document, &mut diagnostics);
                    sampled += 1;
                }
                Err(e) => diagnostics.note(format!("skipping unreadable document: {}", e)),
            }
        }

        Ok(self.finish(schema, diagnostics, sampled, namespace))
    }

    /// Classify documents the caller already holds.
    pub fn discover_documents<'d, I>(&self, documents: I) -> DiscoveryOutcome
    where
        I: IntoIterator<Item = &'d Document>,
    {
        let mut schema = Schema::new();
        let mut diagnostics = Diagnostics::new();
        let mut sampled = 0;

        for document in documents {
            self.classify_document(&mut schema, document, &mut diagnostics);
            sampled += 1;
        }

        schema.apply_order(self.options.order);
        DiscoveryOutcome {
            schema,
            diagnostics: diagnostics.into_messages(),
            sampled,
        }
    }

    fn finish(
        &self,
        mut schema: Schema,
        diagnostics: Diagnostics,
        sampled: usize,
        namespace: &Namespace,
    ) -> DiscoveryOutcome {
        schema.apply_order(self.options.order);
        debug!(
            namespace = %namespace,
            sampled,
            columns = schema.len(),
            skipped = diagnostics.messages().len(),
            "schema discovered"
        );
        DiscoveryOutcome {
            schema,
            diagnostics: diagnostics.into_messages(),
            sampled,
        }
    }

    fn classify_document(
        &self,
        schema: &mut Schema,
        document: &Document,
        diagnostics: &mut Diagnostics,
    ) {
        for (field, value) in document.iter() {
            if value.is_null() {
                diagnostics.note(format!("skipping null field '{}'", field));
                continue;
            }
            self.classify(schema, ColumnPath::new(field.as_str()), value, diagnostics);
            self.strategy.discover(schema, field, value, diagnostics);
        }
    }

    fn classify(
        &self,
        schema: &mut Schema,
        path: ColumnPath,
        value: &Value,
        diagnostics: &mut Diagnostics,
    ) {
        match value {
            Value::Null => diagnostics.note(format!("skipping null field '{}'", path)),
            Value::Document(nested) => {
                schema.add_if_absent(ColumnDef::structured(path.clone()));
                for (name, child) in nested.iter() {
                    if child.is_null() {
                        diagnostics.note(format!("skipping null field '{}'", path.child(name)));
                        continue;
                    }
                    self.classify(schema, path.child(name), child, diagnostics);
                }
            }
            Value::Array(items) => match items.first() {
                None => diagnostics.note(format!("skipping empty array '{}'", path)),
                Some(Value::Document(_)) => {
                    schema.add_if_absent(ColumnDef::structured(path));
                }
                Some(_) => {
                    schema.add_if_absent(ColumnDef::string_array(path));
                }
            },
            Value::ObjectId(_) => {
                schema.add_if_absent(ColumnDef::identifier(path));
            }
            scalar => {
                let column_type = if self.options.infer_types {
                    let inferred = SemanticType::infer(scalar);
                    if inferred == SemanticType::String && !matches!(scalar, Value::String(_)) {
                        diagnostics.note(format!(
                            "field '{}' holds a {} value, typed as String",
                            path,
                            scalar.kind_name()
                        ));
                    }
                    inferred
                } else {
                    SemanticType::String
                };
                schema.add_if_absent(ColumnDef::new(path, column_type));
            }
        }
    }
}
