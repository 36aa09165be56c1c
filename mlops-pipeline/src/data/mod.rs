//! Data stages: ingestion from the document store, schema validation and
//! feature transformation, plus the tabular types they share.

pub mod document;
pub mod frame;
pub mod ingest;
pub mod schema;
pub mod source;
pub mod transform;
pub mod validate;

pub use document::{Document, FieldValue};
pub use frame::DataFrame;
pub use ingest::{DataIngestion, split_indices, test_size};
pub use schema::{ColumnSchema, ColumnType, SchemaDefinition};
pub use source::{
    DocumentStore, MemoryDocumentStore, SqliteDocumentStore, SqliteTarget, documents_from_csv,
};
pub use transform::{DataTransformation, TransformedArray, target_values};
pub use validate::{CheckResult, DataValidation, FileReport, ValidationReport, validate_frame};
