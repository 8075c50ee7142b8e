// SPDX-License-Identifier: PMPL-1.0-or-later
//! TierStore Stack
//!
//! Object tables over per-field backend maps, layered stacks with
//! read-through population and write-through fan-out, and the maintenance
//! coordinator that drives every layer through its lifecycle.
//!
//! ```rust
//! use std::sync::Arc;
//! use tierstore_query::{FieldType, FieldValue};
//! use tierstore_stack::{Catalog, Schema, StackConfig};
//! use tierstore_storage::{BackendFactory, InMemoryFactory};
//!
//! # tokio_test::block_on(async {
//! let layers: Vec<Arc<dyn BackendFactory>> =
//!     vec![Arc::new(InMemoryFactory::new()), Arc::new(InMemoryFactory::new())];
//! let catalog = Catalog::new(layers, StackConfig::default()).unwrap();
//!
//! let schema = Schema::new("people").unwrap()
//!     .with_field("name", FieldType::String).unwrap();
//! let people = catalog.register(schema).await.unwrap();
//!
//! let alice = people.append(None, [("name", FieldValue::from("alice"))]).await.unwrap();
//! assert_eq!(people.get(&alice.id).await.unwrap(), Some(alice));
//! # });
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod layer;
pub mod maintenance;
pub mod objects;
pub mod schema;
pub mod stack;
pub mod table;

pub use catalog::{Catalog, KeyValueStack};
pub use config::{QueryLayer, StackConfig};
pub use error::{LayerFailure, StackError};
pub use layer::StackLayer;
pub use maintenance::{
    run_incremental, IncrementalPolicy, LifecycleOp, Maintained, MaintenanceCoordinator,
};
pub use objects::ObjectStack;
pub use schema::{validate_table_name, Schema};
pub use stack::LayeredStack;
pub use table::{build_query, map_name, new_record_id, ObjectTable};
