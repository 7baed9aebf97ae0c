//! Testing utilities for adapters.
//!
//! - **Assertions**: [`assert_frames_equal`] compares frames cell by cell
//! - **Fixtures**: [`sample_frame`] and [`mixed_frame`] (with nulls)
//! - **Mock I/O**: [`TempDirPath`] for scratch files and [`RecordingTableIo`], a
//!   spy backend that records the exact option sets adapters pass on
//!
//! # Quick Start
//!
//! ```no_run
//! use ironadapt::testing::*;
//! use ironadapt::{params, register_all_builtins, AdapterRegistry, DataFrame, IoContext};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[test]
//! fn csv_round_trip() -> anyhow::Result<()> {
//!     let dir = TempDirPath::new()?;
//!     let registry = AdapterRegistry::new();
//!     register_all_builtins(&registry)?;
//!     let spy = Arc::new(RecordingTableIo::new());
//!     let ctx = IoContext::default().with_table_io(spy.clone());
//!
//!     let csv = params(json!({ "path": dir.file("scores.csv") }))?;
//!     registry.save("csv", &csv, &sample_frame()?, &ctx)?;
//!     let (frame, _) = registry.load::<DataFrame>("csv", &csv, &ctx)?;
//!
//!     assert_frames_equal(&frame, &sample_frame()?);
//!     assert!(spy.last_call().is_some_and(|c| c.options.is_empty()));
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_io;

pub use assertions::*;
pub use fixtures::*;
pub use mock_io::*;
