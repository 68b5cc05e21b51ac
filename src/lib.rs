pub mod aggregate;
pub mod config;
pub mod discover;
pub mod duck;
pub mod error;
pub mod load;
pub mod normalize;
pub mod pipeline;
pub mod snapshot;
pub mod table;

pub use config::{ColumnPolicy, ColumnType, Config};
pub use error::EtlError;
pub use table::{Column, ColumnData, Table, Value};
