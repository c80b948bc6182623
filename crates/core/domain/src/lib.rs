pub mod data;

pub use data::{DecodeMode, DecodedReading, NormalizedRecord, RawMessage};
