mod errors;

pub use errors::{StoreError, StoreResult};
