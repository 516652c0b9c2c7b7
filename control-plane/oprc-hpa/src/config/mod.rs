mod types;

pub use types::{CoreConfig, HpaConfig, MAX_UPDATE_RETRIES, TargetsConfig};
