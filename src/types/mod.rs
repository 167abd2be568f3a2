pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Which half of a snapshot pair a pose belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}
