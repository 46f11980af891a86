//! Dataset processing toolkit.

mod categories;
mod coco_;
mod coco_index;
mod config;
mod dataset;
mod record;
mod registry;
mod utils;

pub use categories::*;
pub use coco_::*;
pub use coco_index::*;
pub use config::*;
pub use dataset::*;
pub use record::*;
pub use registry::*;
pub use utils::*;
