pub use anyhow::{bail, ensure, format_err, Context as _, Result};
pub use indexmap::IndexMap;
pub use itertools::Itertools as _;
pub use log::{debug, warn};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use serde_json::{Map, Value};
pub use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};
pub use strum::{AsRefStr, Display, EnumString};
