pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use indexmap::{IndexMap, IndexSet};
pub use itertools::Itertools as _;
pub use log::{debug, info, warn};
pub use serde::{de::Visitor, Deserialize, Deserializer, Serialize};
pub use std::{
    collections::{BTreeSet, HashMap},
    convert::TryFrom,
    fmt,
    fmt::{Debug, Display, Formatter},
    fs,
    path::{Path, PathBuf},
};
