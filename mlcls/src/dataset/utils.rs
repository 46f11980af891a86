use crate::common::*;

/// Expand a leading `~` to the home directory of the current user.
pub fn expand_user(path: &str) -> Result<PathBuf> {
    let rest = match path.strip_prefix('~') {
        Some(rest) => rest,
        None => return Ok(PathBuf::from(path)),
    };

    // "~user" forms are left untouched
    if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\')) {
        return Ok(PathBuf::from(path));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| format_err!("unable to determine the home directory to expand '{}'", path))?;
    let rest = rest.trim_start_matches(|c: char| c == '/' || c == '\\');
    Ok(if rest.is_empty() { home } else { home.join(rest) })
}

/// Join a relative path onto an optional root directory.
pub fn join_root(root: Option<&Path>, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_user_test() -> Result<()> {
        assert_eq!(
            expand_user("data/coco/train2017")?,
            Path::new("data/coco/train2017")
        );
        assert_eq!(expand_user("~other/x")?, Path::new("~other/x"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_user("~")?, home);
            assert_eq!(expand_user("~/coco/val2017")?, home.join("coco/val2017"));
        }
        Ok(())
    }

    #[test]
    fn join_root_test() {
        assert_eq!(
            join_root(Some(Path::new("data/coco")), "val2017"),
            Path::new("data/coco/val2017")
        );
        assert_eq!(join_root(None, "val2017"), Path::new("val2017"));
        assert_eq!(
            join_root(Some(Path::new("data")), "/abs/val2017"),
            Path::new("/abs/val2017")
        );
    }
}
