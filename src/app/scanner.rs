use anyhow::{bail, Result};
use ignore::WalkBuilder;
use std::path::Path;

/// Names of the immediate child directories of `root`, sorted.
///
/// Hidden folders count and no ignore files are consulted: every folder in
/// the workspace is a candidate until the config says otherwise.
pub fn top_level_dirs(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        bail!("Source directory {} does not exist", root.display());
    }

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .max_depth(Some(1))
        .build();

    let mut names = Vec::new();
    for result in walker {
        match result {
            Ok(entry) => {
                if entry.depth() == 0 || !entry.path().is_dir() {
                    continue;
                }
                match entry.file_name().to_str() {
                    Some(name) => names.push(name.to_string()),
                    None => log::warn!("Skipping non UTF-8 folder {}", entry.path().display()),
                }
            }
            Err(err) => log::warn!("Error walking entry: {}", err),
        }
    }

    names.sort();
    Ok(names)
}
