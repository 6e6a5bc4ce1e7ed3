//! Builds the entity tree from a local path, per §4.2.
//!
//! Recursive descent over a two-kind `{file, directory}` tree, `walkdir`
//! enumerating each directory's immediate children. Symlinks are followed
//! (logical mode), so cycle detection stays in our hands: the `dev`/`ino`
//! ancestor stack below is grounded on `fs_entity.c`'s `__fs_entity_create_with_scanner`,
//! which skips an `FTS_DC` ("directory causes a cycle") entry reported by
//! `fts(3)` mid-scan.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use davstress_core::{EnableMask, Entity};
use walkdir::WalkDir;

/// Builds a tree rooted at `path`. A single file or symlink-to-file yields a
/// one-node tree whose base path is the file's parent directory; a
/// directory yields `(entity, entity.path)` as the base path.
pub fn build(path: &Path, enable_mask: EnableMask) -> Result<(Entity, PathBuf), anyhow::Error> {
    let path = path.canonicalize()?;
    let metadata = std::fs::metadata(&path)?;
    if metadata.is_dir() {
        let mut ancestors = Vec::new();
        let entity = build_directory(&path, enable_mask, &mut ancestors)?;
        Ok((entity, path))
    } else {
        let base_path = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        Ok((Entity::new_file(path, metadata.len(), enable_mask), base_path))
    }
}

fn build_directory(
    dir: &Path,
    enable_mask: EnableMask,
    ancestors: &mut Vec<(u64, u64)>,
) -> Result<Entity, anyhow::Error> {
    let meta = std::fs::metadata(dir)?;
    let dev_ino = (meta.dev(), meta.ino());
    ancestors.push(dev_ino);

    let mut children = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') && name != ".htaccess" {
            continue;
        }
        let child_path = entry.path().to_path_buf();
        let child_meta = match std::fs::metadata(&child_path) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(path = %child_path.display(), error = %err, "skipping entry, cannot stat");
                continue;
            }
        };
        if child_meta.is_dir() {
            let child_dev_ino = (child_meta.dev(), child_meta.ino());
            if ancestors.contains(&child_dev_ino) {
                tracing::warn!(path = %child_path.display(), "directory cycle detected, skipping");
                continue;
            }
            children.push(build_directory(&child_path, enable_mask, ancestors)?);
        } else {
            children.push(Entity::new_file(child_path, child_meta.len(), enable_mask));
        }
    }

    ancestors.pop();
    Ok(Entity::new_directory(dir.to_path_buf(), children, enable_mask))
}
