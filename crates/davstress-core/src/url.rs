//! Joins a base URL with an entity's path relative to the forest's base
//! path, with exactly one slash at the join point.
//!
//! Grounded on `fs_entity_list_url_for_entity` in `fs_entity.c`.

use crate::entity::{Entity, Kind};
use std::path::Path;

/// Composes the request URL for `entity`, given the forest's `base_path`
/// (the local filesystem prefix stripped from `entity.path`) and `base_url`
/// (the remote destination).
pub fn compose(base_url: &str, base_path: &Path, entity: &Entity) -> String {
    let rel = entity
        .path
        .strip_prefix(base_path)
        .unwrap_or(&entity.path)
        .to_string_lossy()
        .into_owned();

    let path_has_leading_slash = rel.starts_with('/');
    let url_has_trailing_slash = base_url.ends_with('/');
    let trailing = if entity.kind == Kind::Directory { "/" } else { "" };

    let mut out = String::with_capacity(base_url.len() + rel.len() + 2);
    out.push_str(base_url);

    if path_has_leading_slash {
        if url_has_trailing_slash {
            out.push_str(&rel[1..]);
        } else {
            out.push_str(&rel);
        }
    } else if url_has_trailing_slash {
        out.push_str(&rel);
    } else if !rel.is_empty() {
        out.push('/');
        out.push_str(&rel);
    }
    out.push_str(trailing);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EnableMask;
    use std::path::PathBuf;

    #[test]
    fn file_url_has_no_trailing_slash() {
        let e = Entity::new_file(PathBuf::from("/t/sub/f.bin"), 1, EnableMask::default());
        let url = compose("http://h/d", Path::new("/t"), &e);
        assert_eq!(url, "http://h/d/sub/f.bin");
    }

    #[test]
    fn directory_url_has_trailing_slash() {
        let e = Entity::new_directory(PathBuf::from("/t/sub"), vec![], EnableMask::default());
        let url = compose("http://h/d", Path::new("/t"), &e);
        assert_eq!(url, "http://h/d/sub/");
    }

    #[test]
    fn no_double_slash_when_both_sides_have_one() {
        let e = Entity::new_file(PathBuf::from("/t/f"), 1, EnableMask::default());
        let url = compose("http://h/d/", Path::new("/t"), &e);
        assert_eq!(url, "http://h/d/f");
    }

    #[test]
    fn root_entity_maps_to_bare_base_url() {
        let e = Entity::new_directory(PathBuf::from("/t"), vec![], EnableMask::default());
        let url = compose("http://h/d", Path::new("/t"), &e);
        assert_eq!(url, "http://h/d/");
    }
}
