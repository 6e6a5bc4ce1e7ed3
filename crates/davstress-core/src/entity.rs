//! Immutable-shape tree of file-system entities with mutable lifecycle
//! state, generation, and per-method stats.
//!
//! Grounded on `fs_entity.h`/`fs_entity.c` (the `fs_entity`/`fs_entity_list`
//! struct pair): parent-owns-children tree, sibling list, per-entity state
//! and generation, list-wide floor generation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::lifecycle::{self, Advance, State};
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Directory,
    File,
}

/// Key into an entity's `stats_by_method` map. Distinct from
/// [`crate::lifecycle::Method`]: `download` and `download_range` share the
/// `Get` bucket here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsMethod {
    Get,
    Mkcol,
    Put,
    Delete,
    Propfind,
    Options,
}

impl StatsMethod {
    pub const ALL: [StatsMethod; 6] = [
        StatsMethod::Get,
        StatsMethod::Mkcol,
        StatsMethod::Put,
        StatsMethod::Delete,
        StatsMethod::Propfind,
        StatsMethod::Options,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StatsMethod::Get => "GET",
            StatsMethod::Mkcol => "MKCOL",
            StatsMethod::Put => "PUT",
            StatsMethod::Delete => "DELETE",
            StatsMethod::Propfind => "PROPFIND",
            StatsMethod::Options => "OPTIONS",
        }
    }
}

/// Per-entity set of permitted method states. `upload`/`download` and the
/// `*_sub` waiting states are never gated; only the four prunable method
/// states are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableMask {
    pub options: bool,
    pub getinfo: bool,
    pub download_range: bool,
    pub delete: bool,
}

impl Default for EnableMask {
    fn default() -> Self {
        EnableMask {
            options: true,
            getinfo: true,
            download_range: false,
            delete: true,
        }
    }
}

/// One node in the forest: a directory (with children) or a file (with a
/// known byte size).
#[derive(Debug)]
pub struct Entity {
    pub path: PathBuf,
    pub name: String,
    pub kind: Kind,
    pub size: u64,
    pub state: State,
    pub generation: u64,
    pub enable_mask: EnableMask,
    pub stats_by_method: HashMap<StatsMethod, Stats>,
    pub children: Vec<Entity>,
}

impl Entity {
    pub fn new_file(path: PathBuf, size: u64, enable_mask: EnableMask) -> Self {
        Entity {
            name: file_name(&path),
            path,
            kind: Kind::File,
            size,
            state: State::Upload,
            generation: 0,
            enable_mask,
            stats_by_method: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn new_directory(path: PathBuf, children: Vec<Entity>, enable_mask: EnableMask) -> Self {
        Entity {
            name: file_name(&path),
            path,
            kind: Kind::Directory,
            size: 0,
            state: State::Upload,
            generation: 0,
            enable_mask,
            stats_by_method: HashMap::new(),
            children,
        }
    }

    pub fn stats_mut(&mut self, method: StatsMethod) -> &mut Stats {
        self.stats_by_method.entry(method).or_default()
    }

    /// Visits this entity and every descendant, pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Entity)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Entity)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}

/// Advances `entity` past its current state, per §4.3: skips states the
/// entity's enable mask disables, and rolls `generation` over on completing
/// `delete`. Shared by the selector's directory-completion shortcut and the
/// driver loop's post-operation advance.
pub fn advance_entity(entity: &mut Entity) {
    match lifecycle::advance(entity.kind, entity.state, &entity.enable_mask) {
        Advance::Stepped(s) => entity.state = s,
        Advance::RolledOver => {
            entity.generation += 1;
            entity.state = State::Upload;
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Owns the single rooted tree plus forest-wide traversal bookkeeping.
#[derive(Debug)]
pub struct Forest {
    pub root: Entity,
    pub base_path: PathBuf,
    pub generation: u64,
    pub list_enable_mask: EnableMask,
}

impl Forest {
    pub fn new(root: Entity, base_path: PathBuf, list_enable_mask: EnableMask) -> Self {
        Forest {
            root,
            base_path,
            generation: 0,
            list_enable_mask,
        }
    }

    /// Disables `getinfo` forest-wide (used when the root's OPTIONS response
    /// shows no PROPFIND support).
    pub fn disable_getinfo_everywhere(&mut self) {
        self.list_enable_mask.getinfo = false;
        self.root.walk_mut(&mut |e| e.enable_mask.getinfo = false);
    }

    /// Disables `delete`/`delete_sub` forest-wide.
    pub fn disable_delete_everywhere(&mut self) {
        self.list_enable_mask.delete = false;
        self.root.walk_mut(&mut |e| e.enable_mask.delete = false);
    }

    /// Streaming incremental mean of `generation` across every entity in the
    /// forest, used by the random-walk selector to decide when to bump
    /// `forest.generation`. Mirrors `fs_entity_generation_average`.
    pub fn mean_generation(&self) -> f64 {
        let mut mean = 0.0;
        let mut count = 0u64;
        self.root.walk(&mut |e| {
            count += 1;
            mean += (e.generation as f64 - mean) / count as f64;
        });
        mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: u64) -> Entity {
        Entity::new_file(PathBuf::from(name), size, EnableMask::default())
    }

    #[test]
    fn walk_visits_every_node_preorder() {
        let dir = Entity::new_directory(
            PathBuf::from("/t"),
            vec![file("/t/a", 1), file("/t/b", 2)],
            EnableMask::default(),
        );
        let mut names = Vec::new();
        dir.walk(&mut |e| names.push(e.name.clone()));
        assert_eq!(names, vec!["t", "a", "b"]);
    }

    #[test]
    fn mean_generation_of_uniform_tree() {
        let dir = Entity::new_directory(
            PathBuf::from("/t"),
            vec![file("/t/a", 1), file("/t/b", 2)],
            EnableMask::default(),
        );
        let forest = Forest::new(dir, PathBuf::from("/t"), EnableMask::default());
        assert_eq!(forest.mean_generation(), 0.0);
    }

    #[test]
    fn disable_getinfo_propagates_to_every_descendant() {
        let dir = Entity::new_directory(
            PathBuf::from("/t"),
            vec![file("/t/a", 1)],
            EnableMask::default(),
        );
        let mut forest = Forest::new(dir, PathBuf::from("/t"), EnableMask::default());
        forest.disable_getinfo_everywhere();
        assert!(!forest.list_enable_mask.getinfo);
        let mut all_disabled = true;
        forest.root.walk(&mut |e| all_disabled &= !e.enable_mask.getinfo);
        assert!(all_disabled);
    }
}
