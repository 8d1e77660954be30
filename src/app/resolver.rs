//! Turns a [`Config`] plus the discovered top-level folders into a [`Plan`].
//!
//! Resolution is purely textual: nothing here touches the filesystem.

use crate::app::config::{normalize, Config};
use crate::app::models::{EntryState, Origin, Plan, PlanEntry, ResolvedTask};
use globset::{Glob, GlobSet, GlobSetBuilder};
use pathdiff::diff_paths;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error(
        "No destination for {}: it is outside default_src and has no dest or configured ancestor",
        .path.display()
    )]
    UnresolvableDestination { path: PathBuf },

    #[error(
        "{} and {} both resolve to {}",
        .first.display(),
        .second.display(),
        .destination.display()
    )]
    ConflictingDestination {
        destination: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    /// `inner`'s destination sits inside `outer`'s, but not at the spot
    /// `outer` leaves free for it, so one task would overwrite the other.
    #[error(
        "{} resolves to {}, inside the destination {} of {}",
        .inner.display(),
        .destination.display(),
        .outer_destination.display(),
        .outer.display()
    )]
    OverlappingDestination {
        destination: PathBuf,
        inner: PathBuf,
        outer_destination: PathBuf,
        outer: PathBuf,
    },

    #[error("Invalid exclude pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Every problem found while resolving, one per offending item.
#[derive(Debug, Error)]
#[error("{} item(s) could not be resolved", .0.len())]
pub struct ResolutionFailed(pub Vec<ResolveError>);

struct Candidate {
    source: PathBuf,
    /// Path below `default_src`, if the source lives there.
    relative: Option<PathBuf>,
    explicit_dest: Option<PathBuf>,
    enabled: bool,
    origin: Origin,
}

/// Exclude globs matched against single path segments.
struct ExcludeMatcher {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ExcludeMatcher {
    fn new(patterns: &[String]) -> Result<Self, ResolveError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| ResolveError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ResolveError::InvalidPattern {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })?;

        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    /// The first pattern matching any segment of `path`.
    fn matching(&self, path: &Path) -> Option<&str> {
        path.components()
            .filter_map(|c| match c {
                Component::Normal(segment) => segment.to_str(),
                _ => None,
            })
            .find_map(|segment| {
                self.set
                    .matches(segment)
                    .first()
                    .map(|&idx| self.patterns[idx].as_str())
            })
    }
}

pub fn resolve(config: &Config, top_level: &[String]) -> Result<Plan, ResolutionFailed> {
    let excludes = ExcludeMatcher::new(&config.exclude).map_err(|e| ResolutionFailed(vec![e]))?;
    let candidates = collect_candidates(config, top_level);

    let mut errors = Vec::new();
    let resolved = resolve_destinations(config, &candidates, &mut errors);

    let mut entries = Vec::with_capacity(candidates.len());
    for (candidate, resolved) in candidates.iter().zip(resolved) {
        let Some((destination, anchor)) = resolved else {
            continue;
        };

        let segments = candidate.relative.as_deref().unwrap_or(&candidate.source);
        let state = match excludes.matching(segments) {
            Some(pattern) => EntryState::Excluded(pattern.to_string()),
            None if !candidate.enabled => EntryState::Disabled,
            None => EntryState::Enabled,
        };

        entries.push(PlanEntry {
            source: candidate.source.clone(),
            destination,
            origin: candidate.origin,
            state,
            anchor,
        });
    }

    let tasks = build_tasks(&entries);
    check_conflicts(&tasks, &mut errors);

    if !errors.is_empty() {
        return Err(ResolutionFailed(errors));
    }

    Ok(Plan {
        default_src: config.default_src.clone(),
        default_dest: config.default_dest.clone(),
        entries,
        tasks,
    })
}

/// Implicit top-level folders first (sorted by name), then declared items in
/// declaration order.
fn collect_candidates(config: &Config, top_level: &[String]) -> Vec<Candidate> {
    let declared: Vec<Candidate> = config
        .items
        .iter()
        .map(|item| {
            let source = normalize(&config.default_src.join(&item.src));
            let explicit_dest = item.dest.as_ref().map(|d| normalize(&config.default_dest.join(d)));
            Candidate {
                relative: relative_to(&source, &config.default_src),
                source,
                explicit_dest,
                enabled: item.enabled,
                origin: Origin::Declared,
            }
        })
        .collect();

    let mut names = top_level.to_vec();
    names.sort();

    let mut candidates: Vec<Candidate> = names
        .iter()
        .map(|name| Candidate {
            source: config.default_src.join(name),
            relative: Some(PathBuf::from(name)),
            explicit_dest: Some(config.default_dest.join(name)),
            enabled: true,
            origin: Origin::Implicit,
        })
        .filter(|implicit| !declared.iter().any(|d| d.source == implicit.source))
        .collect();

    candidates.extend(declared);
    candidates
}

fn relative_to(source: &Path, root: &Path) -> Option<PathBuf> {
    if source.starts_with(root) && source != root {
        diff_paths(source, root)
    } else {
        None
    }
}

/// Destination and anchor per candidate, `None` where resolution failed.
fn resolve_destinations(
    config: &Config,
    candidates: &[Candidate],
    errors: &mut Vec<ResolveError>,
) -> Vec<Option<(PathBuf, Option<PathBuf>)>> {
    // Shallow first, so every anchor is settled before its descendants.
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by_key(|&i| candidates[i].source.components().count());

    let mut resolved: Vec<Option<(PathBuf, Option<PathBuf>)>> = vec![None; candidates.len()];

    for i in order {
        let candidate = &candidates[i];
        if let Some(dest) = &candidate.explicit_dest {
            resolved[i] = Some((dest.clone(), None));
            continue;
        }

        let anchor = candidates
            .iter()
            .enumerate()
            .filter(|(j, other)| {
                *j != i
                    && other.source != candidate.source
                    && candidate.source.starts_with(&other.source)
                    && (other.enabled || config.anchor_disabled)
                    && resolved[*j].is_some()
            })
            .max_by_key(|(_, other)| other.source.components().count())
            .map(|(j, _)| j);

        resolved[i] = match (anchor, &candidate.relative) {
            (Some(j), _) => {
                let anchor_source = &candidates[j].source;
                let anchor_dest = resolved[j].as_ref().map(|(d, _)| d.clone());
                match (anchor_dest, candidate.source.strip_prefix(anchor_source)) {
                    (Some(dest), Ok(suffix)) => Some((dest.join(suffix), Some(anchor_source.clone()))),
                    _ => None,
                }
            }
            (None, Some(relative)) => Some((config.default_dest.join(relative), None)),
            (None, None) => {
                errors.push(ResolveError::UnresolvableDestination {
                    path: candidate.source.clone(),
                });
                None
            }
        };
    }

    resolved
}

fn build_tasks(entries: &[PlanEntry]) -> Vec<ResolvedTask> {
    entries
        .iter()
        .filter(|entry| entry.state == EntryState::Enabled)
        .map(|entry| {
            let mut skip: Vec<PathBuf> = entries
                .iter()
                .filter(|other| {
                    other.source != entry.source
                        && other.source.starts_with(&entry.source)
                        && !matches!(other.state, EntryState::Excluded(_))
                })
                .filter_map(|other| diff_paths(&other.source, &entry.source))
                .collect();
            skip.sort();

            // Keep only the top-most paths; anything below them is skipped already.
            let mut topmost: Vec<PathBuf> = Vec::new();
            for path in skip {
                if !topmost.iter().any(|kept| path.starts_with(kept)) {
                    topmost.push(path);
                }
            }

            ResolvedTask {
                source: entry.source.clone(),
                destination: entry.destination.clone(),
                skip: topmost,
            }
        })
        .collect()
}

fn check_conflicts(tasks: &[ResolvedTask], errors: &mut Vec<ResolveError>) {
    let mut seen: HashMap<&Path, &Path> = HashMap::new();
    for task in tasks {
        if let Some(first) = seen.insert(&task.destination, &task.source) {
            errors.push(ResolveError::ConflictingDestination {
                destination: task.destination.clone(),
                first: first.to_path_buf(),
                second: task.source.clone(),
            });
            // Keep reporting against the first claimant.
            seen.insert(&task.destination, first);
        }
    }

    for outer in tasks {
        for inner in tasks {
            let Ok(suffix) = inner.destination.strip_prefix(&outer.destination) else {
                continue;
            };
            if suffix.as_os_str().is_empty() {
                continue;
            }

            // Fine only when `inner` is the very folder `outer` skips there.
            let skipped_by_outer = outer.skip.iter().any(|skip| suffix.starts_with(skip));
            if skipped_by_outer && inner.source == outer.source.join(suffix) {
                continue;
            }

            errors.push(ResolveError::OverlappingDestination {
                destination: inner.destination.clone(),
                inner: inner.source.clone(),
                outer_destination: outer.destination.clone(),
                outer: outer.source.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::Item;

    fn config(items: Vec<Item>) -> Config {
        let mut config = Config::parse("default_src = \"/ws\"\ndefault_dest = \"/od\"\n").unwrap();
        config.items = items;
        config
    }

    fn item(src: &str, dest: Option<&str>, enabled: bool) -> Item {
        Item {
            src: PathBuf::from(src),
            dest: dest.map(PathBuf::from),
            enabled,
        }
    }

    fn entry<'a>(plan: &'a Plan, source: &str) -> &'a PlanEntry {
        plan.entries
            .iter()
            .find(|e| e.source == Path::new(source))
            .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_implicit_top_level_items() {
        let plan = resolve(&config(vec![]), &names(&["b", "a"])).unwrap();
        let pairs: Vec<_> = plan
            .tasks
            .iter()
            .map(|t| (t.source.clone(), t.destination.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (PathBuf::from("/ws/a"), PathBuf::from("/od/a")),
                (PathBuf::from("/ws/b"), PathBuf::from("/od/b")),
            ]
        );
        assert!(plan.entries.iter().all(|e| e.origin == Origin::Implicit));
    }

    #[test]
    fn test_explicit_dest_is_verbatim() {
        let cfg = config(vec![item("real_test", Some("/mnt/d/Onedrive/TEST"), true)]);
        let plan = resolve(&cfg, &names(&["real_test"])).unwrap();
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(
            entry(&plan, "/ws/real_test").destination,
            PathBuf::from("/mnt/d/Onedrive/TEST")
        );
        assert_eq!(entry(&plan, "/ws/real_test").origin, Origin::Declared);
    }

    #[test]
    fn test_inherits_from_longest_prefix() {
        let cfg = config(vec![
            item("real_test", Some("/mnt/d/Onedrive/TEST"), true),
            item("real_test/foo/bar", None, true),
        ]);
        let plan = resolve(&cfg, &names(&["real_test"])).unwrap();
        let bar = entry(&plan, "/ws/real_test/foo/bar");
        assert_eq!(bar.destination, PathBuf::from("/mnt/d/Onedrive/TEST/foo/bar"));
        assert_eq!(bar.anchor, Some(PathBuf::from("/ws/real_test")));
    }

    #[test]
    fn test_nearer_ancestor_wins() {
        let cfg = config(vec![
            item("proj", Some("/mnt/d/P"), true),
            item("proj/docs", Some("/mnt/e/Docs"), true),
            item("proj/docs/api/v1", None, true),
        ]);
        let plan = resolve(&cfg, &[]).unwrap();
        assert_eq!(
            entry(&plan, "/ws/proj/docs/api/v1").destination,
            PathBuf::from("/mnt/e/Docs/api/v1")
        );
    }

    #[test]
    fn test_prefix_is_component_wise() {
        let cfg = config(vec![
            item("real", Some("/mnt/d/R"), true),
            item("real_test/x", None, true),
        ]);
        let plan = resolve(&cfg, &[]).unwrap();
        assert_eq!(entry(&plan, "/ws/real_test/x").destination, PathBuf::from("/od/real_test/x"));
    }

    #[test]
    fn test_declaration_order_after_implicit() {
        let cfg = config(vec![item("z/deep", None, true), item("a", Some("/mnt/d/A"), true)]);
        let plan = resolve(&cfg, &names(&["a", "m"])).unwrap();
        let sources: Vec<_> = plan.entries.iter().map(|e| e.source.clone()).collect();
        assert_eq!(
            sources,
            vec![
                PathBuf::from("/ws/m"),
                PathBuf::from("/ws/z/deep"),
                PathBuf::from("/ws/a"),
            ]
        );
    }

    #[test]
    fn test_disabled_item_still_anchors() {
        let cfg = config(vec![
            item("proj", Some("/mnt/d/P"), false),
            item("proj/keep", None, true),
        ]);
        let plan = resolve(&cfg, &names(&["proj"])).unwrap();
        assert_eq!(entry(&plan, "/ws/proj").state, EntryState::Disabled);
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].destination, PathBuf::from("/mnt/d/P/keep"));
    }

    #[test]
    fn test_disabled_item_can_stop_anchoring() {
        let mut cfg = config(vec![
            item("proj", Some("/mnt/d/P"), false),
            item("proj/keep", None, true),
        ]);
        cfg.anchor_disabled = false;
        let plan = resolve(&cfg, &names(&["proj"])).unwrap();
        assert_eq!(plan.tasks[0].destination, PathBuf::from("/od/proj/keep"));
    }

    #[test]
    fn test_exclude_matches_any_depth() {
        let mut cfg = config(vec![
            item("web/node_modules/pkg", None, true),
            item("web/src", None, true),
            item("widescreen", Some("/mnt/d/W"), true),
        ]);
        cfg.exclude = names(&["node_modules", "wide*"]);
        let plan = resolve(&cfg, &names(&["web", "wideangle"])).unwrap();

        assert_eq!(
            entry(&plan, "/ws/web/node_modules/pkg").state,
            EntryState::Excluded("node_modules".to_string())
        );
        assert_eq!(
            entry(&plan, "/ws/widescreen").state,
            EntryState::Excluded("wide*".to_string())
        );
        assert_eq!(
            entry(&plan, "/ws/wideangle").state,
            EntryState::Excluded("wide*".to_string())
        );
        let sources: Vec<_> = plan.tasks.iter().map(|t| t.source.clone()).collect();
        assert_eq!(sources, vec![PathBuf::from("/ws/web"), PathBuf::from("/ws/web/src")]);
    }

    #[test]
    fn test_exclude_wins_over_enabled() {
        let mut cfg = config(vec![item("build", Some("/mnt/d/B"), true)]);
        cfg.exclude = names(&["build"]);
        let plan = resolve(&cfg, &[]).unwrap();
        assert!(plan.tasks.is_empty());
    }

    #[test]
    fn test_skip_lists_cover_disabled_and_own_tasks() {
        let cfg = config(vec![
            item("proj/big", None, false),
            item("proj/big/keep", Some("/mnt/d/Keep"), true),
            item("proj/docs", None, true),
            item("proj/docs/drafts", None, false),
        ]);
        let plan = resolve(&cfg, &names(&["proj"])).unwrap();

        let proj = plan.tasks.iter().find(|t| t.source == Path::new("/ws/proj")).unwrap();
        assert_eq!(proj.skip, vec![PathBuf::from("big"), PathBuf::from("docs")]);

        let docs = plan.tasks.iter().find(|t| t.source == Path::new("/ws/proj/docs")).unwrap();
        assert_eq!(docs.skip, vec![PathBuf::from("drafts")]);
    }

    #[test]
    fn test_conflicting_destination() {
        let cfg = config(vec![
            item("a", Some("/mnt/d/Same"), true),
            item("b", Some("/mnt/d/Same/"), true),
        ]);
        let err = resolve(&cfg, &[]).unwrap_err();
        assert_eq!(
            err.0,
            vec![ResolveError::ConflictingDestination {
                destination: PathBuf::from("/mnt/d/Same"),
                first: PathBuf::from("/ws/a"),
                second: PathBuf::from("/ws/b"),
            }]
        );
    }

    #[test]
    fn test_disabled_duplicate_destination_is_not_a_conflict() {
        let cfg = config(vec![
            item("a", Some("/mnt/d/Same"), true),
            item("b", Some("/mnt/d/Same"), false),
        ]);
        assert!(resolve(&cfg, &[]).is_ok());
    }

    #[test]
    fn test_unresolvable_outside_source_root() {
        let cfg = config(vec![item("/srv/data", None, true), item("/srv/other", None, true)]);
        let err = resolve(&cfg, &[]).unwrap_err();
        assert_eq!(err.0.len(), 2);
        assert_eq!(
            err.0[0],
            ResolveError::UnresolvableDestination {
                path: PathBuf::from("/srv/data")
            }
        );
    }

    #[test]
    fn test_absolute_source_can_anchor_descendants() {
        let cfg = config(vec![
            item("/srv/data", Some("/mnt/d/Data"), true),
            item("/srv/data/photos", None, true),
        ]);
        let plan = resolve(&cfg, &[]).unwrap();
        assert_eq!(
            entry(&plan, "/srv/data/photos").destination,
            PathBuf::from("/mnt/d/Data/photos")
        );
    }

    #[test]
    fn test_relative_dest_joins_default_dest() {
        let cfg = config(vec![item("notes", Some("Archive/notes"), true)]);
        let plan = resolve(&cfg, &[]).unwrap();
        assert_eq!(entry(&plan, "/ws/notes").destination, PathBuf::from("/od/Archive/notes"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let cfg = config(vec![
            item("b/x", None, true),
            item("a", Some("/mnt/d/A"), true),
            item("a/y", None, false),
        ]);
        let top = names(&["c", "a", "b"]);
        let first = resolve(&cfg, &top).unwrap();
        let second = resolve(&cfg, &top).unwrap();
        assert_eq!(first.tasks, second.tasks);
    }

    #[test]
    fn test_destination_inside_another_task_is_a_conflict() {
        let cfg = config(vec![item("notes", Some("/od/proj/notes"), true)]);
        let err = resolve(&cfg, &names(&["notes", "proj"])).unwrap_err();
        assert_eq!(
            err.0,
            vec![ResolveError::OverlappingDestination {
                destination: PathBuf::from("/od/proj/notes"),
                inner: PathBuf::from("/ws/notes"),
                outer_destination: PathBuf::from("/od/proj"),
                outer: PathBuf::from("/ws/proj"),
            }]
        );
    }

    #[test]
    fn test_nested_task_below_disabled_folder_is_allowed() {
        let cfg = config(vec![
            item("proj/big", None, false),
            item("proj/big/keep", None, true),
        ]);
        let plan = resolve(&cfg, &names(&["proj"])).unwrap();
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[1].destination, PathBuf::from("/od/proj/big/keep"));
    }

    #[test]
    fn test_foreign_source_under_skipped_folder_is_a_conflict() {
        // `proj` skips `big`, but only for `proj/big` itself, not for `notes`.
        let cfg = config(vec![
            item("proj/big", None, false),
            item("notes", Some("/od/proj/big/notes"), true),
        ]);
        let err = resolve(&cfg, &names(&["proj"])).unwrap_err();
        assert!(matches!(
            err.0.as_slice(),
            [ResolveError::OverlappingDestination { outer, .. }] if outer == Path::new("/ws/proj")
        ));
    }
}
