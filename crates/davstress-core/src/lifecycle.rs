//! Per-kind lifecycle state machine and parent/child coupling rules.
//!
//! Grounded on `fs_entity_advance_state` in `fs_entity.c`, extended with the
//! `options` and `download_range` states present in the fuller
//! `urltest_webdav/urltest_webdav.c` variant of the original source.

use crate::entity::{EnableMask, Kind};

/// A lifecycle method (non-sub state) mapped 1:1 to an HTTP operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Mkcol,
    Put,
    Options,
    Getinfo,
    DownloadRange,
    Download,
    Delete,
}

impl Method {
    pub fn label(self) -> &'static str {
        match self {
            Method::Mkcol => "MKCOL",
            Method::Put => "PUT",
            Method::Options => "OPTIONS",
            Method::Getinfo => "PROPFIND",
            Method::DownloadRange => "GET(range)",
            Method::Download => "GET",
            Method::Delete => "DELETE",
        }
    }

    /// Which `statsByMethod` bucket this wire method files under. `download`
    /// and `download_range` share the `GET` bucket, per §3 of the design.
    pub fn stats_key(self) -> crate::entity::StatsMethod {
        use crate::entity::StatsMethod;
        match self {
            Method::Mkcol => StatsMethod::Mkcol,
            Method::Put => StatsMethod::Put,
            Method::Options => StatsMethod::Options,
            Method::Getinfo => StatsMethod::Propfind,
            Method::DownloadRange | Method::Download => StatsMethod::Get,
            Method::Delete => StatsMethod::Delete,
        }
    }
}

/// One position in an entity's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Upload,
    UploadSub,
    Options,
    Getinfo,
    DownloadRange,
    DownloadSub,
    Download,
    DeleteSub,
    Delete,
}

impl State {
    /// The state immediately following this one, ignoring generation
    /// rollover and enable-mask pruning. `Delete` has no successor; callers
    /// detect end-of-cycle by matching on `Delete` explicitly.
    fn raw_successor(self, kind: Kind) -> Option<State> {
        use State::*;
        match (kind, self) {
            (Kind::Directory, Upload) => Some(UploadSub),
            (Kind::File, Upload) => Some(Options),
            (_, UploadSub) => Some(Options),
            (_, Options) => Some(Getinfo),
            (Kind::File, Getinfo) => Some(DownloadRange),
            (Kind::Directory, Getinfo) => Some(DownloadSub),
            (Kind::File, DownloadRange) => Some(Download),
            (_, DownloadSub) => Some(Download),
            (Kind::Directory, Download) => Some(DeleteSub),
            (Kind::File, Download) => Some(Delete),
            (_, DeleteSub) => Some(Delete),
            (_, Delete) => None,
            (Kind::Directory, DownloadRange) => {
                unreachable!("directories never enter DownloadRange state")
            }
        }
    }

    /// True for the three directory-only waiting states.
    pub fn is_sub(self) -> bool {
        matches!(self, State::UploadSub | State::DownloadSub | State::DeleteSub)
    }

    /// The HTTP method this state implies, or `None` for `*_sub` states
    /// (which perform no transport call).
    pub fn method(self, kind: Kind) -> Option<Method> {
        match self {
            State::Upload => Some(match kind {
                Kind::Directory => Method::Mkcol,
                Kind::File => Method::Put,
            }),
            State::Options => Some(Method::Options),
            State::Getinfo => Some(Method::Getinfo),
            State::DownloadRange => Some(Method::DownloadRange),
            State::Download => Some(Method::Download),
            State::Delete => Some(Method::Delete),
            State::UploadSub | State::DownloadSub | State::DeleteSub => None,
        }
    }

    /// Whether `mask` permits entering this state. `*_sub` states and the
    /// two unconditional states (`upload`, `download`) are never masked.
    fn is_enabled(self, mask: &EnableMask) -> bool {
        match self {
            State::Options => mask.options,
            State::Getinfo => mask.getinfo,
            State::DownloadRange => mask.download_range,
            State::Delete => mask.delete,
            State::DeleteSub => mask.delete,
            State::Upload | State::UploadSub | State::DownloadSub | State::Download => true,
        }
    }
}

/// Result of a single `advance` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Landed on `state` within the same generation.
    Stepped(State),
    /// Completed `delete`; generation rolled over and state reset to `upload`.
    RolledOver,
}

/// Moves past the current state, skipping states disabled by `mask`, until
/// landing on an enabled state or rolling the generation over.
///
/// Mirrors `fs_entity_advance_state`'s tail-recursive skip loop.
pub fn advance(kind: Kind, mut state: State, mask: &EnableMask) -> Advance {
    loop {
        match state.raw_successor(kind) {
            Some(next) => {
                if next.is_enabled(mask) {
                    return Advance::Stepped(next);
                }
                state = next;
            }
            None => return Advance::RolledOver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EnableMask;

    #[test]
    fn file_cycles_through_every_non_sub_state() {
        let mask = EnableMask {
            download_range: true,
            ..EnableMask::default()
        };
        let mut state = State::Upload;
        let mut seen = vec![state];
        loop {
            match advance(Kind::File, state, &mask) {
                Advance::Stepped(s) => {
                    seen.push(s);
                    state = s;
                }
                Advance::RolledOver => break,
            }
        }
        assert_eq!(
            seen,
            vec![
                State::Upload,
                State::Options,
                State::Getinfo,
                State::DownloadRange,
                State::Download,
                State::Delete,
            ]
        );
    }

    #[test]
    fn disabled_download_range_is_skipped_by_default() {
        let mask = EnableMask::default();
        assert_eq!(
            advance(Kind::File, State::Getinfo, &mask),
            Advance::Stepped(State::Download)
        );
    }

    #[test]
    fn directory_inserts_sub_states() {
        let mask = EnableMask {
            download_range: true,
            ..EnableMask::default()
        };
        let mut state = State::Upload;
        let mut seen = vec![state];
        loop {
            match advance(Kind::Directory, state, &mask) {
                Advance::Stepped(s) => {
                    seen.push(s);
                    state = s;
                }
                Advance::RolledOver => break,
            }
        }
        assert_eq!(
            seen,
            vec![
                State::Upload,
                State::UploadSub,
                State::Options,
                State::Getinfo,
                State::DownloadSub,
                State::Download,
                State::DeleteSub,
                State::Delete,
            ]
        );
        assert!(!seen.contains(&State::DownloadRange));
    }

    #[test]
    fn disabling_delete_skips_delete_sub_too() {
        let mask = EnableMask {
            delete: false,
            ..EnableMask::default()
        };
        assert_eq!(
            advance(Kind::Directory, State::Download, &mask),
            Advance::RolledOver
        );
    }

    #[test]
    fn rolling_over_past_delete() {
        let mask = EnableMask::default();
        assert_eq!(advance(Kind::File, State::Delete, &mask), Advance::RolledOver);
    }
}
