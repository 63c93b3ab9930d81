use crate::{DebugInfo, Kind};
use std::fmt;

/// An outstanding request, as captured by [Dump].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outstanding {
    /// Kind of the request.
    pub kind: Kind,
    /// Start of the forwarded range.
    pub offset: u64,
    /// End (exclusive) of the forwarded range.
    pub end: u64,
    /// Length of the range not resolved yet.
    pub pending: u64,
    /// Number of requests piggybacked on this one.
    pub piggybacked: usize,
    /// Memory object that made the request.
    pub debug: DebugInfo,
}

/// Snapshot of the state of a [super::Source].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dump {
    /// Whether the source was detached.
    pub detached: bool,
    /// Whether the source was closed.
    pub closed: bool,
    /// Outstanding requests, grouped by kind and ordered by range.
    pub outstanding: Vec<Outstanding>,
    /// The provider's own description of its state.
    pub provider: String,
}

impl fmt::Display for Dump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "page_source detached {} closed {}",
            self.detached, self.closed
        )?;
        for req in &self.outstanding {
            writeln!(
                f,
                "  {} vmo {:#x}/k{} req [{:#x}, {:#x}) pending {:#x} overlap {}",
                req.kind,
                req.debug.object,
                req.debug.id,
                req.offset,
                req.end,
                req.pending,
                req.piggybacked
            )?;
        }
        if !self.provider.is_empty() {
            writeln!(f, "{}", self.provider)?;
        }
        Ok(())
    }
}
