//! Operational transform: reconciling a pending, not-yet-confirmed
//! client operation against a server operation that committed first.
//!
//! The transform is path-overlap driven rather than schema-aware: two
//! operations on disjoint paths never interact, and the only questions
//! that matter once paths overlap are "did the server just delete the
//! thing the client is editing" and "are these the same kind of
//! conflicting write to the same exact location". Schema structure
//! doesn't need to be consulted because `Path` overlap/prefix already
//! captures containment regardless of which schema kind sits at each
//! level (record field, list entry id, tree node id all route through
//! the same token-based paths).

use crate::op::{Op, OpKind};
use crate::path::Path;

/// The result of reconciling a client op against one server op that
/// already landed.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    /// The client op still applies, possibly unchanged.
    Keep(Op),
    /// The server op made the client op meaningless (e.g. it removed
    /// the entry/node the client op was editing). Drop it silently.
    Noop,
}

fn is_remove(kind: OpKind) -> bool {
    matches!(kind, OpKind::ListRemove | OpKind::TreeRemove)
}

fn is_insert(kind: OpKind) -> bool {
    matches!(kind, OpKind::ListInsert | OpKind::TreeInsert)
}

/// Reconcile `client_op` (not yet applied) against `server_op` (already
/// applied, with a lower version than the client's pending base).
pub fn transform(server_op: &Op, client_op: &Op) -> Transformed {
    // Inserts always create a new slot; a concurrent op elsewhere can
    // never invalidate the insert itself.
    if is_insert(client_op.kind) {
        return Transformed::Keep(client_op.clone());
    }

    if !Path::overlap(&server_op.path, &client_op.path) {
        return Transformed::Keep(client_op.clone());
    }

    // Server removed the container entry/node the client op lives
    // under (or targets directly, for any op other than another
    // remove of the same id, which collapses below). Remove absorption
    // turns the dangling client op into a Noop rather than an error.
    if is_remove(server_op.kind)
        && Path::is_prefix(&server_op.path, &client_op.path)
        && server_op.path != client_op.path
    {
        return Transformed::Noop;
    }
    if is_remove(server_op.kind) && server_op.path == client_op.path && is_remove(client_op.kind) {
        // both sides removed the same thing; the server's removal already
        // took effect, the client's is redundant
        return Transformed::Noop;
    }

    if server_op.path == client_op.path {
        // Same exact address. *.set vs *.set and move vs move are the
        // only same-kind conflicts at an identical path; the client is
        // applying after the server in the client's own timeline, so
        // the client op is the last writer and wins.
        return Transformed::Keep(client_op.clone());
    }

    // One path is a strict prefix of the other: either the server set
    // a whole subtree the client is editing a child of (pass the
    // client op through unchanged — it still lands on top), or the
    // client's op addresses an ancestor of the server's target (the
    // client op, once applied, supersedes whatever the server just did
    // to the child). Either way, from the client's perspective its own
    // op still applies as written.
    Transformed::Keep(client_op.clone())
}

/// Transform a whole pending client transaction against one server
/// transaction that committed ahead of it, dropping any ops that
/// collapse to `Noop`.
pub fn transform_ops(server_ops: &[Op], client_ops: &[Op]) -> Vec<Op> {
    client_ops
        .iter()
        .filter_map(|client_op| {
            let mut current = client_op.clone();
            for server_op in server_ops {
                match transform(server_op, &current) {
                    Transformed::Keep(op) => current = op,
                    Transformed::Noop => return None,
                }
            }
            Some(current)
        })
        .collect()
}
