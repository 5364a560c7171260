//! The `Node` trait: every filesystem entry implements the subset of the
//! POSIX operation vocabulary that applies to it.

use std::sync::Arc;

use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::InodeKey;
use crate::time::NodeTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Dir,
    File,
    Symlink,
}

/// A node's attributes, translated to `fuser::FileAttr` by the filesystem
/// dispatch layer (which also fills in the inode number, since that lives
/// in the registry rather than the node itself).
#[derive(Debug, Clone)]
pub struct Attr {
    pub kind: NodeKind,
    pub size: u64,
    /// Unix permission bits, e.g. `0o644`, `0o555`.
    pub perm: u16,
    pub time: NodeTime,
}

impl Attr {
    #[must_use]
    pub fn dir(time: NodeTime) -> Self {
        Self { kind: NodeKind::Dir, size: 0, perm: 0o755, time }
    }

    #[must_use]
    pub fn file(size: u64, time: NodeTime) -> Self {
        Self { kind: NodeKind::File, size, perm: 0o644, time }
    }

    #[must_use]
    pub fn file_with_perm(size: u64, perm: u16, time: NodeTime) -> Self {
        Self { kind: NodeKind::File, size, perm, time }
    }

    #[must_use]
    pub fn symlink(target_len: u64, time: NodeTime) -> Self {
        Self { kind: NodeKind::Symlink, size: target_len, perm: 0o777, time }
    }
}

/// A single `Readdir` entry. The filesystem dispatch layer resolves `ino`
/// through the [`crate::inode::InodeTable`] from the child node's identity
/// before constructing this.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub kind: NodeKind,
}

impl DirEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, ino: u64, kind: NodeKind) -> Self {
        Self { name: name.into(), ino, kind }
    }
}

/// Per-file-handle state, stashed in the filesystem's handle table between
/// `Open` and `Release`. Nodes that don't need handle state leave it as
/// [`HandleState::Empty`].
#[derive(Debug, Clone)]
pub enum HandleState {
    /// A read-only snapshot produced at `Open` time: multiple `Read`s
    /// against the same handle draw from that snapshot.
    ReadBuffer(Arc<Vec<u8>>),
    /// Bytes accumulated across writes, flushed on `Flush`/`Release`
    /// (`ctl`, `send`, `cancel`).
    WriteBuffer(Vec<u8>),
    Empty,
}

impl HandleState {
    #[must_use]
    pub fn read_slice(&self, offset: i64, size: u32) -> &[u8] {
        let Self::ReadBuffer(buf) = self else {
            return &[];
        };
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        if offset >= buf.len() {
            return &[];
        }
        let end = offset.saturating_add(size as usize).min(buf.len());
        &buf[offset..end]
    }
}

/// A node in the synthesized filesystem tree.
///
/// Every method has a default that fits directories/leaves for which the
/// operation is meaningless (e.g. `Read` on a directory); concrete node
/// types override only what applies to them.
pub trait Node: Send + Sync {
    /// This node's logical identity, used by the filesystem dispatch layer
    /// to assign it a stable inode number on `Lookup` the same way its
    /// parent's `Readdir` would: two independent Lookups for the same
    /// logical child must return the same inode number.
    fn inode_key(&self, ctx: &FsContext) -> InodeKey;

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError>;

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let _ = (ctx, name);
        Err(FsError::NotFound)
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let _ = ctx;
        Ok(Vec::new())
    }

    fn readlink(&self, ctx: &FsContext) -> Result<String, FsError> {
        let _ = ctx;
        Err(FsError::NotFound)
    }

    fn open(&self, ctx: &FsContext, write: bool) -> Result<HandleState, FsError> {
        let _ = (ctx, write);
        Ok(HandleState::Empty)
    }

    fn read(&self, ctx: &FsContext, handle: &HandleState, offset: i64, size: u32) -> Result<Vec<u8>, FsError> {
        let _ = ctx;
        Ok(handle.read_slice(offset, size).to_vec())
    }

    fn write(&self, ctx: &FsContext, handle: &mut HandleState, data: &[u8]) -> Result<u32, FsError> {
        let _ = ctx;
        let HandleState::WriteBuffer(buf) = handle else {
            return Err(FsError::PermissionDenied);
        };
        buf.extend_from_slice(data);
        Ok(u32::try_from(data.len()).unwrap_or(u32::MAX))
    }

    fn flush(&self, ctx: &FsContext, handle: &mut HandleState) -> Result<(), FsError> {
        let _ = (ctx, handle);
        Ok(())
    }

    fn rmdir(&self, ctx: &FsContext, name: &str) -> Result<(), FsError> {
        let _ = (ctx, name);
        Err(FsError::NotFound)
    }
}
