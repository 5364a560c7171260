//! The `fuser::Filesystem` dispatch layer: translates kernel requests into
//! [`Node`] method calls, resolving inode numbers through the registry and
//! [`crate::inode::InodeTable`].

use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request,
};
use tracing::{debug, warn};

use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::ROOT_INODE;
use crate::node::{Attr, HandleState, Node, NodeKind};
use crate::nodes::root::RootNode;

/// Kernel entry/attribute cache timeout. Zero so the kernel always
/// round-trips Lookup/Getattr — without it, presence/absence nodes like
/// `cancel` and `ready` would appear to linger.
const TTL: Duration = Duration::ZERO;

fn to_file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Dir => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
        NodeKind::Symlink => FileType::Symlink,
    }
}

fn to_file_attr(ino: u64, attr: &Attr, uid: u32, gid: u32) -> FileAttr {
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: attr.time.mtime,
        mtime: attr.time.mtime,
        ctime: attr.time.ctime,
        crtime: attr.time.ctime,
        kind: to_file_type(attr.kind),
        perm: attr.perm,
        nlink: if attr.kind == NodeKind::Dir { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn name_str(name: &OsStr) -> Result<&str, FsError> {
    name.to_str().ok_or_else(|| FsError::InvalidArgument("non-UTF-8 path component".to_string()))
}

struct OpenHandle {
    ino: u64,
    state: Mutex<HandleState>,
}

/// The synthesized filesystem root, bridging `fuser`'s synchronous callback
/// API to the [`Node`] tree. Holds the mount-lifetime [`FsContext`] plus the
/// per-file-handle state table, keyed by the file handle fuser hands out and
/// cleaned up on release.
pub struct ShelleyFs {
    ctx: FsContext,
    handles: DashMap<u64, OpenHandle>,
    next_fh: AtomicU64,
}

impl ShelleyFs {
    #[must_use]
    pub fn new(ctx: FsContext) -> Self {
        ctx.register(ROOT_INODE, std::sync::Arc::new(RootNode::new()));
        ctx.parents.insert(ROOT_INODE, ROOT_INODE);
        Self { ctx, handles: DashMap::new(), next_fh: AtomicU64::new(1) }
    }

    fn node(&self, ino: u64) -> Option<std::sync::Arc<dyn Node>> {
        self.ctx.registry.get(&ino).map(|e| std::sync::Arc::clone(e.value()))
    }

    fn allocate_fh(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }
}

impl Filesystem for ShelleyFs {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_node) = self.node(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let name = match name_str(name) {
            Ok(n) => n,
            Err(_) => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match parent_node.lookup(&self.ctx, name) {
            Ok(child) => {
                let key = child.inode_key(&self.ctx);
                let ino = self.ctx.inodes.get_or_assign(key);
                self.ctx.register(ino, child.clone());
                self.ctx.parents.insert(ino, parent);

                match child.getattr(&self.ctx) {
                    Ok(attr) => {
                        let file_attr = to_file_attr(ino, &attr, req.uid(), req.gid());
                        reply.entry(&TTL, &file_attr, 0);
                    }
                    Err(e) => reply.error(e.errno()),
                }
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(node) = self.node(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match node.getattr(&self.ctx) {
            Ok(attr) => reply.attr(&TTL, &to_file_attr(ino, &attr, req.uid(), req.gid())),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let Some(node) = self.node(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match node.readlink(&self.ctx) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(node) = self.node(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let write = flags & (libc::O_WRONLY | libc::O_RDWR) != 0;
        match node.open(&self.ctx, write) {
            Ok(state) => {
                let fh = self.allocate_fh();
                self.handles.insert(fh, OpenHandle { ino, state: Mutex::new(state) });
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let (Some(node), Some(handle)) = (self.node(ino), self.handles.get(&fh)) else {
            reply.error(libc::ENOENT);
            return;
        };
        let state = handle.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match node.read(&self.ctx, &state, offset, size) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let (Some(node), Some(handle)) = (self.node(ino), self.handles.get(&fh)) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut state = handle.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match node.write(&self.ctx, &mut state, data) {
            Ok(n) => reply.written(n),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let (Some(node), Some(handle)) = (self.node(ino), self.handles.get(&fh)) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut state = handle.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match node.flush(&self.ctx, &mut state) {
            Ok(()) => reply.ok(),
            Err(e) => {
                warn!(ino, error = %e, "flush failed");
                reply.error(e.errno());
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.handles.remove(&fh);
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        if self.node(ino).is_none() {
            reply.error(libc::ENOENT);
            return;
        }
        reply.opened(self.allocate_fh(), 0);
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.handles.remove(&fh);
        reply.ok();
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(node) = self.node(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let children = match node.readdir(&self.ctx) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };

        let parent_ino = self.ctx.parents.get(&ino).map_or(ino, |e| *e.value());
        let mut all = vec![(ino, FileType::Directory, ".".to_string()), (parent_ino, FileType::Directory, "..".to_string())];
        all.extend(children.into_iter().map(|e| (e.ino, to_file_type(e.kind), e.name)));

        for (i, (child_ino, kind, name)) in all.iter().enumerate().skip(offset as usize) {
            if reply.add(*child_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_node) = self.node(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let name = match name_str(name) {
            Ok(n) => n,
            Err(_) => {
                reply.error(libc::EINVAL);
                return;
            }
        };
        match parent_node.rmdir(&self.ctx, name) {
            Ok(()) => {
                debug!(parent, name, "rmdir");
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::time::NodeTime;

    #[test]
    fn file_type_mapping_matches_node_kind() {
        assert_eq!(to_file_type(NodeKind::Dir), FileType::Directory);
        assert_eq!(to_file_type(NodeKind::File), FileType::RegularFile);
        assert_eq!(to_file_type(NodeKind::Symlink), FileType::Symlink);
    }

    #[test]
    fn file_attr_rounds_size_up_to_whole_blocks_and_sets_nlink_by_kind() {
        let attr = Attr::file(513, NodeTime::uniform(SystemTime::UNIX_EPOCH));
        let fa = to_file_attr(7, &attr, 1000, 1000);
        assert_eq!(fa.ino, 7);
        assert_eq!(fa.blocks, 2);
        assert_eq!(fa.nlink, 1);

        let dir_attr = Attr::dir(NodeTime::uniform(SystemTime::UNIX_EPOCH));
        let dir_fa = to_file_attr(8, &dir_attr, 1000, 1000);
        assert_eq!(dir_fa.nlink, 2);
    }

    #[test]
    fn name_str_rejects_non_utf8_components() {
        use std::os::unix::ffi::OsStrExt;
        let valid = OsStr::new("hello");
        assert_eq!(name_str(valid).unwrap(), "hello");

        let invalid = OsStr::from_bytes(&[0x66, 0x6f, 0x80, 0x6f]);
        assert!(matches!(name_str(invalid), Err(FsError::InvalidArgument(_))));
    }
}
