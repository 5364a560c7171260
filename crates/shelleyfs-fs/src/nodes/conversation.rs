//! `conversation/{local_id}/` and its leaves.

use std::sync::Arc;

use shelleyfs_common::{ConversationRecord, CtlKey, format_ctl_tokens, parse_ctl_tokens};

use crate::backend_ops::{fetch_bundle, resolve_model_id};
use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::InodeKey;
use crate::node::{Attr, DirEntry, HandleState, Node, NodeKind};
use crate::time::{NodeTime, conversation_time, from_chrono};

use super::messages::MessagesDirNode;
use super::static_file::StaticFileNode;
use super::symlink::SymlinkNode;

fn record_or_not_found(ctx: &FsContext, local_id: &str) -> Result<ConversationRecord, FsError> {
    ctx.store.get(local_id).ok_or(FsError::NotFound)
}

fn record_time(record: &ConversationRecord) -> NodeTime {
    conversation_time(&record.api_created_at, &record.api_updated_at, from_chrono(record.created_at))
}

fn is_working(ctx: &FsContext, shelley_id: &str) -> bool {
    if shelley_id.is_empty() {
        return false;
    }
    let client = Arc::clone(&ctx.client);
    let id = shelley_id.to_string();
    crate::bridge::run_blocking(&ctx.runtime, async move {
        client.working(&id).await.map_err(FsError::from)
    })
    .unwrap_or(false)
}

pub struct ConversationDirNode {
    local_id: String,
}

impl ConversationDirNode {
    #[must_use]
    pub fn new(local_id: String) -> Self {
        Self { local_id }
    }
}

impl Node for ConversationDirNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("conversation-dir").with_conversation(&self.local_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        Ok(Attr::dir(record_time(&record)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let time = record_time(&record);
        let key = |tag: &'static str| InodeKey::new(tag).with_conversation(&self.local_id);

        match name {
            "ctl" => Ok(Arc::new(CtlNode::new(self.local_id.clone()))),
            "send" => Ok(Arc::new(SendNode::new(self.local_id.clone()))),
            "fuse_id" => Ok(Arc::new(StaticFileNode::new(
                format!("{}\n", self.local_id),
                0o444,
                time,
                key("conv-fuse-id"),
            ))),
            "id" if record.created => Ok(Arc::new(StaticFileNode::new(
                format!("{}\n", record.shelley_id),
                0o444,
                time,
                key("conv-id"),
            ))),
            "slug" if record.created && !record.slug.is_empty() => Ok(Arc::new(StaticFileNode::new(
                format!("{}\n", record.slug),
                0o444,
                time,
                key("conv-slug"),
            ))),
            "created" => {
                let text = if record.created { "true\n" } else { "false\n" };
                Ok(Arc::new(StaticFileNode::new(text, 0o444, time, key("conv-created"))))
            }
            "created_at" if record.created => Ok(Arc::new(StaticFileNode::new(
                format!("{}\n", record.api_created_at),
                0o444,
                time,
                key("conv-created-at"),
            ))),
            "updated_at" if record.created => Ok(Arc::new(StaticFileNode::new(
                format!("{}\n", record.api_updated_at),
                0o444,
                time,
                key("conv-updated-at"),
            ))),
            "message_count" => {
                let count = fetch_bundle(ctx, &record)?.messages.len();
                Ok(Arc::new(StaticFileNode::new(
                    format!("{count}\n"),
                    0o444,
                    time,
                    key("conv-message-count"),
                )))
            }
            "model" => {
                let model = record.ctl.get(&CtlKey::Model).ok_or(FsError::NotFound)?;
                Ok(Arc::new(SymlinkNode::new(format!("../../model/{model}"), time, key("conv-model"))))
            }
            "cwd" => {
                let cwd = record.ctl.get(&CtlKey::Cwd).ok_or(FsError::NotFound)?;
                Ok(Arc::new(SymlinkNode::new(cwd.clone(), time, key("conv-cwd"))))
            }
            "cancel" if is_working(ctx, &record.shelley_id) => {
                Ok(Arc::new(CancelNode::new(record.shelley_id.clone(), self.local_id.clone())))
            }
            "continue" if record.created => {
                Ok(Arc::new(ContinueNode::new(record.shelley_id.clone(), self.local_id.clone())))
            }
            "messages" => Ok(Arc::new(MessagesDirNode::new(self.local_id.clone()))),
            _ => Err(FsError::NotFound),
        }
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let key = |tag: &'static str| InodeKey::new(tag).with_conversation(&self.local_id);

        let mut entries = vec![
            DirEntry::new("ctl", ctx.inodes.get_or_assign(key("conv-ctl")), NodeKind::File),
            DirEntry::new("send", ctx.inodes.get_or_assign(key("conv-send")), NodeKind::File),
            DirEntry::new("fuse_id", ctx.inodes.get_or_assign(key("conv-fuse-id")), NodeKind::File),
            DirEntry::new("created", ctx.inodes.get_or_assign(key("conv-created")), NodeKind::File),
            DirEntry::new(
                "message_count",
                ctx.inodes.get_or_assign(key("conv-message-count")),
                NodeKind::File,
            ),
            DirEntry::new("messages", ctx.inodes.get_or_assign(key("conv-messages")), NodeKind::Dir),
        ];

        if record.created {
            entries.push(DirEntry::new("id", ctx.inodes.get_or_assign(key("conv-id")), NodeKind::File));
            if !record.slug.is_empty() {
                entries.push(DirEntry::new("slug", ctx.inodes.get_or_assign(key("conv-slug")), NodeKind::File));
            }
            entries.push(DirEntry::new(
                "created_at",
                ctx.inodes.get_or_assign(key("conv-created-at")),
                NodeKind::File,
            ));
            entries.push(DirEntry::new(
                "updated_at",
                ctx.inodes.get_or_assign(key("conv-updated-at")),
                NodeKind::File,
            ));
            entries.push(DirEntry::new(
                "continue",
                ctx.inodes.get_or_assign(key("conv-continue")),
                NodeKind::File,
            ));
        }

        if record.ctl.contains_key(&CtlKey::Model) {
            entries.push(DirEntry::new("model", ctx.inodes.get_or_assign(key("conv-model")), NodeKind::Symlink));
        }
        if record.ctl.contains_key(&CtlKey::Cwd) {
            entries.push(DirEntry::new("cwd", ctx.inodes.get_or_assign(key("conv-cwd")), NodeKind::Symlink));
        }
        if is_working(ctx, &record.shelley_id) {
            entries.push(DirEntry::new("cancel", ctx.inodes.get_or_assign(key("conv-cancel")), NodeKind::File));
        }

        Ok(entries)
    }
}

/// `ctl`: rw token map until `created`, then read-only.
pub struct CtlNode {
    local_id: String,
}

impl CtlNode {
    #[must_use]
    pub fn new(local_id: String) -> Self {
        Self { local_id }
    }
}

impl Node for CtlNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("conv-ctl").with_conversation(&self.local_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let body = format!("{}\n", format_ctl_tokens(&record.ctl));
        Ok(Attr::file_with_perm(body.len() as u64, 0o644, record_time(&record)))
    }

    fn open(&self, ctx: &FsContext, write: bool) -> Result<HandleState, FsError> {
        if write {
            return Ok(HandleState::WriteBuffer(Vec::new()));
        }
        let record = record_or_not_found(ctx, &self.local_id)?;
        let body = format!("{}\n", format_ctl_tokens(&record.ctl));
        Ok(HandleState::ReadBuffer(Arc::new(body.into_bytes())))
    }

    fn flush(&self, ctx: &FsContext, handle: &mut HandleState) -> Result<(), FsError> {
        let HandleState::WriteBuffer(buf) = handle else {
            return Ok(());
        };
        if buf.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(buf);
        let updates = parse_ctl_tokens(&text);
        ctx.store.set_ctl(&self.local_id, &updates)?;
        buf.clear();
        Ok(())
    }
}

/// `send`: write-only, per-handle buffer submitted as one message on flush.
pub struct SendNode {
    local_id: String,
}

impl SendNode {
    #[must_use]
    pub fn new(local_id: String) -> Self {
        Self { local_id }
    }
}

impl Node for SendNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("conv-send").with_conversation(&self.local_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        Ok(Attr::file_with_perm(0, 0o200, record_time(&record)))
    }

    fn open(&self, _ctx: &FsContext, write: bool) -> Result<HandleState, FsError> {
        if !write {
            return Err(FsError::PermissionDenied);
        }
        Ok(HandleState::WriteBuffer(Vec::new()))
    }

    fn flush(&self, ctx: &FsContext, handle: &mut HandleState) -> Result<(), FsError> {
        let HandleState::WriteBuffer(buf) = handle else {
            return Ok(());
        };
        if buf.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(buf).into_owned();
        let record = record_or_not_found(ctx, &self.local_id)?;
        let cwd = record.ctl.get(&CtlKey::Cwd).cloned().unwrap_or_default();
        let client = Arc::clone(&ctx.client);

        if record.created {
            let shelley_id = record.shelley_id.clone();
            crate::bridge::run_blocking(&ctx.runtime, async move {
                client.send_message(&shelley_id, &text, &cwd).await.map_err(FsError::from)
            })?;
        } else {
            let model_id = resolve_model_id(ctx, &record)?;
            let new = crate::bridge::run_blocking(&ctx.runtime, async move {
                client.start_conversation(&text, &model_id, &cwd).await.map_err(FsError::from)
            })?;
            ctx.store.mark_created(&self.local_id, &new.shelley_id, new.slug)?;
        }

        ctx.parsed_cache.invalidate(&record.shelley_id);
        buf.clear();
        Ok(())
    }
}

/// `cancel`: write-only, visible only while the backend reports the
/// conversation working.
pub struct CancelNode {
    shelley_id: String,
    local_id: String,
}

impl CancelNode {
    #[must_use]
    pub fn new(shelley_id: String, local_id: String) -> Self {
        Self { shelley_id, local_id }
    }
}

impl Node for CancelNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("conv-cancel").with_conversation(&self.local_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::file_with_perm(0, 0o200, NodeTime::uniform(ctx.start_time)))
    }

    fn open(&self, _ctx: &FsContext, write: bool) -> Result<HandleState, FsError> {
        if !write {
            return Err(FsError::PermissionDenied);
        }
        Ok(HandleState::WriteBuffer(Vec::new()))
    }

    fn flush(&self, ctx: &FsContext, handle: &mut HandleState) -> Result<(), FsError> {
        let HandleState::WriteBuffer(buf) = handle else {
            return Ok(());
        };
        if buf.is_empty() {
            return Ok(());
        }
        let client = Arc::clone(&ctx.client);
        let shelley_id = self.shelley_id.clone();
        crate::bridge::run_blocking(&ctx.runtime, async move {
            client.cancel(&shelley_id).await.map_err(FsError::from)
        })?;
        ctx.parsed_cache.invalidate(&self.shelley_id);
        buf.clear();
        Ok(())
    }
}

/// `continue`: every Read (on a fresh handle) produces a distinct new local
/// id; a given handle is idempotent.
pub struct ContinueNode {
    shelley_id: String,
    local_id: String,
}

impl ContinueNode {
    #[must_use]
    pub fn new(shelley_id: String, local_id: String) -> Self {
        Self { shelley_id, local_id }
    }
}

impl Node for ContinueNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("conv-continue").with_conversation(&self.local_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::file_with_perm(9, 0o444, NodeTime::uniform(ctx.start_time)))
    }

    fn open(&self, ctx: &FsContext, write: bool) -> Result<HandleState, FsError> {
        if write {
            return Err(FsError::PermissionDenied);
        }
        let client = Arc::clone(&ctx.client);
        let shelley_id = self.shelley_id.clone();
        let new_shelley_id = crate::bridge::run_blocking(&ctx.runtime, async move {
            client.continue_conversation(&shelley_id).await.map_err(FsError::from)
        })?;
        let local_id = ctx.store.adopt(&new_shelley_id, None, None, None)?;
        Ok(HandleState::ReadBuffer(Arc::new(format!("{local_id}\n").into_bytes())))
    }
}
