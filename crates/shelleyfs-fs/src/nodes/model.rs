//! The model tree.

use std::sync::Arc;

use shelleyfs_common::CtlKey;

use crate::backend_ops::{display_name, fetch_models};
use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::InodeKey;
use crate::node::{Attr, DirEntry, HandleState, Node, NodeKind};
use crate::time::NodeTime;

use super::static_file::StaticFileNode;
use super::symlink::SymlinkNode;

const START_SCRIPT_TEMPLATE: &str = "#!/bin/sh\n\
set -e\n\
dir=\"$(CDPATH= cd -- \"$(dirname -- \"$0\")\" && pwd)\"\n\
message=\"$(cat)\"\n\
local_id=\"$(cat \"$dir/clone\")\"\n\
conv_dir=\"$dir/../../../conversation/$local_id\"\n\
printf 'cwd=%s\\n' \"$PWD\" > \"$conv_dir/ctl\"\n\
printf '%s' \"$message\" > \"$conv_dir/send\"\n\
printf '%s\\n' \"$local_id\"\n";

pub struct ModelTreeNode;

impl ModelTreeNode {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ModelTreeNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for ModelTreeNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("model-tree")
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::dir(NodeTime::uniform(ctx.start_time)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let models = fetch_models(ctx)?;

        if name == "default" {
            let default_id = models.default_model_id.as_deref().ok_or(FsError::NotFound)?;
            let model = models.models.iter().find(|m| m.id == default_id).ok_or(FsError::NotFound)?;
            return Ok(Arc::new(SymlinkNode::new(
                display_name(model).to_string(),
                NodeTime::uniform(ctx.start_time),
                InodeKey::new("model-default"),
            )));
        }

        if let Some(model) = models.models.iter().find(|m| display_name(m) == name) {
            return Ok(Arc::new(ModelDirNode::new(model.id.clone(), display_name(model).to_string(), model.ready)));
        }

        // A lookup by internal id that differs from the display name
        // resolves to the same symlink Readdir advertises.
        if let Some(model) = models.models.iter().find(|m| m.id == name && m.id != display_name(m)) {
            return Ok(Arc::new(SymlinkNode::new(
                display_name(model).to_string(),
                NodeTime::uniform(ctx.start_time),
                InodeKey::new("model-id-alias").with_field(&model.id),
            )));
        }

        Err(FsError::NotFound)
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let models = fetch_models(ctx)?;
        let mut entries = Vec::new();

        for model in &models.models {
            let name = display_name(model);
            let ino = ctx
                .inodes
                .get_or_assign(InodeKey::new("model-dir").with_field(name));
            entries.push(DirEntry::new(name, ino, NodeKind::Dir));

            if model.id != name {
                let ino = ctx
                    .inodes
                    .get_or_assign(InodeKey::new("model-id-alias").with_field(&model.id));
                entries.push(DirEntry::new(model.id.clone(), ino, NodeKind::Symlink));
            }
        }

        if let Some(default_id) = &models.default_model_id {
            if models.models.iter().any(|m| &m.id == default_id) {
                let ino = ctx.inodes.get_or_assign(InodeKey::new("model-default"));
                entries.push(DirEntry::new("default", ino, NodeKind::Symlink));
            }
        }

        Ok(entries)
    }
}

pub struct ModelDirNode {
    model_id: String,
    display_name: String,
    ready: bool,
}

impl ModelDirNode {
    #[must_use]
    pub fn new(model_id: String, display_name: String, ready: bool) -> Self {
        Self { model_id, display_name, ready }
    }
}

impl Node for ModelDirNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("model-dir").with_field(&self.display_name)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::dir(NodeTime::uniform(ctx.start_time)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        match name {
            "id" => Ok(Arc::new(StaticFileNode::new(
                format!("{}\n", self.model_id),
                0o444,
                NodeTime::uniform(ctx.start_time),
                InodeKey::new("model-field").with_field(format!("{}/id", self.display_name)),
            ))),
            "ready" if self.ready => Ok(Arc::new(StaticFileNode::new(
                Vec::new(),
                0o444,
                NodeTime::uniform(ctx.start_time),
                InodeKey::new("model-field").with_field(format!("{}/ready", self.display_name)),
            ))),
            "new" => Ok(Arc::new(ModelNewDirNode::new(self.model_id.clone(), self.display_name.clone()))),
            _ => Err(FsError::NotFound),
        }
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let id = ctx.inodes.get_or_assign(
            InodeKey::new("model-field").with_field(format!("{}/id", self.display_name)),
        );
        let new = ctx.inodes.get_or_assign(
            InodeKey::new("model-new").with_field(&self.display_name),
        );
        let mut entries = vec![
            DirEntry::new("id", id, NodeKind::File),
            DirEntry::new("new", new, NodeKind::Dir),
        ];
        if self.ready {
            let ready = ctx.inodes.get_or_assign(
                InodeKey::new("model-field").with_field(format!("{}/ready", self.display_name)),
            );
            entries.push(DirEntry::new("ready", ready, NodeKind::File));
        }
        Ok(entries)
    }
}

pub struct ModelNewDirNode {
    model_id: String,
    display_name: String,
}

impl ModelNewDirNode {
    #[must_use]
    pub fn new(model_id: String, display_name: String) -> Self {
        Self { model_id, display_name }
    }
}

impl Node for ModelNewDirNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("model-new").with_field(&self.display_name)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::dir(NodeTime::uniform(ctx.start_time)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        match name {
            "clone" => Ok(Arc::new(CloneNode::new(self.model_id.clone(), self.display_name.clone()))),
            "start" => Ok(Arc::new(StaticFileNode::new(
                START_SCRIPT_TEMPLATE.as_bytes().to_vec(),
                0o555,
                NodeTime::uniform(ctx.start_time),
                InodeKey::new("model-start").with_field(&self.display_name),
            ))),
            _ => Err(FsError::NotFound),
        }
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let clone = ctx.inodes.get_or_assign(
            InodeKey::new("model-clone").with_field(&self.display_name),
        );
        let start = ctx.inodes.get_or_assign(
            InodeKey::new("model-start").with_field(&self.display_name),
        );
        Ok(vec![
            DirEntry::new("clone", clone, NodeKind::File),
            DirEntry::new("start", start, NodeKind::File),
        ])
    }
}

/// `model/{name}/new/clone`: every `Open` allocates a fresh uncreated
/// conversation record pre-seeded with this model, and the handle's
/// read buffer carries the new local id.
pub struct CloneNode {
    model_id: String,
    display_name: String,
}

impl CloneNode {
    #[must_use]
    pub fn new(model_id: String, display_name: String) -> Self {
        Self { model_id, display_name }
    }
}

impl Node for CloneNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("model-clone").with_field(&self.display_name)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        // 8 hex digits plus a trailing newline; every open allocates a
        // distinct id but they're all the same length.
        Ok(Attr::file(9, NodeTime::uniform(ctx.start_time)))
    }

    fn open(&self, ctx: &FsContext, write: bool) -> Result<HandleState, FsError> {
        if write {
            return Err(FsError::PermissionDenied);
        }
        let local_id = ctx.store.clone_conversation()?;
        ctx.store.set_ctl(
            &local_id,
            &[
                (CtlKey::Model, self.display_name.clone()),
                (CtlKey::ModelId, self.model_id.clone()),
            ],
        )?;
        Ok(HandleState::ReadBuffer(Arc::new(format!("{local_id}\n").into_bytes())))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::nodes::test_support::{MockBackendClient, test_ctx};

    const MODELS: &str = r#"{
        "models": [
            {"id": "claude-opus-4", "display_name": "opus", "ready": true},
            {"id": "codename-x", "ready": false}
        ],
        "default_model_id": "claude-opus-4"
    }"#;

    fn seeded() -> (FsContext, tempfile::TempDir) {
        let client = MockBackendClient::new();
        *client.models.lock().unwrap() = MODELS.as_bytes().to_vec();
        test_ctx(client)
    }

    #[tokio::test]
    async fn readdir_lists_display_names_id_aliases_and_default() {
        let (ctx, _dir) = seeded();
        let node = ModelTreeNode::new();
        let entries = node.readdir(&ctx).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"opus"));
        assert!(names.contains(&"codename-x"));
        assert!(names.contains(&"default"));
        assert!(!names.contains(&"claude-opus-4"), "opus has a display name, no id alias expected");
    }

    #[tokio::test]
    async fn lookup_default_resolves_to_the_default_models_display_name() {
        let (ctx, _dir) = seeded();
        let node = ModelTreeNode::new();
        let target = node.lookup(&ctx, "default").unwrap().readlink(&ctx).unwrap();
        assert_eq!(target, "opus");
    }

    #[tokio::test]
    async fn lookup_by_internal_id_resolves_to_alias_when_names_differ() {
        let (ctx, _dir) = seeded();
        let node = ModelTreeNode::new();
        // "codename-x" has no display_name, so id == display name; no alias needed.
        assert!(node.lookup(&ctx, "codename-x").unwrap().readlink(&ctx).is_err());

        let target = node.lookup(&ctx, "claude-opus-4").unwrap().readlink(&ctx).unwrap();
        assert_eq!(target, "opus");
    }

    #[tokio::test]
    async fn model_dir_exposes_id_and_new_but_hides_ready_when_not_ready() {
        let (ctx, _dir) = seeded();
        let node = ModelDirNode::new("codename-x".to_string(), "codename-x".to_string(), false);
        assert!(node.lookup(&ctx, "id").is_ok());
        assert!(node.lookup(&ctx, "new").is_ok());
        assert!(matches!(node.lookup(&ctx, "ready"), Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn model_dir_exposes_ready_when_ready() {
        let (ctx, _dir) = seeded();
        let node = ModelDirNode::new("claude-opus-4".to_string(), "opus".to_string(), true);
        assert!(node.lookup(&ctx, "ready").is_ok());
    }

    #[tokio::test]
    async fn clone_allocates_a_fresh_record_preseeded_with_the_model() {
        let (ctx, _dir) = seeded();
        let node = CloneNode::new("claude-opus-4".to_string(), "opus".to_string());
        let HandleState::ReadBuffer(buf) = node.open(&ctx, false).unwrap() else {
            panic!("expected a read buffer");
        };
        let local_id = String::from_utf8(buf.to_vec()).unwrap().trim().to_string();
        let record = ctx.store.get(&local_id).unwrap();
        assert_eq!(record.ctl.get(&CtlKey::ModelId).map(String::as_str), Some("claude-opus-4"));
        assert_eq!(record.ctl.get(&CtlKey::Model).map(String::as_str), Some("opus"));
    }

    #[tokio::test]
    async fn clone_write_open_is_rejected() {
        let (ctx, _dir) = seeded();
        let node = CloneNode::new("claude-opus-4".to_string(), "opus".to_string());
        assert!(matches!(node.open(&ctx, true), Err(FsError::PermissionDenied)));
    }

    #[tokio::test]
    async fn model_new_dir_exposes_clone_and_start() {
        let (ctx, _dir) = seeded();
        let node = ModelNewDirNode::new("claude-opus-4".to_string(), "opus".to_string());
        assert!(node.lookup(&ctx, "clone").is_ok());
        assert!(node.lookup(&ctx, "start").is_ok());
        assert!(matches!(node.lookup(&ctx, "bogus"), Err(FsError::NotFound)));
    }
}
