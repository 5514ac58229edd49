//! Path resolution through symlinks.
//!
//! Each hop's target is resolved relative to the directory *that hop's
//! symlink lives in* — `dir_stack` is left untouched across
//! [follow_symlink], so stepping into a real directory component is the
//! only thing that ever changes what "relative" means. This matches
//! `EdenMountTest.cpp`'s `resolveSymlink` expectations exactly, including
//! the case its own test labels `// BAD BAD BAD`: a chain of relative
//! symlinks (`a` -> `b`, `b` -> `src/c`, `src/c` -> `test.c`) resolves
//! correctly only because each hop's target is interpreted against the
//! directory it was found in, not the directory that first referenced it.
//! That's surprising enough that EdenFS's own authors flagged it, but it
//! isn't a bug to fix here — changing it would break the chain.
use crate::errors::{Error, Result};
use crate::inode::{FileInode, FileKind, Inode, TreeInode};
use crate::mount::ResolveContext;
use crate::path::{AbsolutePath, PathComponent};
use std::collections::VecDeque;
use std::sync::Arc;

const MAX_SYMLINK_DEPTH: u32 = 40;

enum Seg {
    Named(PathComponent),
    DotDot,
}

fn parse_target(text: &str) -> Result<Vec<Seg>> {
    let mut segs = Vec::new();
    for part in text.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            segs.push(Seg::DotDot);
            continue;
        }
        let component = PathComponent::try_from(part)
            .map_err(|e| Error::InvalidArgument(format!("symlink target {text:?}: {e}")))?;
        segs.push(Seg::Named(component));
    }
    Ok(segs)
}

async fn follow_symlink(
    f: &Arc<FileInode>,
    pending: &mut VecDeque<Seg>,
    hops: &mut u32,
    ctx: &ResolveContext<'_>,
) -> Result<()> {
    *hops += 1;
    if *hops > MAX_SYMLINK_DEPTH {
        return Err(Error::SymlinkLoop);
    }
    let target_bytes = f.read_link(ctx.cache, ctx.store, ctx.importer, ctx.clock).await?;
    let target_text = String::from_utf8_lossy(&target_bytes).into_owned();
    if target_text.starts_with('/') {
        return Err(Error::PermissionDenied(format!("absolute symlink target: {target_text}")));
    }
    let mut target_segs = parse_target(&target_text)?;
    target_segs.extend(pending.drain(..));
    *pending = target_segs.into();
    Ok(())
}

async fn drain(
    dir_stack: &mut Vec<Arc<TreeInode>>,
    pending: &mut VecDeque<Seg>,
    hops: &mut u32,
    follow_trailing_symlink: bool,
    ctx: &ResolveContext<'_>,
) -> Result<Inode> {
    loop {
        let Some(seg) = pending.pop_front() else {
            return Ok(Inode::Tree(dir_stack.last().unwrap().clone()));
        };
        match seg {
            Seg::DotDot => {
                if dir_stack.len() <= 1 {
                    return Err(Error::CrossDeviceLink("..".to_string()));
                }
                dir_stack.pop();
                continue;
            }
            Seg::Named(component) => {
                let current_dir = dir_stack.last().unwrap().clone();
                let child = current_dir
                    .lookup(
                        &component,
                        ctx.store,
                        ctx.importer,
                        ctx.inode_map,
                        ctx.default_uid,
                        ctx.default_gid,
                        ctx.checkout_time,
                    )
                    .await?;
                let is_last = pending.is_empty();
                match &child {
                    Inode::Tree(t) => {
                        dir_stack.push(t.clone());
                        if is_last {
                            return Ok(child);
                        }
                    }
                    Inode::File(f) if f.kind() == FileKind::Symlink => {
                        if is_last && !follow_trailing_symlink {
                            return Ok(child);
                        }
                        follow_symlink(f, pending, hops, ctx).await?;
                    }
                    Inode::File(_) => {
                        if !is_last {
                            return Err(Error::NotADirectory(component.to_string()));
                        }
                        return Ok(child);
                    }
                }
            }
        }
    }
}

/// Resolves an absolute path from the mount root, following every symlink
/// along the way. `follow_trailing_symlink` mirrors `lstat` vs. `stat`: when
/// `false` and the final component is itself a symlink, that symlink's own
/// inode is returned unresolved.
pub async fn resolve_path(
    root: &Arc<TreeInode>,
    path: &AbsolutePath,
    follow_trailing_symlink: bool,
    ctx: &ResolveContext<'_>,
) -> Result<Inode> {
    let mut dir_stack = vec![root.clone()];
    let mut pending: VecDeque<Seg> = path.components().iter().cloned().map(Seg::Named).collect();
    let mut hops = 0u32;
    drain(&mut dir_stack, &mut pending, &mut hops, follow_trailing_symlink, ctx).await
}

/// Fully resolves a single already-looked-up inode: a non-symlink is
/// returned as-is, a symlink is followed (and any further symlinks its
/// target chain introduces) until a non-symlink is reached. `dir_stack` is
/// the full ancestry from the mount root down to (and including) the
/// directory the symlink lives in, so a target that climbs out with `..`
/// past that directory still resolves against its true ancestors instead of
/// hitting a spurious root.
pub async fn resolve_symlink(inode: Inode, mut dir_stack: Vec<Arc<TreeInode>>, ctx: &ResolveContext<'_>) -> Result<Inode> {
    let f = match &inode {
        Inode::Tree(_) => return Ok(inode),
        Inode::File(f) if f.kind() != FileKind::Symlink => return Ok(inode),
        Inode::File(f) => f.clone(),
    };
    let mut pending: VecDeque<Seg> = VecDeque::new();
    let mut hops = 0u32;
    follow_symlink(&f, &mut pending, &mut hops, ctx).await?;
    drain(&mut dir_stack, &mut pending, &mut hops, true, ctx).await
}
