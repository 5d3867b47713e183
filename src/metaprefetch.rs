//! Fetch only the `metadata` file for a ref, without a full pull.
//!
//! Walks commit → root tree → `metadata` file entry, using the direct
//! object fetch in [`crate::fetch`] and the gvariant shapes in
//! [`crate::objgv`] rather than going through a local `ostree::Repo`.

use std::io::Read;

use gvariant::aligned_bytes::TryAsAligned;
use gvariant::{Marker, Structure};

use crate::error::{Error, Result};
use crate::fetch::{self, ObjectType};
use crate::objgv::{gv_commit, gv_dirtree};

fn checksum_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Fetch and parse the commit object for `checksum`, returning the root
/// tree's checksum (hex).
fn root_tree_checksum(remote_base_url: &str, checksum: &str) -> Result<String> {
    let ctx = || format!("Reading commit {checksum} from {remote_base_url}");
    let data = fetch::fetch_remote_object(remote_base_url, checksum, ObjectType::Commit)?;
    let aligned = data
        .as_slice()
        .try_as_aligned()
        .map_err(|_| Error::parse(ctx(), "commit object is not validly aligned"))?;
    let commit = gv_commit!().cast(aligned);
    // Field index 6 of (a{sv}aya(say)sstayay) is the root tree's contents checksum.
    let (_metadata, _parent, _related, _subject, _body, _timestamp, root_tree_contents, _root_tree_meta) =
        commit.to_tuple();
    let root_tree: Vec<u8> = root_tree_contents.into();
    if root_tree.len() != 32 {
        return Err(Error::parse(ctx(), "root tree checksum is not 32 bytes"));
    }
    Ok(checksum_to_hex(&root_tree))
}

/// Fetch and parse the root tree, returning the `(name, checksum)` of a
/// file entry named `metadata`, if present.
fn find_metadata_entry(remote_base_url: &str, tree_checksum: &str) -> Result<Option<String>> {
    let ctx = || format!("Reading tree {tree_checksum} from {remote_base_url}");
    let data = fetch::fetch_remote_object(remote_base_url, tree_checksum, ObjectType::Dirtree)?;
    let aligned = data
        .as_slice()
        .try_as_aligned()
        .map_err(|_| Error::parse(ctx(), "dirtree object is not validly aligned"))?;
    let dirtree = gv_dirtree!().cast(aligned);
    let (files, _dirs) = dirtree.to_tuple();
    for entry in files.iter() {
        let (name, file_checksum) = entry.to_tuple();
        if name.to_str() == "metadata" {
            let file_checksum: Vec<u8> = file_checksum.into();
            return Ok(Some(checksum_to_hex(&file_checksum)));
        }
    }
    Ok(None)
}

/// The on-wire `filez` layout: a 4-byte big-endian header-size, that many
/// bytes of per-file header, 4 bytes of padding, then a raw-DEFLATE stream.
fn inflate_filez(data: &[u8], ctx: impl Fn() -> String) -> Result<Vec<u8>> {
    if data.len() < 4 {
        return Err(Error::parse(ctx(), "filez object shorter than header-size field"));
    }
    let header_size = u32::from_be_bytes(data[0..4].try_into().unwrap()) as usize;
    let skip = header_size
        .checked_add(8)
        .ok_or_else(|| Error::parse(ctx(), "filez header size overflows"))?;
    if skip > data.len() {
        return Err(Error::parse(
            ctx(),
            format!("filez header_size + 8 ({skip}) exceeds object size ({})", data.len()),
        ));
    }
    let compressed = &data[skip..];
    let mut decoder = flate2::read::DeflateDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::parse(ctx(), format!("inflating filez payload: {e}")))?;
    Ok(out)
}

/// Fetch and inflate the `metadata` file for `checksum`, without a full
/// pull. Fails with [`Error::NotFound`] if the commit's root tree has no
/// `metadata` entry.
pub fn fetch_metadata(remote_base_url: &str, checksum: &str) -> Result<Vec<u8>> {
    let ctx = || format!("Fetching metadata for {checksum} from {remote_base_url}");
    let root_tree = root_tree_checksum(remote_base_url, checksum)?;
    let metadata_checksum = find_metadata_entry(remote_base_url, &root_tree)?
        .ok_or_else(|| Error::not_found(ctx(), "root tree has no metadata entry"))?;
    let filez = fetch::fetch_remote_object(remote_base_url, &metadata_checksum, ObjectType::Filez)?;
    inflate_filez(&filez, ctx)
}
