// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! POSIX attribute snapshots, directory entries, and the attribute-view
//! vocabulary (spec §3, §4.5, §6).

use crate::error::{Error, ErrorKind, Result};
use std::collections::HashMap;

/// The kind of filesystem entry a [`Attributes`] snapshot describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Other,
}

/// A read-only POSIX attribute snapshot, as returned by `stat`/`lstat`.
///
/// Creation time is aliased to `mtime`: SFTP v3 does not report a separate
/// creation time, so there is nothing else to report it from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attributes {
    pub size: u64,
    pub mtime: i64,
    pub atime: i64,
    pub permissions: u16,
    pub uid: u32,
    pub gid: u32,
    pub kind: FileType,
}

impl Attributes {
    pub fn creation_time(&self) -> i64 {
        self.mtime
    }

    pub fn is_regular_file(&self) -> bool {
        self.kind == FileType::Regular
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileType::Directory
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.kind == FileType::Symlink
    }

    pub fn is_other(&self) -> bool {
        self.kind == FileType::Other
    }
}

/// One entry yielded by a directory stream. The virtual `.`/`..` entries
/// are filtered out before these reach a caller.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub attributes: Attributes,
}

/// The three attribute families this adapter exposes. Any other view name
/// is rejected with [`ErrorKind::Unsupported`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeView {
    Basic,
    Owner,
    Posix,
}

impl AttributeView {
    pub fn parse(name: &str) -> Result<AttributeView> {
        match name {
            "basic" => Ok(AttributeView::Basic),
            "owner" => Ok(AttributeView::Owner),
            "posix" => Ok(AttributeView::Posix),
            other => Err(Error::new(
                ErrorKind::Unsupported,
                format!("attribute view {other:?} is not supported"),
            )),
        }
    }

    /// Attribute names readable under this view. `posix` is the union of
    /// `basic` plus `permissions`; `owner` adds `owner`/`group` to `basic`.
    fn readable_names(self) -> &'static [&'static str] {
        const BASIC: &[&str] = &[
            "lastModifiedTime",
            "lastAccessTime",
            "creationTime",
            "size",
            "isRegularFile",
            "isDirectory",
            "isSymbolicLink",
            "isOther",
            "fileKey",
        ];
        const OWNER: &[&str] = &[
            "lastModifiedTime",
            "lastAccessTime",
            "creationTime",
            "size",
            "isRegularFile",
            "isDirectory",
            "isSymbolicLink",
            "isOther",
            "fileKey",
            "owner",
        ];
        const POSIX: &[&str] = &[
            "lastModifiedTime",
            "lastAccessTime",
            "creationTime",
            "size",
            "isRegularFile",
            "isDirectory",
            "isSymbolicLink",
            "isOther",
            "fileKey",
            "owner",
            "group",
            "permissions",
        ];
        match self {
            AttributeView::Basic => BASIC,
            AttributeView::Owner => OWNER,
            AttributeView::Posix => POSIX,
        }
    }

    /// Attribute names this view allows `setAttribute` to target.
    /// `lastAccessTime`/`creationTime` are never settable (spec §4.5).
    fn settable_names(self) -> &'static [&'static str] {
        match self {
            AttributeView::Basic => &["lastModifiedTime"],
            AttributeView::Owner => &["lastModifiedTime", "owner"],
            AttributeView::Posix => &["lastModifiedTime", "owner", "group", "permissions"],
        }
    }
}

/// A value in an attribute map: either a scalar or a rendered string, kept
/// loosely typed the way a `Map<String, Object>`-style API would present
/// them to a caller.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    I64(i64),
    U64(u64),
    U32(u32),
    Bool(bool),
    Permissions(u16),
}

/// Project `attrs` into the map of attribute names requested (`*` = all)
/// under `view`.
pub fn read_attributes(
    view: AttributeView,
    attrs: &Attributes,
    names: &[&str],
) -> Result<HashMap<String, AttributeValue>> {
    let wildcard = names.contains(&"*");
    let allowed = view.readable_names();

    let mut out = HashMap::new();
    let wanted: Vec<&str> = if wildcard {
        allowed.to_vec()
    } else {
        for n in names {
            if !allowed.contains(n) {
                return Err(Error::new(
                    ErrorKind::Unsupported,
                    format!("attribute {n:?} is not in view"),
                ));
            }
        }
        names.to_vec()
    };

    for name in wanted {
        let value = match name {
            "lastModifiedTime" => AttributeValue::I64(attrs.mtime),
            "lastAccessTime" => AttributeValue::I64(attrs.atime),
            "creationTime" => AttributeValue::I64(attrs.creation_time()),
            "size" => AttributeValue::U64(attrs.size),
            "isRegularFile" => AttributeValue::Bool(attrs.is_regular_file()),
            "isDirectory" => AttributeValue::Bool(attrs.is_directory()),
            "isSymbolicLink" => AttributeValue::Bool(attrs.is_symbolic_link()),
            "isOther" => AttributeValue::Bool(attrs.is_other()),
            "fileKey" => continue, // always null: omitted from the map
            "owner" => AttributeValue::U32(attrs.uid),
            "group" => AttributeValue::U32(attrs.gid),
            "permissions" => AttributeValue::Permissions(attrs.permissions),
            _ => unreachable!("validated above"),
        };
        out.insert(name.to_string(), value);
    }
    Ok(out)
}

/// One attribute write requested through `setAttribute`.
pub enum AttributeUpdate {
    LastModifiedTime(i64),
    Owner(u32),
    Group(u32),
    Permissions(u16),
}

/// Validate that `name` is settable under `view` and that `raw_value`
/// parses into the right shape, returning the update to apply.
///
/// `lastAccessTime`/`creationTime` always fail with
/// [`ErrorKind::Unsupported`]; owner/group values that don't parse as a
/// non-negative integer fail with [`ErrorKind::InvalidArgument`] (spec
/// scenario S6).
pub fn resolve_attribute_update(
    view: AttributeView,
    name: &str,
    raw_value: &str,
) -> Result<AttributeUpdate> {
    if name == "lastAccessTime" || name == "creationTime" {
        return Err(Error::new(
            ErrorKind::Unsupported,
            format!("{name} is not settable"),
        ));
    }

    if !view.settable_names().contains(&name) {
        return Err(Error::new(
            ErrorKind::Unsupported,
            format!("attribute {name:?} is not settable in this view"),
        ));
    }

    match name {
        "lastModifiedTime" => {
            let secs: i64 = raw_value.parse().map_err(|_| {
                Error::new(ErrorKind::InvalidArgument, "lastModifiedTime must be an integer")
            })?;
            Ok(AttributeUpdate::LastModifiedTime(secs))
        }
        "owner" => parse_non_negative(raw_value).map(AttributeUpdate::Owner),
        "group" => parse_non_negative(raw_value).map(AttributeUpdate::Group),
        "permissions" => {
            let mask: u16 = u16::from_str_radix(raw_value.trim_start_matches("0o"), 8)
                .or_else(|_| raw_value.parse())
                .map_err(|_| {
                    Error::new(ErrorKind::InvalidArgument, "permissions must be a POSIX mode")
                })?;
            Ok(AttributeUpdate::Permissions(mask & 0o777))
        }
        _ => unreachable!("validated above"),
    }
}

fn parse_non_negative(raw: &str) -> Result<u32> {
    raw.parse::<u32>()
        .map_err(|_| Error::new(ErrorKind::InvalidArgument, "expected a non-negative integer UID/GID"))
}
