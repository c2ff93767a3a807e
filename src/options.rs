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

//! Open-option and copy-option resolvers (spec §4.2).
//!
//! Callers hand in a set of caller-facing flags; the resolver validates the
//! combination and projects it down to the small normalized shape the
//! filesystem coordinator actually branches on.

use crate::error::{Error, ErrorKind, Result};
use std::collections::HashSet;

/// A caller-facing open option, as it would be passed to `open`/`create`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenOption {
    Read,
    Write,
    Append,
    TruncateExisting,
    Create,
    CreateNew,
    DeleteOnClose,
    Sparse,
    Sync,
    Dsync,
    NoFollowLinks,
}

const IGNORABLE: [OpenOption; 4] = [
    OpenOption::Sparse,
    OpenOption::Sync,
    OpenOption::Dsync,
    OpenOption::NoFollowLinks,
];

/// The normalized shape the filesystem coordinator consumes. Exactly one of
/// `read`/`write` is true per stream; `append` implies `write`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub create_new: bool,
    pub delete_on_close: bool,
    /// The options as supplied by the caller, kept for error reporting.
    original: HashSet<OpenOption>,
}

impl OpenOptions {
    fn base(original: HashSet<OpenOption>) -> Self {
        OpenOptions {
            read: false,
            write: false,
            append: false,
            create: false,
            create_new: false,
            delete_on_close: false,
            original,
        }
    }

    pub fn original(&self) -> &HashSet<OpenOption> {
        &self.original
    }

    fn reject_unknown(opts: &HashSet<OpenOption>, allowed: &[OpenOption]) -> Result<()> {
        for opt in opts {
            if IGNORABLE.contains(opt) {
                continue;
            }
            if !allowed.contains(opt) {
                return Err(Error::new(
                    ErrorKind::Unsupported,
                    format!("open option {opt:?} is not supported here"),
                ));
            }
        }
        Ok(())
    }

    /// Resolve options for a read-only input stream.
    pub fn for_input(opts: impl IntoIterator<Item = OpenOption>) -> Result<OpenOptions> {
        let set: HashSet<OpenOption> = opts.into_iter().collect();
        Self::reject_unknown(
            &set,
            &[OpenOption::Read, OpenOption::DeleteOnClose],
        )?;

        let mut resolved = Self::base(set.clone());
        resolved.read = true;
        resolved.delete_on_close = set.contains(&OpenOption::DeleteOnClose);
        Ok(resolved)
    }

    /// Resolve options for a write-only output stream. An empty option set
    /// defaults to `{CREATE, TRUNCATE_EXISTING, WRITE}`.
    pub fn for_output(opts: impl IntoIterator<Item = OpenOption>) -> Result<OpenOptions> {
        let mut set: HashSet<OpenOption> = opts.into_iter().collect();
        Self::reject_unknown(
            &set,
            &[
                OpenOption::Write,
                OpenOption::Append,
                OpenOption::TruncateExisting,
                OpenOption::Create,
                OpenOption::CreateNew,
                OpenOption::DeleteOnClose,
            ],
        )?;

        if set.is_empty() {
            set.insert(OpenOption::Create);
            set.insert(OpenOption::TruncateExisting);
            set.insert(OpenOption::Write);
        }

        if set.contains(&OpenOption::Append) && set.contains(&OpenOption::TruncateExisting) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "APPEND is incompatible with TRUNCATE_EXISTING",
            ));
        }

        let mut resolved = Self::base(set.clone());
        resolved.write = true;
        resolved.append = set.contains(&OpenOption::Append);
        resolved.create = set.contains(&OpenOption::Create) || set.contains(&OpenOption::CreateNew);
        resolved.create_new = set.contains(&OpenOption::CreateNew);
        resolved.delete_on_close = set.contains(&OpenOption::DeleteOnClose);
        Ok(resolved)
    }

    /// Resolve options for a seekable byte channel: the union of input and
    /// output semantics, with `READ`+`WRITE` rejected (the underlying SFTP
    /// channel does not support a bidirectional stream) and a default of
    /// `READ` when no mode is specified.
    pub fn for_byte_channel(opts: impl IntoIterator<Item = OpenOption>) -> Result<OpenOptions> {
        let mut set: HashSet<OpenOption> = opts.into_iter().collect();
        Self::reject_unknown(
            &set,
            &[
                OpenOption::Read,
                OpenOption::Write,
                OpenOption::Append,
                OpenOption::TruncateExisting,
                OpenOption::Create,
                OpenOption::CreateNew,
                OpenOption::DeleteOnClose,
            ],
        )?;

        if set.contains(&OpenOption::Read) && set.contains(&OpenOption::Write) {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "concurrent read+write byte channels are not supported",
            ));
        }

        if set.contains(&OpenOption::Append)
            && (set.contains(&OpenOption::Read) || set.contains(&OpenOption::TruncateExisting))
        {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "APPEND is incompatible with READ/TRUNCATE_EXISTING",
            ));
        }

        if !set.contains(&OpenOption::Read)
            && !set.contains(&OpenOption::Write)
            && !set.contains(&OpenOption::Append)
        {
            set.insert(OpenOption::Read);
        }

        let mut resolved = Self::base(set.clone());
        if set.contains(&OpenOption::Read) {
            resolved.read = true;
        } else {
            resolved.write = true;
            resolved.append = set.contains(&OpenOption::Append);
            resolved.create =
                set.contains(&OpenOption::Create) || set.contains(&OpenOption::CreateNew);
            resolved.create_new = set.contains(&OpenOption::CreateNew);
        }
        resolved.delete_on_close = set.contains(&OpenOption::DeleteOnClose);
        Ok(resolved)
    }
}

/// A caller-facing copy option.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CopyOption {
    ReplaceExisting,
    AtomicMove,
    NoFollowLinks,
    CopyAttributes,
}

/// The normalized copy/move option shape.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CopyOptions {
    pub replace_existing: bool,
    pub atomic_move: bool,
}

impl CopyOptions {
    pub fn resolve(opts: impl IntoIterator<Item = CopyOption>) -> Result<CopyOptions> {
        let set: HashSet<CopyOption> = opts.into_iter().collect();

        if set.contains(&CopyOption::CopyAttributes) {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "COPY_ATTRIBUTES is not supported",
            ));
        }

        Ok(CopyOptions {
            replace_existing: set.contains(&CopyOption::ReplaceExisting),
            atomic_move: set.contains(&CopyOption::AtomicMove),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_input_accepts_read_and_delete_on_close() {
        let resolved =
            OpenOptions::for_input([OpenOption::Read, OpenOption::DeleteOnClose]).unwrap();
        assert!(resolved.read);
        assert!(!resolved.write);
        assert!(resolved.delete_on_close);
    }

    #[test]
    fn for_input_rejects_write() {
        let err = OpenOptions::for_input([OpenOption::Write]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn for_input_ignores_sparse_sync() {
        let resolved =
            OpenOptions::for_input([OpenOption::Read, OpenOption::Sync, OpenOption::Sparse])
                .unwrap();
        assert!(resolved.read);
    }

    #[test]
    fn for_output_defaults_to_create_truncate_write() {
        let resolved = OpenOptions::for_output([]).unwrap();
        assert!(resolved.write);
        assert!(resolved.create);
        assert!(!resolved.append);
    }

    #[test]
    fn for_output_rejects_append_with_truncate() {
        let err = OpenOptions::for_output([OpenOption::Append, OpenOption::TruncateExisting])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn for_output_create_new_implies_create() {
        let resolved =
            OpenOptions::for_output([OpenOption::CreateNew, OpenOption::Write]).unwrap();
        assert!(resolved.create);
        assert!(resolved.create_new);
    }

    #[test]
    fn for_byte_channel_defaults_to_read() {
        let resolved = OpenOptions::for_byte_channel([]).unwrap();
        assert!(resolved.read);
    }

    #[test]
    fn for_byte_channel_rejects_read_write() {
        let err =
            OpenOptions::for_byte_channel([OpenOption::Read, OpenOption::Write]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn for_byte_channel_rejects_append_with_read() {
        let err =
            OpenOptions::for_byte_channel([OpenOption::Append, OpenOption::Read]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn copy_options_rejects_copy_attributes() {
        let err = CopyOptions::resolve([CopyOption::CopyAttributes]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn copy_options_ignores_atomic_move_and_nofollow() {
        let resolved = CopyOptions::resolve([
            CopyOption::ReplaceExisting,
            CopyOption::AtomicMove,
            CopyOption::NoFollowLinks,
        ])
        .unwrap();
        assert!(resolved.replace_existing);
        assert!(resolved.atomic_move);
    }
}
