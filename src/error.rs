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

//! Errors returned by this crate.
//!
//! Shaped after `opendal`'s own `Error`/`ErrorKind`: a small struct carrying
//! a typed kind, a human message, the operation that raised it and a
//! context trail, rather than one variant per failure site.

use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The taxonomy of failures a filesystem operation can surface.
///
/// This maps 1:1 onto spec §7: every SFTP status code and every local
/// validation failure is reshaped into one of these before it reaches a
/// caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The server reported "no such file".
    NotFound,
    /// The server reported "permission denied".
    AccessDenied,
    /// A create-new collided with an existing path, or an optimistic
    /// existence check after a failed `mkdir` found the path now exists.
    AlreadyExists,
    /// `listFiles`/`newDirectoryStream` was asked to list a non-directory.
    NotDirectory,
    /// `delete`/`rmdir` was asked to remove a non-empty directory, or a
    /// move targeted the filesystem root.
    DirectoryNotEmpty,
    /// A byte stream was opened against a directory.
    IsDirectory,
    /// `readSymbolicLink` was asked to resolve something that isn't a link.
    NotLink,
    /// The server or this adapter does not support the requested feature.
    Unsupported,
    /// Pool acquisition exceeded `maxWaitTime`.
    TimedOut,
    /// The calling thread/task was cancelled while waiting on the pool.
    Interrupted,
    /// A caller-supplied value failed validation (conflicting open
    /// options, a non-numeric owner/group, an unparseable query value).
    InvalidArgument,
    /// The operation targeted a closed filesystem or an already-closed
    /// stream/channel.
    Closed,
    /// Everything else: transport failure, malformed server reply.
    Io,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AccessDenied => "AccessDenied",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::NotDirectory => "NotDirectory",
            ErrorKind::DirectoryNotEmpty => "DirectoryNotEmpty",
            ErrorKind::IsDirectory => "IsDirectory",
            ErrorKind::NotLink => "NotLink",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::TimedOut => "TimedOut",
            ErrorKind::Interrupted => "Interrupted",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::Closed => "Closed",
            ErrorKind::Io => "Io",
        };
        write!(f, "{s}")
    }
}

/// A path (or pair of paths, for copy/move) named by an [`Error`].
#[derive(Clone, Debug, Default)]
struct Paths {
    source: Option<String>,
    target: Option<String>,
}

pub struct Error {
    kind: ErrorKind,
    message: String,
    operation: &'static str,
    paths: Paths,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation: "",
            paths: Paths::default(),
            context: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Tag this error with the operation that raised it (e.g. `"newInputStream"`).
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    /// Name the single path this error concerns.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.paths.source = Some(path.into());
        self
    }

    /// Name both paths for a two-path operation (copy/move).
    pub fn with_paths(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.paths.source = Some(source.into());
        self.paths.target = Some(target.into());
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    pub fn with_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        self.source = Some(src.into());
        self
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }
        if let Some(source) = &self.paths.source {
            write!(f, " [{source}")?;
            if let Some(target) = &self.paths.target {
                write!(f, " -> {target}")?;
            }
            write!(f, "]")?;
        }
        write!(f, ": {}", self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)?;
        if let Some(source) = &self.source {
            write!(f, "\ncaused by: {source:?}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let io_kind = match err.kind {
            ErrorKind::NotFound => std::io::ErrorKind::NotFound,
            ErrorKind::AccessDenied => std::io::ErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists => std::io::ErrorKind::AlreadyExists,
            ErrorKind::TimedOut => std::io::ErrorKind::TimedOut,
            ErrorKind::Interrupted => std::io::ErrorKind::Interrupted,
            ErrorKind::InvalidArgument => std::io::ErrorKind::InvalidInput,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(io_kind, err)
    }
}

/// Build an [`Error`] from a std::io error raised by the transport layer.
/// Anything not otherwise classified lands in [`ErrorKind::Io`].
pub fn from_io_error(operation: &'static str, path: &str, err: std::io::Error) -> Error {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => ErrorKind::AccessDenied,
        std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
        std::io::ErrorKind::TimedOut => ErrorKind::TimedOut,
        std::io::ErrorKind::Interrupted => ErrorKind::Interrupted,
        _ => ErrorKind::Io,
    };
    Error::new(kind, err.to_string())
        .with_operation(operation)
        .with_path(path)
        .with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_operation_and_path() {
        let err = Error::new(ErrorKind::NotFound, "no such file")
            .with_operation("newInputStream")
            .with_path("/tmp/missing");
        let rendered = format!("{err}");
        assert!(rendered.contains("NotFound"));
        assert!(rendered.contains("newInputStream"));
        assert!(rendered.contains("/tmp/missing"));
    }

    #[test]
    fn display_includes_both_paths_for_copy() {
        let err = Error::new(ErrorKind::AlreadyExists, "target exists")
            .with_operation("copy")
            .with_paths("/a", "/b");
        let rendered = format!("{err}");
        assert!(rendered.contains("/a"));
        assert!(rendered.contains("/b"));
    }

    #[test]
    fn io_error_kind_roundtrips_common_cases() {
        let err = Error::new(ErrorKind::TimedOut, "pool exhausted");
        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::TimedOut);
    }
}
