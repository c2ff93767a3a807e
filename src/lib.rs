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

//! A POSIX-like virtual filesystem facade over pooled SFTP sessions.
//!
//! This crate turns one SSH endpoint into something that looks like a
//! local filesystem: paths resolve against a default directory, streams
//! are ordinary `AsyncRead`/`AsyncWrite` handles, and the cost of SFTP's
//! one-session-one-request-at-a-time restriction is hidden behind a
//! bounded pool of channels (see [`pool`]).
//!
//! The moving pieces, roughly bottom-up:
//!
//! - [`path`] — the path algebra (parsing, resolution, normalization).
//! - [`options`]/[`attr`] — open/copy option resolvers and attribute views.
//! - [`error`] — the `Error`/`ErrorKind`/`Result` taxonomy every operation
//!   in this crate funnels into.
//! - [`transport`]/[`ssh`] — the raw SFTP primitives, real ([`ssh`]) or
//!   fake ([`testutil`], behind `test-util`).
//! - [`channel`] — one SFTP session, reference-counted against the
//!   streams currently using it.
//! - [`pool`] — the bounded multiset of channels spec.md §4.3 describes.
//! - [`stream`] — `AsyncRead`/`AsyncWrite`/seekable stream wrappers built
//!   on top of a channel.
//! - [`filesystem`] — the coordinator tying paths, options and channels
//!   together into filesystem-level operations.
//! - [`filestore`] — the small read-only summary view of a filesystem.
//! - [`config`]/[`uri`] — the configuration surface and `sftp://` URI
//!   parsing.
//! - [`registry`] — the process-wide table of live filesystems, keyed by
//!   connection identity.

pub mod attr;
pub mod channel;
pub mod config;
pub mod error;
pub mod filestore;
pub mod filesystem;
pub mod options;
pub mod path;
pub mod pool;
pub mod registry;
pub mod ssh;
pub mod stream;
#[cfg(any(test, feature = "test-util"))]
pub mod testutil;
pub mod transport;
pub mod uri;

pub use attr::{AttributeUpdate, AttributeValue, AttributeView, Attributes, DirEntry, FileType};
pub use config::{Configuration, FilesystemBuilder, PoolConfig, SshConnectConfig};
pub use error::{Error, ErrorKind, Result};
pub use filestore::FileStore;
pub use filesystem::{copy_across, move_across, AccessMode, Filesystem};
pub use options::{CopyOption, CopyOptions, OpenOption, OpenOptions};
pub use path::Path;
pub use pool::{ChannelFactory, ChannelPool, Lease, SshChannelFactory};
pub use registry::{Identity, Registry};
pub use stream::{ByteChannel, SftpInputStream, SftpOutputStream};
pub use uri::SftpUri;
