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

//! The seam between a [`crate::channel::SftpChannel`] and whatever actually
//! speaks the SFTP wire protocol.
//!
//! Real sessions are backed by [`crate::ssh::OpensshTransport`]
//! (`openssh` + `openssh-sftp-client`, the same pairing
//! `core/src/services/sftp/backend.rs` uses). Tests substitute
//! [`crate::testutil::FakeTransport`], an in-memory virtual tree, so the
//! pool and filesystem coordinator can be exercised deterministically
//! without a live server — this is the "instrumented factory" spec §8
//! calls for in its property tests.

use crate::attr::Attributes;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

/// Capacity numbers as reported by the SFTP `statvfs` extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VfsCapacity {
    pub fragment_size: u64,
    pub block_count: u64,
    pub free_block_count: u64,
    pub available_block_count: u64,
}

/// One primitive call per row of spec §4.4's table, plus the keep-alive
/// probe and a disconnect hook the pool uses for eviction.
#[async_trait]
pub trait SftpTransport: Send + Sync + 'static {
    async fn pwd(&self) -> Result<String>;

    async fn read_attributes(&self, path: &str, follow_links: bool) -> Result<Attributes>;

    async fn read_symbolic_link(&self, path: &str) -> Result<String>;

    async fn list_files(&self, path: &str) -> Result<Vec<(String, Attributes)>>;

    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn delete(&self, path: &str, is_directory: bool) -> Result<()>;

    async fn rename(&self, source: &str, target: &str) -> Result<()>;

    async fn open_read(
        &self,
        path: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin + 'static>>;

    async fn open_write(
        &self,
        path: &str,
        append: bool,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin + 'static>>;

    /// Upload `data` to `path` in a single request, used by the
    /// copy-through-memory fallback (spec §4.3, §9).
    async fn store_file(&self, path: &str, data: Bytes) -> Result<()>;

    async fn chown(&self, path: &str, uid: u32) -> Result<()>;

    async fn chgrp(&self, path: &str, gid: u32) -> Result<()>;

    async fn chmod(&self, path: &str, mask: u16) -> Result<()>;

    async fn set_mtime(&self, path: &str, seconds: i64) -> Result<()>;

    /// `Ok(None)` when the server does not advertise the `statvfs`
    /// extension; callers map that to the "unknown large" sentinel.
    async fn stat_vfs(&self, path: &str) -> Result<Option<VfsCapacity>>;

    /// Send an SSH-level keep-alive. `Ok(())` means the session is still
    /// alive; an error means it should be discarded and replaced.
    async fn keepalive(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Tear down the underlying transport. Idempotent.
    fn disconnect(&self);
}
