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

//! A single owned SFTP session (spec §4.4).
//!
//! `SftpChannel` wraps exactly one [`SftpTransport`] and tracks how many
//! live streams are holding a reference to it. The pool only returns a
//! channel to its idle set once that count reaches zero; stream wrappers
//! are the thing that keeps it above zero for as long as they stay open.

use crate::attr::Attributes;
use crate::error::Result;
use crate::transport::{SftpTransport, VfsCapacity};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// A guard that decrements a channel's reference count exactly once, on
/// drop. Stream wrappers hold one of these for their whole lifetime;
/// non-streaming calls construct one and let it fall out of scope
/// immediately.
pub struct RefGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for RefGuard {
    fn drop(&mut self) {
        let prev = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "channel reference count underflowed");
    }
}

/// Cheap to clone: every clone shares the same underlying transport and the
/// same reference count, so the pool's "don't return until every stream
/// closes" bookkeeping stays correct no matter how many handles a caller
/// keeps around (spec §4.4).
#[derive(Clone)]
pub struct SftpChannel {
    transport: Arc<dyn SftpTransport>,
    ref_count: Arc<AtomicUsize>,
    /// The server's reported working directory at connect time, captured
    /// once via `pwd` and reused as the filesystem's default directory.
    cwd: String,
}

impl SftpChannel {
    pub(crate) fn new(transport: Arc<dyn SftpTransport>, cwd: String) -> Self {
        SftpChannel {
            transport,
            ref_count: Arc::new(AtomicUsize::new(0)),
            cwd,
        }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Whether this channel is safe to return to the pool right now.
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    fn acquire_ref(&self) -> RefGuard {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
        RefGuard {
            count: self.ref_count.clone(),
        }
    }

    /// Take out a reference without making any transport call. Used by
    /// callers that need to keep the channel checked out (e.g. a byte
    /// channel staging writes in memory) without opening a stream yet.
    pub fn hold(&self) -> RefGuard {
        self.acquire_ref()
    }

    pub async fn keepalive(&self) -> Result<()> {
        let _guard = self.acquire_ref();
        self.transport.keepalive().await
    }

    pub async fn read_attributes(&self, path: &str, follow_links: bool) -> Result<Attributes> {
        let _guard = self.acquire_ref();
        self.transport.read_attributes(path, follow_links).await
    }

    pub async fn read_symbolic_link(&self, path: &str) -> Result<String> {
        let _guard = self.acquire_ref();
        self.transport.read_symbolic_link(path).await
    }

    pub async fn list_files(&self, path: &str) -> Result<Vec<(String, Attributes)>> {
        let _guard = self.acquire_ref();
        self.transport.list_files(path).await
    }

    pub async fn mkdir(&self, path: &str) -> Result<()> {
        let _guard = self.acquire_ref();
        self.transport.mkdir(path).await
    }

    pub async fn delete(&self, path: &str, is_directory: bool) -> Result<()> {
        let _guard = self.acquire_ref();
        self.transport.delete(path, is_directory).await
    }

    pub async fn rename(&self, source: &str, target: &str) -> Result<()> {
        let _guard = self.acquire_ref();
        self.transport.rename(source, target).await
    }

    pub async fn chown(&self, path: &str, uid: u32) -> Result<()> {
        let _guard = self.acquire_ref();
        self.transport.chown(path, uid).await
    }

    pub async fn chgrp(&self, path: &str, gid: u32) -> Result<()> {
        let _guard = self.acquire_ref();
        self.transport.chgrp(path, gid).await
    }

    pub async fn chmod(&self, path: &str, mask: u16) -> Result<()> {
        let _guard = self.acquire_ref();
        self.transport.chmod(path, mask).await
    }

    pub async fn set_mtime(&self, path: &str, seconds: i64) -> Result<()> {
        let _guard = self.acquire_ref();
        self.transport.set_mtime(path, seconds).await
    }

    pub async fn stat_vfs(&self, path: &str) -> Result<Option<VfsCapacity>> {
        let _guard = self.acquire_ref();
        self.transport.stat_vfs(path).await
    }

    pub async fn store_file(&self, path: &str, data: Bytes) -> Result<()> {
        let _guard = self.acquire_ref();
        self.transport.store_file(path, data).await
    }

    /// Open a read stream. The returned [`RefGuard`] must be held by the
    /// caller's stream wrapper for as long as the stream stays open: this
    /// is the mechanism that keeps the channel out of the pool's idle set
    /// while a stream is live (spec §4.4, §4.5, §9).
    pub async fn open_read(
        &self,
        path: &str,
    ) -> Result<(Box<dyn AsyncRead + Send + Unpin + 'static>, RefGuard)> {
        let guard = self.acquire_ref();
        match self.transport.open_read(path).await {
            Ok(reader) => Ok((reader, guard)),
            Err(e) => {
                drop(guard);
                Err(e)
            }
        }
    }

    pub async fn open_write(
        &self,
        path: &str,
        append: bool,
    ) -> Result<(Box<dyn AsyncWrite + Send + Unpin + 'static>, RefGuard)> {
        let guard = self.acquire_ref();
        match self.transport.open_write(path, append).await {
            Ok(writer) => Ok((writer, guard)),
            Err(e) => {
                drop(guard);
                Err(e)
            }
        }
    }

    pub fn disconnect(&self) {
        self.transport.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeTransport;

    #[tokio::test]
    async fn non_stream_calls_leave_ref_count_at_zero() {
        let transport = Arc::new(FakeTransport::new());
        let channel = SftpChannel::new(transport, "/".to_string());
        channel.mkdir("/a").await.unwrap();
        assert_eq!(channel.ref_count(), 0);
    }

    #[tokio::test]
    async fn open_read_holds_ref_count_until_guard_drops() {
        let transport = Arc::new(FakeTransport::new());
        transport.put_file("/f", b"hello");
        let channel = SftpChannel::new(transport, "/".to_string());
        let (_reader, guard) = channel.open_read("/f").await.unwrap();
        assert_eq!(channel.ref_count(), 1);
        drop(guard);
        assert_eq!(channel.ref_count(), 0);
    }

    #[tokio::test]
    async fn failed_open_does_not_leak_ref_count() {
        let transport = Arc::new(FakeTransport::new());
        let channel = SftpChannel::new(transport, "/".to_string());
        let err = channel.open_read("/missing").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
        assert_eq!(channel.ref_count(), 0);
    }
}
