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

//! An in-memory [`SftpTransport`] fake, gated behind the `test-util`
//! feature (always on for `#[cfg(test)]` builds of this crate).
//!
//! Mirrors the role `opendal`'s `tests` Cargo feature plays for its own
//! backends: test-only scaffolding that never ships in a normal build, used
//! to drive the property tests spec §8 describes (channel cap, timeout,
//! no-leak-on-stream, deadlock freedom) without a live SFTP server.

use crate::attr::{Attributes, FileType};
use crate::error::{Error, ErrorKind, Result};
use crate::transport::{SftpTransport, VfsCapacity};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
    Symlink(String),
}

/// Per-path attribute overrides applied on top of a node's defaults,
/// written by `chown`/`chgrp`/`chmod`/`set_mtime` so the fake transport
/// round-trips attribute writes the way a real server would (spec §8
/// property 9, scenario S6).
#[derive(Clone, Copy, Default)]
struct AttrOverride {
    uid: Option<u32>,
    gid: Option<u32>,
    permissions: Option<u16>,
    mtime: Option<i64>,
}

struct Inner {
    nodes: BTreeMap<String, Node>,
    overrides: BTreeMap<String, AttrOverride>,
    connected: AtomicBool,
    /// How many transports a shared [`FakeFactory`] has ever handed out;
    /// used by the pool property tests to assert the channel cap holds.
    connect_count: Arc<AtomicU64>,
    fail_keepalive: AtomicBool,
}

/// An in-memory stand-in for a real SFTP session.
pub struct FakeTransport {
    inner: Arc<Mutex<Inner>>,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_connect_counter(Arc::new(AtomicU64::new(0)))
    }

    pub fn with_connect_counter(counter: Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        FakeTransport {
            inner: Arc::new(Mutex::new(Inner {
                nodes,
                overrides: BTreeMap::new(),
                connected: AtomicBool::new(true),
                connect_count: counter,
                fail_keepalive: AtomicBool::new(false),
            })),
        }
    }

    pub fn put_file(&self, path: &str, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.insert(path.to_string(), Node::File(data.to_vec()));
    }

    pub fn put_dir(&self, path: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.insert(path.to_string(), Node::Dir);
    }

    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        match inner.nodes.get(path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn connect_count(&self) -> u64 {
        self.inner.lock().unwrap().connect_count.load(Ordering::SeqCst)
    }

    pub fn set_fail_keepalive(&self, fail: bool) {
        self.inner.lock().unwrap().fail_keepalive.store(fail, Ordering::SeqCst);
    }

    fn attrs_for(node: &Node, overrides: Option<&AttrOverride>) -> Attributes {
        let kind = match node {
            Node::File(_) => FileType::Regular,
            Node::Dir => FileType::Directory,
            Node::Symlink(_) => FileType::Symlink,
        };
        let size = match node {
            Node::File(data) => data.len() as u64,
            _ => 0,
        };
        let overrides = overrides.copied().unwrap_or_default();
        Attributes {
            size,
            mtime: overrides.mtime.unwrap_or_else(now),
            atime: now(),
            permissions: overrides.permissions.unwrap_or(0o644),
            uid: overrides.uid.unwrap_or(1000),
            gid: overrides.gid.unwrap_or(1000),
            kind,
        }
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`crate::pool::ChannelFactory`] that hands out channels sharing one
/// [`FakeTransport`], so every lease a pool/filesystem test acquires sees
/// the same virtual tree.
pub struct SharedFakeFactory {
    transport: Arc<FakeTransport>,
    connect_count: Arc<AtomicU64>,
}

impl SharedFakeFactory {
    pub fn new() -> Self {
        SharedFakeFactory {
            transport: Arc::new(FakeTransport::new()),
            connect_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn transport(&self) -> &FakeTransport {
        &self.transport
    }

    /// How many times the pool has actually called `connect()` — distinct
    /// from the single shared virtual filesystem, which is created once.
    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::SeqCst)
    }
}

impl Default for SharedFakeFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::pool::ChannelFactory for SharedFakeFactory {
    async fn connect(&self) -> Result<crate::channel::SftpChannel> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(crate::channel::SftpChannel::new(self.transport.clone(), "/".to_string()))
    }
}

struct MemReader {
    data: Bytes,
    pos: usize,
}

impl AsyncRead for MemReader {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let remaining = &this.data[this.pos..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        this.pos += n;
        std::task::Poll::Ready(Ok(()))
    }
}

struct MemWriter {
    target: Arc<Mutex<Inner>>,
    path: String,
    buf: BytesMut,
}

impl AsyncWrite for MemWriter {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        data: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        this.buf.extend_from_slice(data);
        std::task::Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let mut inner = this.target.lock().unwrap();
        inner
            .nodes
            .insert(this.path.clone(), Node::File(this.buf.to_vec()));
        std::task::Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl SftpTransport for FakeTransport {
    async fn pwd(&self) -> Result<String> {
        Ok("/".to_string())
    }

    async fn read_attributes(&self, path: &str, _follow_links: bool) -> Result<Attributes> {
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .get(path)
            .map(|node| Self::attrs_for(node, inner.overrides.get(path)))
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("no such file: {path}")))
    }

    async fn read_symbolic_link(&self, path: &str) -> Result<String> {
        let inner = self.inner.lock().unwrap();
        match inner.nodes.get(path) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(Error::new(ErrorKind::NotLink, "not a symbolic link")),
            None => Err(Error::new(ErrorKind::NotFound, "no such file")),
        }
    }

    async fn list_files(&self, path: &str) -> Result<Vec<(String, Attributes)>> {
        let inner = self.inner.lock().unwrap();
        if !matches!(inner.nodes.get(path), Some(Node::Dir)) {
            return Err(Error::new(ErrorKind::NotFound, "no such directory"));
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let mut out = vec![
            (".".to_string(), Self::attrs_for(&Node::Dir, None)),
            ("..".to_string(), Self::attrs_for(&Node::Dir, None)),
        ];
        for (candidate, node) in inner.nodes.iter() {
            if candidate == path {
                continue;
            }
            if let Some(rest) = candidate.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    out.push((rest.to_string(), Self::attrs_for(node, inner.overrides.get(candidate))));
                }
            }
        }
        Ok(out)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.nodes.contains_key(path) {
            return Err(Error::new(ErrorKind::AlreadyExists, "path already exists"));
        }
        inner.nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    async fn delete(&self, path: &str, is_directory: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.nodes.get(path) {
            None => return Err(Error::new(ErrorKind::NotFound, "no such file")),
            Some(Node::Dir) if !is_directory => {
                return Err(Error::new(ErrorKind::IsDirectory, "is a directory"))
            }
            Some(_) if is_directory => {
                return Err(Error::new(ErrorKind::Io, "not a directory"))
            }
            _ => {}
        }
        if is_directory {
            let prefix = format!("{path}/");
            if inner.nodes.keys().any(|k| k.starts_with(&prefix)) {
                return Err(Error::new(
                    ErrorKind::DirectoryNotEmpty,
                    "directory not empty",
                ));
            }
        }
        inner.nodes.remove(path);
        inner.overrides.remove(path);
        Ok(())
    }

    async fn rename(&self, source: &str, target: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let node = inner
            .nodes
            .get(source)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such file"))?;
        inner.nodes.remove(source);
        inner.nodes.insert(target.to_string(), node);
        if let Some(ov) = inner.overrides.remove(source) {
            inner.overrides.insert(target.to_string(), ov);
        }
        Ok(())
    }

    async fn open_read(
        &self,
        path: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin + 'static>> {
        let inner = self.inner.lock().unwrap();
        match inner.nodes.get(path) {
            Some(Node::File(data)) => Ok(Box::new(MemReader {
                data: Bytes::from(data.clone()),
                pos: 0,
            })),
            Some(Node::Dir) => Err(Error::new(ErrorKind::IsDirectory, "is a directory")),
            _ => Err(Error::new(ErrorKind::NotFound, "no such file")),
        }
    }

    async fn open_write(
        &self,
        path: &str,
        append: bool,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin + 'static>> {
        let existing = {
            let inner = self.inner.lock().unwrap();
            match inner.nodes.get(path) {
                Some(Node::Dir) => return Err(Error::new(ErrorKind::IsDirectory, "is a directory")),
                Some(Node::File(data)) if append => data.clone(),
                _ => Vec::new(),
            }
        };
        Ok(Box::new(MemWriter {
            target: self.inner.clone(),
            path: path.to_string(),
            buf: BytesMut::from(existing.as_slice()),
        }))
    }

    async fn store_file(&self, path: &str, data: Bytes) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.insert(path.to_string(), Node::File(data.to_vec()));
        Ok(())
    }

    async fn chown(&self, path: &str, uid: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.nodes.contains_key(path) {
            return Err(Error::new(ErrorKind::NotFound, "no such file"));
        }
        inner.overrides.entry(path.to_string()).or_default().uid = Some(uid);
        Ok(())
    }

    async fn chgrp(&self, path: &str, gid: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.nodes.contains_key(path) {
            return Err(Error::new(ErrorKind::NotFound, "no such file"));
        }
        inner.overrides.entry(path.to_string()).or_default().gid = Some(gid);
        Ok(())
    }

    async fn chmod(&self, path: &str, mask: u16) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.nodes.contains_key(path) {
            return Err(Error::new(ErrorKind::NotFound, "no such file"));
        }
        inner.overrides.entry(path.to_string()).or_default().permissions = Some(mask);
        Ok(())
    }

    async fn set_mtime(&self, path: &str, seconds: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.nodes.contains_key(path) {
            return Err(Error::new(ErrorKind::NotFound, "no such file"));
        }
        inner.overrides.entry(path.to_string()).or_default().mtime = Some(seconds);
        Ok(())
    }

    async fn stat_vfs(&self, _path: &str) -> Result<Option<VfsCapacity>> {
        Ok(Some(VfsCapacity {
            fragment_size: 4096,
            block_count: 1_000_000,
            free_block_count: 500_000,
            available_block_count: 500_000,
        }))
    }

    async fn keepalive(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_keepalive.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Io, "keepalive failed"));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        self.inner.lock().unwrap().connected.store(false, Ordering::SeqCst);
    }
}
