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

//! The file store view of a mounted filesystem (spec §4.7): a thin,
//! read-only-feeling summary object the way `java.nio.file.FileStore` sits
//! next to a `FileSystem`, here reduced to exactly what spec.md asks for.

use crate::attr::AttributeView;
use crate::error::Result;
use crate::filesystem::Filesystem;
use crate::pool::ChannelFactory;

/// One per [`Filesystem`]. Every space query simply forwards to the
/// filesystem it was built from; this type carries no state of its own
/// beyond the display name.
pub struct FileStore<'a, F: ChannelFactory> {
    filesystem: &'a Filesystem<F>,
    name: String,
}

impl<'a, F: ChannelFactory> FileStore<'a, F> {
    pub(crate) fn new(filesystem: &'a Filesystem<F>, name: String) -> Self {
        FileStore { filesystem, name }
    }

    /// The root URI this filesystem was opened from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &'static str {
        "sftp"
    }

    pub fn is_read_only(&self) -> bool {
        false
    }

    pub fn supports_view(&self, view: AttributeView) -> bool {
        matches!(
            view,
            AttributeView::Basic | AttributeView::Owner | AttributeView::Posix
        )
    }

    /// `FileStoreAttributeView` has no SFTP-backed equivalent; every lookup
    /// by class is unsupported rather than an error (spec §4.7: "returns
    /// null").
    pub fn attribute_view(&self, _class: &str) -> Option<()> {
        None
    }

    pub async fn total_space(&self) -> Result<u64> {
        self.filesystem.total_space(&crate::path::Path::root()).await
    }

    pub async fn usable_space(&self) -> Result<u64> {
        self.filesystem.usable_space(&crate::path::Path::root()).await
    }

    pub async fn unallocated_space(&self) -> Result<u64> {
        self.filesystem
            .unallocated_space(&crate::path::Path::root())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::ChannelPool;
    use crate::testutil::SharedFakeFactory;
    use std::time::Duration;

    async fn fs() -> Filesystem<SharedFakeFactory> {
        let pool = ChannelPool::new(
            PoolConfig {
                initial_size: 0,
                max_size: 1,
                max_wait_time: Some(Duration::from_millis(500)),
                max_idle_time: None,
            },
            SharedFakeFactory::new(),
        )
        .await
        .unwrap();
        Filesystem::new(pool, "sftp://test/".to_string(), crate::path::Path::root())
    }

    #[tokio::test]
    async fn reports_sftp_kind_and_writable() {
        let filesystem = fs().await;
        let store = FileStore::new(&filesystem, "sftp://example.com/".to_string());
        assert_eq!(store.kind(), "sftp");
        assert!(!store.is_read_only());
        assert_eq!(store.name(), "sftp://example.com/");
    }

    #[tokio::test]
    async fn supports_exactly_the_three_named_views() {
        let filesystem = fs().await;
        let store = FileStore::new(&filesystem, "sftp://example.com/".to_string());
        assert!(store.supports_view(AttributeView::Basic));
        assert!(store.supports_view(AttributeView::Owner));
        assert!(store.supports_view(AttributeView::Posix));
    }

    #[tokio::test]
    async fn attribute_view_lookup_is_always_none() {
        let filesystem = fs().await;
        let store = FileStore::new(&filesystem, "sftp://example.com/".to_string());
        assert!(store.attribute_view("posix").is_none());
    }

    #[tokio::test]
    async fn space_queries_forward_to_the_filesystem() {
        let filesystem = fs().await;
        let store = FileStore::new(&filesystem, "sftp://example.com/".to_string());
        // The fake transport always answers statvfs with finite numbers.
        assert!(store.total_space().await.unwrap() > 0);
        assert!(store.usable_space().await.unwrap() > 0);
        assert!(store.unallocated_space().await.unwrap() > 0);
    }
}
