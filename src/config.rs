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

//! The configuration surface described in spec §6, plus the pool defaults
//! of spec §4.3/§6.
//!
//! `Configuration` is shaped like `opendal`'s per-backend config structs
//! (see `services/dropbox/builder.rs`'s `DropboxConfig`), with a
//! hand-written `Debug` impl that never prints the password. Unlike those
//! structs it is built field-by-field (`SftpBuilder::from_map`'s style,
//! not a `serde::Deserialize` derive) because several fields are
//! `Duration`s parsed from ISO-8601 query values, which `serde` has no
//! blanket support for.

use crate::error::Result;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// The subset of [`Configuration`] the transport layer actually needs to
/// open a session.
#[derive(Clone)]
pub struct SshConnectConfig {
    pub endpoint: String,
    pub user: String,
    /// Carried through for parity with [`Configuration::password`]; the
    /// transport has no way to act on it (see DESIGN.md).
    pub password: Option<String>,
    pub identity_file: Option<String>,
    pub known_hosts_strategy: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub host_key_alias: Option<String>,
    pub client_version: Option<String>,
    pub server_alive_interval: Option<Duration>,
    pub server_alive_count_max: Option<u32>,
    pub agent_forwarding: bool,
    pub filename_encoding: Option<String>,
    pub ssh_config: HashMap<String, String>,
}

/// Pool sizing and timeout knobs (spec §3, §4.3). Defaults match spec §6:
/// `initialSize=1, maxSize=5, maxWaitTime=∞, maxIdleTime=∞`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub initial_size: u32,
    pub max_size: u32,
    /// `None` means wait forever.
    pub max_wait_time: Option<Duration>,
    /// `None` means never evict for idleness.
    pub max_idle_time: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            initial_size: 1,
            max_size: 5,
            max_wait_time: None,
            max_idle_time: None,
        }
    }
}

/// The full programmatic configuration surface (spec §6).
#[derive(Clone)]
pub struct Configuration {
    pub endpoint: String,
    pub user: String,
    /// Accepted and stored for surface parity with spec §6, but the real
    /// transport (`openssh::SessionBuilder`, wrapping the `ssh` binary) has
    /// no non-interactive password-auth mode to wire it into; connecting
    /// with only a password set logs a warning and falls back to
    /// key/agent/known-hosts auth (see DESIGN.md).
    pub password: Option<String>,
    pub identity_file: Option<String>,
    pub known_hosts_strategy: Option<String>,
    pub connect_timeout: Option<Duration>,
    /// Accepted for parity with spec §6's configuration surface; the real
    /// transport has no socket-level read timeout distinct from
    /// `connect_timeout`/`server_alive_interval`, so this is stored but not
    /// applied to the SSH session (see DESIGN.md).
    pub timeout: Option<Duration>,
    /// Accepted for parity with spec §6; OpenSSH's client always reports its
    /// own protocol version string and exposes no knob to override it, so
    /// this has no effect on the real transport (see DESIGN.md).
    pub client_version: Option<String>,
    pub host_key_alias: Option<String>,
    pub server_alive_interval: Option<Duration>,
    pub server_alive_count_max: Option<u32>,
    pub agent_forwarding: bool,
    pub filename_encoding: Option<String>,
    pub default_directory: Option<String>,
    pub pool: PoolConfig,
    pub ssh_config: HashMap<String, String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            endpoint: String::new(),
            user: String::new(),
            password: None,
            identity_file: None,
            known_hosts_strategy: None,
            connect_timeout: None,
            timeout: None,
            client_version: None,
            host_key_alias: None,
            server_alive_interval: None,
            server_alive_count_max: None,
            agent_forwarding: false,
            filename_encoding: None,
            default_directory: None,
            pool: PoolConfig::default(),
            ssh_config: HashMap::new(),
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("identity_file", &self.identity_file)
            .field("default_directory", &self.default_directory)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    pub fn to_connect_config(&self) -> SshConnectConfig {
        SshConnectConfig {
            endpoint: self.endpoint.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            identity_file: self.identity_file.clone(),
            known_hosts_strategy: self.known_hosts_strategy.clone(),
            connect_timeout: self.connect_timeout,
            host_key_alias: self.host_key_alias.clone(),
            client_version: self.client_version.clone(),
            server_alive_interval: self.server_alive_interval,
            server_alive_count_max: self.server_alive_count_max,
            agent_forwarding: self.agent_forwarding,
            filename_encoding: self.filename_encoding.clone(),
            ssh_config: self.ssh_config.clone(),
        }
    }

    /// `config.<key>=value` sets an SSH config entry outright;
    /// `appendedConfig.<key>=value` appends to the existing value with a
    /// comma, matching spec §6's "appendedConfig" semantics.
    pub fn apply_ssh_config_entry(&mut self, append: bool, key: &str, value: &str) {
        if append {
            let entry = self.ssh_config.entry(key.to_string()).or_default();
            if entry.is_empty() {
                *entry = value.to_string();
            } else {
                entry.push(',');
                entry.push_str(value);
            }
        } else {
            self.ssh_config.insert(key.to_string(), value.to_string());
        }
    }
}

/// Chained-setter construction of a [`Configuration`], mirroring
/// `opendal`'s per-backend `XxxBuilder` types (e.g. `SftpBuilder` in
/// `core/src/services/sftp/backend.rs`). `build()` — which actually opens
/// the pool — lives on [`crate::registry::FilesystemBuilder`]'s `impl`
/// block in `registry.rs`, since it needs `ChannelPool`/`Filesystem`.
pub struct FilesystemBuilder {
    config: Configuration,
}

impl FilesystemBuilder {
    pub fn new(endpoint: impl Into<String>, user: impl Into<String>) -> Self {
        FilesystemBuilder {
            config: Configuration {
                endpoint: endpoint.into(),
                user: user.into(),
                ..Configuration::default()
            },
        }
    }

    pub fn from_config(config: Configuration) -> Self {
        FilesystemBuilder { config }
    }

    /// Parse an `sftp://` URI (spec §6) into a builder. Query parameters
    /// map onto configuration fields the way [`crate::uri::apply_query_params`]
    /// describes.
    pub fn from_uri(raw: &str) -> Result<Self> {
        let uri = crate::uri::SftpUri::parse(raw)?;
        let mut config = Configuration::default();
        config.endpoint = match uri.port {
            Some(port) => format!("{}:{port}", uri.host),
            None => uri.host.clone(),
        };
        if let Some(user) = &uri.user {
            config.user = user.clone();
        }
        if let Some(password) = &uri.password {
            config.password = Some(password.clone());
        }
        if !uri.path.is_empty() {
            config.default_directory = Some(uri.path.clone());
        }
        crate::uri::apply_query_params(&mut config, &uri.query)?;
        Ok(FilesystemBuilder { config })
    }

    /// See [`Configuration::password`]: accepted for surface parity, but
    /// the real transport has no non-interactive password-auth mode.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn identity_file(mut self, path: impl Into<String>) -> Self {
        self.config.identity_file = Some(path.into());
        self
    }

    pub fn known_hosts_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.config.known_hosts_strategy = Some(strategy.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.config.client_version = Some(version.into());
        self
    }

    pub fn host_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.config.host_key_alias = Some(alias.into());
        self
    }

    pub fn server_alive_interval(mut self, interval: Duration) -> Self {
        self.config.server_alive_interval = Some(interval);
        self
    }

    pub fn server_alive_count_max(mut self, count: u32) -> Self {
        self.config.server_alive_count_max = Some(count);
        self
    }

    pub fn agent_forwarding(mut self, enabled: bool) -> Self {
        self.config.agent_forwarding = enabled;
        self
    }

    pub fn filename_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.filename_encoding = Some(encoding.into());
        self
    }

    pub fn default_directory(mut self, directory: impl Into<String>) -> Self {
        self.config.default_directory = Some(directory.into());
        self
    }

    pub fn pool_config(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn ssh_config_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.ssh_config.insert(key.into(), value.into());
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn into_config(self) -> Configuration {
        self.config
    }
}

impl fmt::Debug for FilesystemBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilesystemBuilder")
            .field("config", &self.config)
            .finish()
    }
}
