/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::fmt;

use serde::{Deserialize, Serialize};

/// Persistence requested for a published message.
///
/// The harness never interprets this value; it is handed unchanged to every
/// publish call so the backend under test can honor it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// The backend should persist the message before acknowledging it.
    #[default]
    Persistent,
    /// The backend may keep the message in memory only.
    NonPersistent,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persistent => write!(f, "persistent"),
            Self::NonPersistent => write!(f, "non_persistent"),
        }
    }
}

/// Acknowledgement mode requested when opening a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Messages are acknowledged as soon as they are handed to the consumer.
    #[default]
    Auto,
    /// The consumer acknowledges explicitly.
    Client,
    /// Lazy acknowledgement; duplicates are tolerated.
    DupsOk,
}
