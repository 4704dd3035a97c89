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

use crate::pipeline::ChannelNaming;
use crate::traits::Channel;

/// The ordered channels of a pipeline with N clients:
/// `[entry, client.1, ..., client.N-1, terminal]`.
///
/// Client `i` reads `channels()[i]` and writes `channels()[i + 1]`. With no
/// clients the list is just `[entry]` and the terminal is the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTopology {
    // Never empty.
    channels: Vec<Channel>,
}

impl PipelineTopology {
    pub(crate) fn new(number_of_clients: usize, naming: &dyn ChannelNaming) -> Self {
        let mut channels = Vec::with_capacity(number_of_clients + 1);
        channels.push(Channel::new(naming.entry()));
        channels.extend((1..number_of_clients).map(|index| Channel::new(naming.hop(index))));
        if number_of_clients > 0 {
            channels.push(Channel::new(naming.terminal()));
        }
        Self { channels }
    }

    /// Every channel, entry first and terminal last.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Where the controller injects.
    #[must_use]
    pub fn entry(&self) -> &Channel {
        &self.channels[0]
    }

    /// Where the controller counts arrivals.
    #[must_use]
    pub fn terminal(&self) -> &Channel {
        &self.channels[self.channels.len() - 1]
    }

    /// Number of relay clients, N.
    #[must_use]
    pub fn number_of_clients(&self) -> usize {
        self.channels.len() - 1
    }

    /// The channel client `index` consumes.
    #[must_use]
    pub fn input_of(&self, index: usize) -> Option<&Channel> {
        (index < self.number_of_clients()).then(|| &self.channels[index])
    }

    /// The channel client `index` publishes to.
    #[must_use]
    pub fn output_of(&self, index: usize) -> Option<&Channel> {
        (index < self.number_of_clients()).then(|| &self.channels[index + 1])
    }
}
