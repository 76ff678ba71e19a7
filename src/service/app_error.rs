// Copyright 2025 wireline contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("channel send error: {0}")]
    ChannelSendError(String),

    #[error("accept error: {0}")]
    Accept(String),

    #[error("connect error: {0}")]
    Connect(String),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// marker error: not enough buffered bytes for a complete frame
    #[error("incomplete frame")]
    Incomplete,

    /// framing and session errors
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("frame too large: {0}")]
    FrameTooLarge(String),

    #[error("message decode error: {0}")]
    MessageDecode(String),

    #[error("session {0} is closed")]
    SessionClosed(u64),
}
