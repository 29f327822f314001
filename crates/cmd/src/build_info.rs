// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Version strings baked in at compile time.

use shadow_rs::{formatcp, shadow};

shadow!(build);

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// `FREEZER_RELEASE` is set by the release pipeline.
const RELEASE: bool = option_env!("FREEZER_RELEASE").is_some();

const COMMIT_SUFFIX: &str = match (build::SHORT_COMMIT.is_empty(), build::GIT_CLEAN) {
    (true, _) => "",
    (false, true) => formatcp!("+{}", build::SHORT_COMMIT),
    (false, false) => formatcp!("+{}-dirty", build::SHORT_COMMIT),
};

/// `0.1.0` for releases, `0.1.0-dev+abc1234` otherwise.
pub const VERSION: &str = if RELEASE {
    build::PKG_VERSION
} else {
    formatcp!("{}-dev{}", build::PKG_VERSION, COMMIT_SUFFIX)
};

/// Shown by `--version`.
pub const LONG_VERSION: &str = formatcp!(
    "{}\nbranch: {}\nbuilt: {}\nrustc: {}",
    VERSION,
    build::BRANCH,
    build::BUILD_TIME,
    build::RUST_VERSION,
);
