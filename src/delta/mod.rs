// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.
//
// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

//! Delta transaction-log authoring
//!
//! This module writes the `_delta_log/` of one table directly against
//! the target store: newline-delimited action JSON per commit, periodic
//! parquet checkpoints, and `_last_checkpoint`. Commits use a
//! create-only PUT so concurrent writers of the same table serialise on
//! the store; the loser observes a conflict, reopens and replans.

pub mod action;
pub mod checkpoint;
pub mod log;
pub mod schema;

pub use action::{Action, Add, CommitInfo, Format, MetaData, Protocol, Remove};
pub use log::{DeltaError, DeltaLog, LiveFile};
pub use schema::{schema_id_for, schema_string_for};
