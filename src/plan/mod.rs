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

//! Batch planning
//!
//! Turns one entity's CDA tree (schema folders containing ms-epoch
//! timestamp folders) into the ordered sequence of commit batches that
//! brings the Delta log from its current watermark to the head of the
//! export. Discovery is listing-only; the single exception is reading
//! the parquet footer of one file per new schema folder.

pub mod planner;

pub use planner::{Batch, BatchPlanner, FileRef, Plan, PlanError, RemoveFile};
